// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSONL event journal with group commit support.
//!
//! Every event broadcast on the bus is appended here before subscribers see
//! it, so a restarted orchestrator can rebuild task and agent records by
//! replay. Writes are buffered and flushed in batches (~10ms durability
//! window) with a single fsync.
//!
//! Each entry is a single line of JSON: `{"seq":N,"event":{...}}\n`

use fleet_core::Event;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

/// Flush interval for group commit (~10ms batches)
const FLUSH_INTERVAL: Duration = Duration::from_millis(10);

/// Maximum entries to buffer before forcing flush
const FLUSH_THRESHOLD: usize = 100;

/// Errors that can occur in journal operations
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialization helper for writing entries without cloning the event.
#[derive(Serialize)]
struct JournalRecordRef<'a> {
    seq: u64,
    event: &'a Event,
}

/// Deserialization helper for reading entries.
#[derive(Deserialize)]
struct JournalRecord {
    seq: u64,
    event: Event,
}

/// A single journal entry with sequence number
#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub seq: u64,
    pub event: Event,
}

/// Append-only JSONL journal for durable event storage with group commit.
///
/// Events are buffered in memory and flushed to disk either when
/// `needs_flush()` reports true (interval elapsed or buffer full) or
/// explicitly via `flush()`.
pub struct Journal {
    file: File,
    path: PathBuf,
    /// Next sequence number to assign
    write_seq: u64,
    /// Buffered JSON lines waiting to be flushed (without trailing newline)
    write_buffer: Vec<Vec<u8>>,
    /// Last flush timestamp for interval checking
    last_flush: Instant,
}

impl Journal {
    /// Open or create a journal at the given path.
    ///
    /// Scans existing entries to find the highest assigned sequence number.
    /// A corrupt tail (torn write from a crash) is tolerated: scanning stops
    /// at the first unparseable line and new entries are appended after it.
    pub fn open(path: &Path) -> Result<Self, JournalError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let write_seq = Self::scan_max_seq(&file)?;

        Ok(Self {
            file,
            path: path.to_owned(),
            write_seq,
            write_buffer: Vec::new(),
            last_flush: Instant::now(),
        })
    }

    fn scan_max_seq(file: &File) -> Result<u64, JournalError> {
        let mut reader = BufReader::new(file.try_clone()?);
        reader.seek(SeekFrom::Start(0))?;

        let mut max_seq = 0u64;
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::InvalidData => break,
                Err(e) => return Err(e.into()),
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JournalRecord>(trimmed) {
                Ok(record) => max_seq = max_seq.max(record.seq),
                Err(e) => {
                    warn!(error = %e, "corrupt journal entry, stopping scan");
                    break;
                }
            }
        }

        Ok(max_seq)
    }

    /// Append an event to the write buffer.
    ///
    /// Returns the assigned sequence number. The event is NOT durable until
    /// `flush()` is called.
    pub fn append(&mut self, event: &Event) -> Result<u64, JournalError> {
        self.write_seq += 1;
        let seq = self.write_seq;
        let record = JournalRecordRef { seq, event };
        let json_bytes = serde_json::to_vec(&record)?;
        self.write_buffer.push(json_bytes);
        Ok(seq)
    }

    /// Check if flush is needed (interval elapsed or buffer full).
    pub fn needs_flush(&self) -> bool {
        !self.write_buffer.is_empty()
            && (self.last_flush.elapsed() >= FLUSH_INTERVAL
                || self.write_buffer.len() >= FLUSH_THRESHOLD)
    }

    /// Flush all buffered entries to disk with a single fsync.
    ///
    /// This is the durability point - after flush returns successfully,
    /// all buffered events are guaranteed to be on disk.
    pub fn flush(&mut self) -> Result<(), JournalError> {
        if self.write_buffer.is_empty() {
            return Ok(());
        }

        for mut json_bytes in self.write_buffer.drain(..) {
            json_bytes.push(b'\n');
            self.file.write_all(&json_bytes)?;
        }

        self.file.sync_all()?;
        self.last_flush = Instant::now();
        Ok(())
    }

    /// Get the current write sequence number.
    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    /// Iterate over all entries after the given sequence number.
    ///
    /// Used for recovery replay. Stops at the first corrupt entry.
    pub fn entries_after(&mut self, seq: u64) -> Result<Vec<JournalEntry>, JournalError> {
        // Make buffered writes visible to the read pass
        self.flush()?;

        let mut reader = BufReader::new(self.file.try_clone()?);
        reader.seek(SeekFrom::Start(0))?;

        let mut entries = Vec::new();
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::InvalidData => break,
                Err(e) => return Err(e.into()),
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let record: JournalRecord = match serde_json::from_str(trimmed) {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "corrupt journal entry during replay, stopping");
                    break;
                }
            };

            if record.seq > seq {
                entries.push(JournalEntry {
                    seq: record.seq,
                    event: record.event,
                });
            }
        }

        Ok(entries)
    }

    /// Truncate entries before the given sequence number.
    ///
    /// Called after compaction to reclaim disk space. Creates a new journal
    /// file with only entries >= seq and atomically renames it into place.
    pub fn truncate_before(&mut self, seq: u64) -> Result<(), JournalError> {
        self.flush()?;

        let keep: Vec<JournalEntry> = self
            .entries_after(seq.saturating_sub(1))
            .map(|entries| entries.into_iter().filter(|e| e.seq >= seq).collect())?;

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp_file = File::create(&tmp_path)?;
            for entry in &keep {
                let record = JournalRecordRef {
                    seq: entry.seq,
                    event: &entry.event,
                };
                let mut json_bytes = serde_json::to_vec(&record)?;
                json_bytes.push(b'\n');
                tmp_file.write_all(&json_bytes)?;
            }
            tmp_file.sync_all()?;
        }

        std::fs::rename(&tmp_path, &self.path)?;

        self.file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;

        Ok(())
    }
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;
