// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, shutdown, recovery.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fleet_adapters::driver::CommitDelayError;
use fleet_adapters::{SessionAdapter, SessionDriver, TmuxAdapter};
use fleet_bus::{BusError, Journal, JournalError, KvStore, MessageBus};
use fleet_core::agent::RosterError;
use fleet_core::{AgentRecord, Event, Roster, SystemClock, UuidIdGen};
use fleet_engine::breaker::BreakerRegistry;
use fleet_engine::bridge::{AgentBridge, BridgeConfig};
use fleet_engine::health::{ComponentHealth, HealthCheck, HealthCollector};
use fleet_engine::{
    BreakerConfig, EngineConfig, EngineError, FnHealthCheck, HealthStatus, MetricsRegistry,
    TaskQueue, WorkflowEngine,
};
use fs2::FileExt;
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::env;
use crate::recovery;

/// Health probe cadence
const HEALTH_INTERVAL: Duration = Duration::from_secs(30);

/// Concrete engine types used by the daemon
pub type DaemonQueue = TaskQueue<SystemClock, UuidIdGen>;
pub type DaemonWorkflowEngine = WorkflowEngine<SystemClock, UuidIdGen>;
pub type DaemonDriver = SessionDriver<TmuxAdapter>;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/fleet)
    pub state_dir: PathBuf,
    /// Path to Unix socket
    pub socket_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    /// Path to the event journal
    pub journal_path: PathBuf,
    /// Path to the agent roster
    pub roster_path: PathBuf,
}

impl Config {
    /// Load configuration for the user-level daemon.
    ///
    /// Uses fixed paths under the state directory. One daemon serves all
    /// callers for a user.
    pub fn load() -> Result<Self, LifecycleError> {
        let state_dir = env::state_dir()?;

        Ok(Self {
            socket_path: state_dir.join("daemon.sock"),
            lock_path: state_dir.join("daemon.pid"),
            log_path: state_dir.join("daemon.log"),
            journal_path: state_dir.join("journal").join("events.jsonl"),
            roster_path: state_dir.join("roster.toml"),
            state_dir,
        })
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("no usable state directory (set FLEET_STATE_DIR or HOME)")]
    NoStateDir,

    #[error("another daemon is already running (lock held on {0})")]
    AlreadyRunning(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Roster(#[from] RosterError),

    #[error(transparent)]
    CommitDelay(#[from] CommitDelayError),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// The assembled orchestrator.
pub struct Daemon {
    pub config: Config,
    // NOTE(lifetime): held to maintain the exclusive lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub bus: MessageBus,
    pub queue: Arc<DaemonQueue>,
    pub engine: Arc<DaemonWorkflowEngine>,
    pub collector: HealthCollector,
    pub breakers: BreakerRegistry,
    pub driver: DaemonDriver,
    pub roster: Roster,
    pub start_time: Instant,
    shutdown_tx: Arc<watch::Sender<bool>>,
    workers: Vec<JoinHandle<()>>,
}

/// Result of daemon startup: the daemon plus the bound socket listener.
pub struct StartupResult {
    pub daemon: Daemon,
    pub listener: UnixListener,
}

/// Bring the orchestrator up: store, journal replay, queue recovery,
/// bridges, loops, health probes, and the bound socket.
pub async fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;

    // exclusive daemon lock
    let lock_file = File::create(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(|_| LifecycleError::AlreadyRunning(config.lock_path.clone()))?;
    std::fs::write(&config.lock_path, format!("{}\n", std::process::id()))?;

    let clock = SystemClock;

    // journal replay rebuilds task and agent records
    let store = KvStore::new();
    let mut journal = Journal::open(&config.journal_path)?;
    recovery::replay_journal(&store, &mut journal, &clock)?;
    let bus = MessageBus::with_journal(store, journal);

    // the static roster registers every known agent
    let roster = Roster::load(&config.roster_path)?;
    for entry in &roster.agents {
        if bus.get_agent_status(&entry.id).is_none() {
            bus.store()
                .put_agent(AgentRecord::new(entry.id.clone(), entry.session_name()));
            bus.broadcast_event(Event::AgentRegistered {
                id: entry.id.clone(),
                session_name: entry.session_name(),
            });
        }
    }

    // a zero or sub-minimum commit delay must fail startup
    let commit_delay = fleet_adapters::env::commit_delay()?;
    let driver = SessionDriver::new(TmuxAdapter::new(), commit_delay);

    let engine_config = EngineConfig::from_env();
    let metrics = MetricsRegistry::new();
    let queue = Arc::new(TaskQueue::new(
        bus.clone(),
        clock.clone(),
        UuidIdGen,
        metrics.clone(),
        fleet_engine::queue::QueueConfig {
            offline_timeout: engine_config.offline_timeout,
        },
    ));
    queue.recover()?;

    let engine = Arc::new(WorkflowEngine::new(
        Arc::clone(&queue),
        clock.clone(),
        UuidIdGen,
        roster.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = Vec::new();

    // queue loops
    workers.push(tokio::spawn(fleet_engine::loops::run_scheduler(
        Arc::clone(&queue),
        engine_config.clone(),
        shutdown_rx.clone(),
    )));
    workers.push(tokio::spawn(fleet_engine::loops::run_monitor(
        Arc::clone(&queue),
        engine_config.clone(),
        shutdown_rx.clone(),
    )));
    workers.push(tokio::spawn(fleet_engine::loops::run_cleaner(
        Arc::clone(&queue),
        engine_config.clone(),
        shutdown_rx.clone(),
    )));

    // one bridge (plus heartbeat) per roster agent
    let breakers = BreakerRegistry::new();
    for entry in &roster.agents {
        let session = entry.session_name();
        match driver.session_exists(&session).await {
            Ok(true) => {}
            Ok(false) => {
                info!(agent = %entry.id, session = %session, "creating agent session");
                if let Err(e) = driver
                    .create_session(&session, entry.command.as_deref())
                    .await
                {
                    warn!(agent = %entry.id, error = %e, "session creation failed");
                }
            }
            Err(e) => warn!(agent = %entry.id, error = %e, "session probe failed"),
        }

        let breaker = breakers.get_or_create(
            &format!("agent:{}", entry.id),
            BreakerConfig::default(),
        );
        let bridge = AgentBridge::new(
            entry.id.clone(),
            session,
            driver.clone(),
            Arc::clone(&queue),
            clock.clone(),
            breaker,
            BridgeConfig {
                heartbeat_interval: engine_config.heartbeat_interval,
                ..BridgeConfig::default()
            },
        );

        let runner = bridge.clone();
        let rx = shutdown_rx.clone();
        workers.push(tokio::spawn(async move { runner.run(rx).await }));
        let heart = bridge;
        let rx = shutdown_rx.clone();
        workers.push(tokio::spawn(async move { heart.run_heartbeat(rx).await }));
    }

    // health probes
    let collector = HealthCollector::new();
    collector.register(Arc::new(DriverHealthCheck {
        driver: driver.clone(),
    }));
    {
        let queue = Arc::clone(&queue);
        collector.register(Arc::new(FnHealthCheck::new("queue", move || {
            let processing = queue.processing_count();
            let delayed = queue.delayed_count();
            ComponentHealth::healthy(format!("{} in flight, {} delayed", processing, delayed))
                .with_detail("processing", processing.to_string())
                .with_detail("delayed", delayed.to_string())
        })));
    }
    {
        let bus = bus.clone();
        collector.register(Arc::new(FnHealthCheck::new("agents", move || {
            let records = bus.store().agents();
            let offline = records
                .iter()
                .filter(|r| r.status == fleet_core::AgentStatus::Offline)
                .count();
            match (offline, records.len()) {
                (0, _) => ComponentHealth::healthy(format!("{} agents online", records.len())),
                (n, total) if n < total => {
                    ComponentHealth::degraded(format!("{} of {} agents offline", n, total))
                }
                (_, total) => ComponentHealth::unhealthy(format!("all {} agents offline", total)),
            }
        })));
    }
    {
        let collector = collector.clone();
        let rx = shutdown_rx.clone();
        workers.push(tokio::spawn(async move {
            collector.run(HEALTH_INTERVAL, rx).await;
        }));
    }

    // stale socket from a dead daemon
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)?;
    info!(socket = %config.socket_path.display(), agents = roster.agents.len(), "daemon ready");

    Ok(StartupResult {
        daemon: Daemon {
            config: config.clone(),
            lock_file,
            bus,
            queue,
            engine,
            collector,
            breakers,
            driver,
            roster,
            start_time: Instant::now(),
            shutdown_tx: Arc::new(shutdown_tx),
            workers,
        },
        listener,
    })
}

impl Daemon {
    pub fn shutdown_signal(&self) -> Arc<watch::Sender<bool>> {
        Arc::clone(&self.shutdown_tx)
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Stop every loop, flush the journal, and remove the socket.
    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        info!("daemon shutting down");
        self.bus.broadcast_event(Event::Shutdown);
        let _ = self.shutdown_tx.send(true);

        for worker in self.workers.drain(..) {
            // loops exit on the watch signal; don't hang on a stuck one
            if tokio::time::timeout(Duration::from_secs(5), worker)
                .await
                .is_err()
            {
                warn!("worker did not stop in time");
            }
        }

        self.bus.flush_journal()?;
        let _ = std::fs::remove_file(&self.config.socket_path);
        let _ = std::fs::remove_file(&self.config.lock_path);
        Ok(())
    }

    /// Current aggregate health, for the status surface.
    pub fn health(&self) -> HealthStatus {
        self.collector.report().0
    }
}

/// Probes the terminal multiplexer through the driver.
struct DriverHealthCheck<A: SessionAdapter> {
    driver: SessionDriver<A>,
}

#[async_trait::async_trait]
impl<A: SessionAdapter> HealthCheck for DriverHealthCheck<A> {
    fn name(&self) -> &str {
        "driver"
    }

    async fn check(&self) -> ComponentHealth {
        match self.driver.probe().await {
            Ok(()) => ComponentHealth::healthy("multiplexer responding"),
            Err(e) => ComponentHealth::unhealthy(format!("multiplexer probe failed: {}", e)),
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
