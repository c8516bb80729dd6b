// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `fleet events` - follow the live event stream.

use crate::client::DaemonClient;
use crate::exit_error::CliError;
use crate::output::{print_json, OutputFormat};
use fleet_daemon::protocol::{Request, Response};

pub async fn run(pattern: Option<String>, output: OutputFormat) -> Result<(), CliError> {
    let mut client = DaemonClient::connect().await?;

    // the subscribe request switches the connection into streaming mode
    let data = fleet_daemon::protocol::wire::encode(&Request::EventsSubscribe { pattern })
        .map_err(|e| CliError::caller(e.to_string()))?;
    client.send_raw(&data).await?;

    loop {
        let frame = client.next_frame().await?;
        match frame {
            Response::Event { event } => {
                if output == OutputFormat::Json {
                    print_json(&event);
                } else {
                    println!("{}", event.log_summary());
                }
            }
            other => {
                return Err(CliError::unhealthy(format!(
                    "unexpected frame on event stream: {:?}",
                    other
                )))
            }
        }
    }
}
