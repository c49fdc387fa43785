// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Airkeeper Binary.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::time::Duration;

use tokio::signal::unix;
use tokio::time;

use airkeeper::adapter::HttpApiClient;
use airkeeper::handler;
use airkeeper_config::cli::{
    load_config, setup_logger, Opts, ServerlessEnvironment,
};

async fn run_both_cycles(
    config: &airkeeper_config::Config,
    api_client: &HttpApiClient,
) {
    let event = serde_json::Value::Null;
    let psp =
        handler::handle_psp_beacon_update(config, api_client, event.clone())
            .await;
    tracing::debug!(status = psp.status_code, body = %psp.body);
    if !config
        .triggers
        .rrp_beacon_server_keeper_jobs
        .is_empty()
    {
        let rrp =
            handler::handle_rrp_beacon_update(config, api_client, event)
                .await;
        tracing::debug!(status = rrp.status_code, body = %rrp.body);
    }
}

/// The main entry point for the keeper.
///
/// # Arguments
///
/// * `args` - The command line arguments.
#[paw::main]
#[tokio::main]
async fn main(args: Opts) -> anyhow::Result<()> {
    setup_logger(args.verbose, "airkeeper")?;
    match dotenv::dotenv() {
        Ok(_) => {
            tracing::trace!("Loaded .env file");
        }
        Err(e) => {
            tracing::warn!("Failed to load .env file: {}", e);
        }
    }
    let environment = ServerlessEnvironment::from_env();
    tracing::info!(
        cloud_provider = environment.cloud_provider.as_deref(),
        stage = environment.stage.as_deref(),
        "starting the airkeeper",
    );

    // Configuration errors abort the invocation before any network I/O.
    let config = load_config(&args.config_dir)?;
    let api_client = HttpApiClient::new();

    if args.once {
        run_both_cycles(&config, &api_client).await;
        return Ok(());
    }

    // tick once a minute, the way the serverless scheduler would
    let mut interval = time::interval(Duration::from_secs(60));
    interval
        .set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    let mut ctrlc_signal = unix::signal(unix::SignalKind::interrupt())?;
    let mut termination_signal = unix::signal(unix::SignalKind::terminate())?;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_both_cycles(&config, &api_client).await;
            }
            _ = ctrlc_signal.recv() => {
                tracing::warn!("Interrupted (Ctrl+C) ...");
                break;
            }
            _ = termination_signal.recv() => {
                tracing::warn!("Got Terminate signal ...");
                break;
            }
        }
    }
    tracing::info!("Clean Exit ..");
    Ok(())
}
