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

//! The invocation surface.
//!
//! The keeper is invoked as a function taking an opaque scheduler event
//! and returning an HTTP-shaped response. Config errors are raised by the
//! loader before a handler ever runs; everything else is logged and
//! swallowed per work unit, so a handler always reports that the
//! execution finished. A cycle-wide deadline aborts stragglers so one
//! invocation never leaks into the next tick.

use airkeeper_config::Config;
use serde_json::json;

use crate::adapter::ApiClient;
use crate::cycle::{self, CycleSummary, CYCLE_DEADLINE};

/// Response body message of a finished PSP invocation.
pub const PSP_FINISHED_MESSAGE: &str =
    "PSP beacon update execution has finished";
/// Response body message of a finished RRP invocation.
pub const RRP_FINISHED_MESSAGE: &str = "Beacon update execution has finished";

/// The HTTP-shaped response returned to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResponse {
    /// Always 200: per-work-unit errors never fail the invocation.
    pub status_code: u16,
    /// A JSON body of the shape `{"ok":true,"data":{"message":...}}`.
    pub body: String,
}

fn finished(message: &str) -> InvocationResponse {
    InvocationResponse {
        status_code: 200,
        body: json!({ "ok": true, "data": { "message": message } })
            .to_string(),
    }
}

fn log_outcome(
    mode: &str,
    outcome: Result<airkeeper_utils::Result<CycleSummary>, tokio::time::error::Elapsed>,
) {
    match outcome {
        Ok(Ok(summary)) => {
            tracing::info!(
                mode,
                providers = summary.providers,
                submitted = summary.submitted,
                skipped = summary.skipped,
                failed = summary.failed,
                "update cycle finished",
            );
        }
        Ok(Err(e)) => {
            tracing::error!(mode, error = %e, "update cycle errored");
        }
        Err(_) => {
            tracing::error!(
                mode,
                deadline = ?CYCLE_DEADLINE,
                "update cycle overran its deadline and was aborted",
            );
        }
    }
}

/// Runs one PSP update cycle on behalf of the scheduler.
pub async fn handle_psp_beacon_update(
    config: &Config,
    api_client: &dyn ApiClient,
    _event: serde_json::Value,
) -> InvocationResponse {
    let outcome = tokio::time::timeout(
        CYCLE_DEADLINE,
        cycle::run_psp_cycle(config, api_client),
    )
    .await;
    log_outcome("psp", outcome);
    finished(PSP_FINISHED_MESSAGE)
}

/// Runs one RRP update cycle on behalf of the scheduler.
pub async fn handle_rrp_beacon_update(
    config: &Config,
    api_client: &dyn ApiClient,
    _event: serde_json::Value,
) -> InvocationResponse {
    let outcome = tokio::time::timeout(
        CYCLE_DEADLINE,
        cycle::run_rrp_cycle(config, api_client),
    )
    .await;
    log_outcome("rrp", outcome);
    finished(RRP_FINISHED_MESSAGE)
}
