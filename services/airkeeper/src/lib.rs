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

#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # Airkeeper 🛩️
//!
//! A periodically-invoked beacon update keeper for the airnode protocol.
//! For each configured data feed the keeper queries the off-chain HTTP
//! source, compares the fetched value against the on-chain beacon, decides
//! whether the deviation makes an update worthwhile, and submits a signed
//! update transaction paid for by a deterministically-derived sponsor
//! wallet.
//!
//! One invocation runs one *update cycle* in four phases — initialize,
//! call APIs, initialize providers, submit — and keeps no state between
//! invocations: every cycle re-reads pending nonces and on-chain values
//! fresh. Failures are isolated at the smallest sensible unit (a work
//! unit, a sponsor group, a provider) so partial progress is always made.
//!
//! The keeper operates in two modes, usually both per invocation:
//!
//! * **PSP** — on-chain subscriptions whose update condition is evaluated
//!   by the DapiServer contract and fulfilled directly by the keeper;
//! * **RRP** — legacy beacon update jobs that ask the RrpBeaconServer to
//!   schedule an update request, with duplicate suppression against
//!   recent on-chain history.

/// The off-chain HTTP adapter: request building and response reduction.
pub mod adapter;
/// The API call phase.
pub mod api;
/// The PSP update condition check.
pub mod condition;
/// On-chain contract bindings.
pub mod contracts;
/// The four-phase update cycle orchestrator.
pub mod cycle;
/// The scheduler-facing invocation surface.
pub mod handler;
/// Provider initialization and gas targets.
pub mod providers;
/// The RRP beacon update path.
pub mod rrp;
/// Sponsor wallet sequencing.
pub mod sequencer;
/// The PSP transaction submitter.
pub mod submitter;
/// Trigger resolution and validation.
pub mod triggers;

#[cfg(test)]
mod test_utils;
