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

use derive_more::Display;
/// Target for logger
pub const TARGET: &str = "airkeeper_probe";

/// The Kind of the Probe.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// When the Lifecycle of the Keeper changes, like starting or finishing
    /// an update cycle.
    #[display(fmt = "lifecycle")]
    Lifecycle,
    /// Off-chain API call state for a template work unit.
    #[display(fmt = "api_call")]
    ApiCall,
    /// Provider initialization state on a specific chain.
    #[display(fmt = "provider")]
    Provider,
    /// Condition check outcome for a candidate beacon update.
    #[display(fmt = "condition")]
    Condition,
    /// Sponsor wallet sequencing state (pending counts, nonce assignment).
    #[display(fmt = "sequencer")]
    Sequencer,
    /// Transaction submission state for a sponsor wallet.
    #[display(fmt = "submitter")]
    Submitter,
    /// When the keeper will retry an external call.
    #[display(fmt = "retry")]
    Retry,
}
