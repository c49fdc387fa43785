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

//! The update cycle orchestrator.
//!
//! Four sequential phases with barriers between them:
//!
//! 1. **initialize** — resolve and validate the trigger lists;
//! 2. **call APIs** — one concurrent call per template work unit;
//! 3. **initialize providers** — every `(chain, provider)` pair
//!    concurrently;
//! 4. **submit** — per provider, sponsors fan out concurrently while each
//!    sponsor's work runs strictly sequentially in nonce order.
//!
//! The cycle owns all of its state and nothing survives an invocation; a
//! failed invocation is simply retried at the next scheduled tick.

use std::time::Duration;

use airkeeper_config::Config;
use airkeeper_protocol::wallet;
use airkeeper_utils::{probe, Result};

use crate::adapter::ApiClient;
use crate::providers::ProviderState;
use crate::sequencer;
use crate::submitter::{self, SponsorSummary};
use crate::triggers;
use crate::{api, providers, rrp};

/// The scheduler ticks once a minute; a cycle must finish within the tick.
pub const CYCLE_DEADLINE: Duration = Duration::from_secs(60);

/// Counters of one finished update cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleSummary {
    /// Providers that initialized successfully.
    pub providers: usize,
    /// Transactions broadcast.
    pub submitted: usize,
    /// Work units skipped.
    pub skipped: usize,
    /// Broadcast attempts that errored.
    pub failed: usize,
}

impl CycleSummary {
    fn absorb(&mut self, sponsor: SponsorSummary) {
        self.submitted += sponsor.submitted;
        self.skipped += sponsor.skipped;
        self.failed += sponsor.failed;
    }
}

async fn submit_psp_on_provider(
    state: &ProviderState,
    config: &Config,
    airnode_wallet: &ethers::signers::LocalWallet,
    groups: &[triggers::GroupedSubscriptions],
    api_values: &std::collections::HashMap<
        ethers::types::H256,
        ethers::types::I256,
    >,
) -> CycleSummary {
    // only this chain's subscriptions, and only those with an API value
    let work: Vec<_> = groups
        .iter()
        .flat_map(|group| group.subscriptions.iter())
        .filter(|(subscription_id, subscription)| {
            subscription.chain_id == state.chain.id
                && api_values.contains_key(subscription_id)
        })
        .cloned()
        .collect();
    let sponsor_groups = sequencer::group_by_sponsor(work);

    let mnemonic = config.airnode_wallet_mnemonic.as_str();
    let sponsor_tasks = sponsor_groups.into_iter().map(
        |(sponsor, subscriptions)| async move {
            let dropped = subscriptions.len();
            match sequencer::sequence_sponsor(
                state,
                mnemonic,
                wallet::PROTOCOL_ID_PSP,
                sponsor,
                subscriptions,
            )
            .await
            {
                Ok(sequence) => {
                    submitter::process_sponsor_psp(
                        state,
                        airnode_wallet,
                        sequence,
                        api_values,
                    )
                    .await
                }
                Err(e) => {
                    tracing::error!(
                        %sponsor,
                        error = %e,
                        "could not sequence the sponsor wallet, dropping its subscriptions",
                    );
                    SponsorSummary::all_skipped(dropped)
                }
            }
        },
    );
    let summaries = futures::future::join_all(sponsor_tasks).await;

    let mut summary = CycleSummary {
        providers: 1,
        ..Default::default()
    };
    for sponsor_summary in summaries {
        summary.absorb(sponsor_summary);
    }
    summary
}

/// Runs one PSP update cycle.
pub async fn run_psp_cycle(
    config: &Config,
    api_client: &dyn ApiClient,
) -> Result<CycleSummary> {
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        mode = "psp",
        starting = true,
    );

    // Phase 1: initialize
    let groups = triggers::resolve_psp_triggers(config);
    tracing::debug!(groups = groups.len(), "resolved PSP triggers");

    // Phase 2: call APIs
    let api_values = api::call_apis(config, &groups, api_client).await;

    // Phase 3: initialize providers
    let provider_states = providers::initialize_providers(config).await;

    // Phase 4: submit
    let airnode_wallet =
        wallet::derive_airnode_wallet(config.airnode_wallet_mnemonic.as_str())?;
    let provider_tasks = provider_states.iter().map(|state| {
        submit_psp_on_provider(
            state,
            config,
            &airnode_wallet,
            &groups,
            &api_values,
        )
    });
    let summaries = futures::future::join_all(provider_tasks).await;

    let mut total = CycleSummary::default();
    for summary in summaries {
        total.providers += summary.providers;
        total.submitted += summary.submitted;
        total.skipped += summary.skipped;
        total.failed += summary.failed;
    }
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        mode = "psp",
        finished = true,
        providers = total.providers,
        submitted = total.submitted,
        skipped = total.skipped,
        failed = total.failed,
    );
    Ok(total)
}

async fn submit_rrp_on_provider(
    state: &ProviderState,
    config: &Config,
    jobs: &[triggers::ResolvedBeaconJob],
    api_values: &std::collections::HashMap<
        ethers::types::H256,
        ethers::types::I256,
    >,
) -> CycleSummary {
    let work: Vec<_> = jobs
        .iter()
        .filter(|job| match &job.job.chain_ids {
            Some(chain_ids) => chain_ids.contains(&state.chain.id),
            None => true,
        })
        .filter(|job| api_values.contains_key(&job.beacon_id))
        .cloned()
        .collect();
    let sponsor_groups = rrp::group_by_keeper_sponsor(work);

    let mnemonic = config.airnode_wallet_mnemonic.as_str();
    let sponsor_tasks = sponsor_groups.into_iter().map(
        |(keeper_sponsor, jobs)| async move {
            let dropped = jobs.len();
            let pinned = sequencer::pin_sponsor_wallet(
                state,
                mnemonic,
                wallet::PROTOCOL_ID_RRP_KEEPER,
                keeper_sponsor,
            )
            .await;
            match pinned {
                Ok((keeper_wallet, starting_nonce)) => {
                    rrp::process_keeper_sponsor_rrp(
                        state,
                        mnemonic,
                        keeper_sponsor,
                        starting_nonce,
                        &keeper_wallet,
                        &jobs,
                        api_values,
                    )
                    .await
                }
                Err(e) => {
                    tracing::error!(
                        %keeper_sponsor,
                        error = %e,
                        "could not sequence the keeper sponsor wallet, dropping its jobs",
                    );
                    SponsorSummary::all_skipped(dropped)
                }
            }
        },
    );
    let summaries = futures::future::join_all(sponsor_tasks).await;

    let mut summary = CycleSummary {
        providers: 1,
        ..Default::default()
    };
    for sponsor_summary in summaries {
        summary.absorb(sponsor_summary);
    }
    summary
}

/// Runs one RRP update cycle.
pub async fn run_rrp_cycle(
    config: &Config,
    api_client: &dyn ApiClient,
) -> Result<CycleSummary> {
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        mode = "rrp",
        starting = true,
    );

    // Phase 1: initialize
    let jobs = triggers::resolve_rrp_triggers(config, config.airnode_address);
    tracing::debug!(jobs = jobs.len(), "resolved RRP keeper jobs");

    // Phase 2: call APIs
    let api_values = api::call_rrp_apis(config, &jobs, api_client).await;

    // Phase 3: initialize providers
    let provider_states = providers::initialize_providers(config).await;

    // Phase 4: submit
    let provider_tasks = provider_states
        .iter()
        .map(|state| submit_rrp_on_provider(state, config, &jobs, &api_values));
    let summaries = futures::future::join_all(provider_tasks).await;

    let mut total = CycleSummary::default();
    for summary in summaries {
        total.providers += summary.providers;
        total.submitted += summary.submitted;
        total.skipped += summary.skipped;
        total.failed += summary.failed;
    }
    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Lifecycle,
        mode = "rrp",
        finished = true,
        providers = total.providers,
        submitted = total.submitted,
        skipped = total.skipped,
        failed = total.failed,
    );
    Ok(total)
}
