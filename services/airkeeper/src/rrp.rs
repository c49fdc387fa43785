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

//! The RRP beacon update path.
//!
//! For each job: suppress duplicates by diffing `RequestedBeaconUpdate`
//! events against `UpdatedBeacon` events over the last `blockHistoryLimit`
//! blocks and asking AirnodeRrp about any unmatched request; read the
//! beacon; apply the local deviation condition; and only then request a
//! beacon update from the keeper sponsor wallet. Jobs of one keeper
//! sponsor run sequentially in nonce order, like PSP subscriptions of one
//! sponsor.

use std::collections::HashSet;
use std::sync::Arc;

use airkeeper_protocol::{deviation, wallet};
use airkeeper_utils::{probe, retry, Error, Result};
use ethers::middleware::SignerMiddleware;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, H256, I256, U256, U64};

use crate::contracts::{AirnodeRrp, RrpBeaconServer};
use crate::providers::{GasTarget, ProviderState};
use crate::submitter::{
    consumes_nonce, SponsorSummary, SubmissionOutcome, GAS_LIMIT,
};
use crate::triggers::ResolvedBeaconJob;

/// Widens an address into the 32-byte word event topics use.
fn address_topic(address: Address) -> H256 {
    let mut topic = H256::zero();
    topic.as_bytes_mut()[12..].copy_from_slice(address.as_bytes());
    topic
}

/// Returns whether an earlier update request for this beacon is still
/// waiting to be fulfilled, scanning the last `blockHistoryLimit` blocks.
async fn update_is_pending(
    state: &ProviderState,
    beacon_id: H256,
    request_sponsor: Address,
    keeper_sponsor_wallet: Address,
) -> Result<bool> {
    let server_address = state
        .chain
        .contracts
        .rrp_beacon_server
        .ok_or(Error::Generic("RrpBeaconServer contract is not configured"))?;
    let rrp_address = state
        .chain
        .contracts
        .airnode_rrp
        .ok_or(Error::Generic("AirnodeRrp contract is not configured"))?;
    let client = Arc::new(state.client.clone());
    let server = RrpBeaconServer::new(server_address, client.clone());
    let airnode_rrp = AirnodeRrp::new(rrp_address, client);

    let from_block = state
        .current_block
        .saturating_sub(U64::from(state.chain.block_history_limit));

    let requested = retry::with_defaults(|| {
        let event = server
            .requested_beacon_update_filter()
            .topic1(beacon_id)
            .topic2(address_topic(request_sponsor))
            .topic3(address_topic(keeper_sponsor_wallet))
            .from_block(from_block)
            .to_block(state.current_block);
        async move { event.query().await.map_err(Into::into) }
    })
    .await?;

    let updated = retry::with_defaults(|| {
        let event = server
            .updated_beacon_filter()
            .topic1(beacon_id)
            .from_block(from_block)
            .to_block(state.current_block);
        async move { event.query().await.map_err(Into::into) }
    })
    .await?;

    let fulfilled: HashSet<[u8; 32]> =
        updated.iter().map(|event| event.request_id).collect();
    for request in &requested {
        if fulfilled.contains(&request.request_id) {
            continue;
        }
        let request_id = request.request_id;
        let call = airnode_rrp.request_is_awaiting_fulfillment(request_id);
        let awaiting = retry::with_defaults(|| async {
            call.call().await.map_err(Into::into)
        })
        .await?;
        if awaiting {
            return Ok(true);
        }
    }
    Ok(false)
}

async fn read_beacon(
    state: &ProviderState,
    beacon_id: H256,
) -> Result<I256> {
    let server_address = state
        .chain
        .contracts
        .rrp_beacon_server
        .ok_or(Error::Generic("RrpBeaconServer contract is not configured"))?;
    let server =
        RrpBeaconServer::new(server_address, Arc::new(state.client.clone()));
    let call = server
        .read_beacon(beacon_id.to_fixed_bytes())
        .from(Address::zero());
    let (value, _timestamp) = retry::with_defaults(|| async {
        call.call().await.map_err(Into::into)
    })
    .await?;
    Ok(I256::from_raw(U256::from(value)))
}

#[allow(clippy::too_many_arguments)]
async fn submit_beacon_update_request(
    state: &ProviderState,
    keeper_sponsor_wallet: &LocalWallet,
    job: &ResolvedBeaconJob,
    request_sponsor_wallet: Address,
    nonce: U256,
) -> Result<H256> {
    let server_address = state
        .chain
        .contracts
        .rrp_beacon_server
        .ok_or(Error::Generic("RrpBeaconServer contract is not configured"))?;
    let signer = Arc::new(SignerMiddleware::new(
        state.client.clone(),
        keeper_sponsor_wallet.clone(),
    ));
    let server = RrpBeaconServer::new(server_address, signer);

    let mut call = server
        .request_beacon_update(
            job.job.template_id.to_fixed_bytes(),
            job.job.request_sponsor,
            request_sponsor_wallet,
            job.encoded_parameters.clone(),
        )
        .gas(GAS_LIMIT)
        .nonce(nonce);
    match state.gas_target {
        GasTarget::Legacy { gas_price } => {
            call = call.legacy().gas_price(gas_price);
        }
        GasTarget::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => {
            if let TypedTransaction::Eip1559(ref mut tx) = call.tx {
                tx.max_fee_per_gas = Some(max_fee_per_gas);
                tx.max_priority_fee_per_gas = Some(max_priority_fee_per_gas);
            }
        }
    }
    let pending = call.send().await?;
    Ok(*pending)
}

/// Processes one keeper sponsor's beacon jobs sequentially, in nonce
/// order. The keeper sponsor wallet pays; the request sponsor wallet is
/// only named in the request.
pub async fn process_keeper_sponsor_rrp(
    state: &ProviderState,
    mnemonic: &str,
    keeper_sponsor: Address,
    starting_nonce: U256,
    keeper_sponsor_wallet: &LocalWallet,
    jobs: &[ResolvedBeaconJob],
    api_values: &std::collections::HashMap<H256, I256>,
) -> SponsorSummary {
    let mut summary = SponsorSummary::default();
    let mut nonce = starting_nonce;
    for job in jobs {
        let api_value = match api_values.get(&job.beacon_id) {
            Some(value) => *value,
            None => {
                summary.skipped += 1;
                continue;
            }
        };

        match update_is_pending(
            state,
            job.beacon_id,
            job.job.request_sponsor,
            keeper_sponsor_wallet.address(),
        )
        .await
        {
            Ok(false) => {}
            Ok(true) => {
                tracing::warn!(
                    beacon_id = %job.beacon_id,
                    "an earlier update request is still pending, skipping",
                );
                summary.skipped += 1;
                continue;
            }
            Err(e) => {
                tracing::warn!(
                    beacon_id = %job.beacon_id,
                    error = %e,
                    "could not check for pending update requests, skipping",
                );
                summary.skipped += 1;
                continue;
            }
        }

        let on_chain = match read_beacon(state, job.beacon_id).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    beacon_id = %job.beacon_id,
                    error = %e,
                    "could not read the beacon, skipping",
                );
                summary.skipped += 1;
                continue;
            }
        };
        if !deviation::update_condition(
            on_chain,
            api_value,
            job.job.deviation_percentage,
        ) {
            tracing::event!(
                target: probe::TARGET,
                tracing::Level::DEBUG,
                kind = %probe::Kind::Condition,
                beacon_id = %job.beacon_id,
                %on_chain,
                api = %api_value,
                worthwhile = false,
            );
            summary.skipped += 1;
            continue;
        }

        let request_sponsor_wallet = match wallet::derive_sponsor_wallet(
            mnemonic,
            job.job.request_sponsor,
            wallet::PROTOCOL_ID_RRP,
        ) {
            Ok(wallet) => wallet.address(),
            Err(e) => {
                tracing::warn!(
                    beacon_id = %job.beacon_id,
                    error = %e,
                    "could not derive the request sponsor wallet, skipping",
                );
                summary.skipped += 1;
                continue;
            }
        };

        let outcome = match submit_beacon_update_request(
            state,
            keeper_sponsor_wallet,
            job,
            request_sponsor_wallet,
            nonce,
        )
        .await
        {
            Ok(tx_hash) => {
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::Submitter,
                    beacon_id = %job.beacon_id,
                    %tx_hash,
                    %nonce,
                );
                tracing::info!(
                    beacon_id = %job.beacon_id,
                    %tx_hash,
                    keeper_sponsor = %keeper_sponsor,
                    "beacon update requested",
                );
                summary.submitted += 1;
                SubmissionOutcome::Submitted
            }
            Err(e) => {
                tracing::error!(
                    beacon_id = %job.beacon_id,
                    error = %e,
                    "failed to request the beacon update",
                );
                summary.failed += 1;
                SubmissionOutcome::Failed
            }
        };
        if consumes_nonce(outcome) {
            nonce = nonce + U256::one();
        }
    }
    summary
}

/// Groups resolved jobs by keeper sponsor, preserving order.
pub fn group_by_keeper_sponsor(
    jobs: Vec<ResolvedBeaconJob>,
) -> Vec<(Address, Vec<ResolvedBeaconJob>)> {
    let mut groups: Vec<(Address, Vec<ResolvedBeaconJob>)> = Vec::new();
    for job in jobs {
        match groups
            .iter_mut()
            .find(|(sponsor, _)| *sponsor == job.job.keeper_sponsor)
        {
            Some((_, entries)) => entries.push(job),
            None => groups.push((job.job.keeper_sponsor, vec![job])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;
    use crate::triggers;

    #[test]
    fn address_topics_are_left_padded() {
        let topic = address_topic(Address::from_low_u64_be(0xff));
        assert_eq!(&topic.as_bytes()[..12], &[0u8; 12]);
        assert_eq!(topic.as_bytes()[31], 0xff);
    }

    #[test]
    fn jobs_group_by_keeper_sponsor_in_order() {
        let fixture = test_utils::rrp_fixture();
        let jobs =
            triggers::resolve_rrp_triggers(&fixture.config, fixture.airnode_address);
        let mut duplicated = jobs.clone();
        let mut other = jobs[0].clone();
        other.job.keeper_sponsor = Address::from_low_u64_be(0x99);
        duplicated.push(other);
        duplicated.push(jobs[0].clone());

        let groups = group_by_keeper_sponsor(duplicated);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].1.len(), 1);
    }
}
