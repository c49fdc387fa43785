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

//! The PSP transaction submitter.
//!
//! One sponsor's subscriptions are processed in a plain sequential loop so
//! nonces go out in order; different sponsor wallets run in parallel. A
//! subscription whose condition does not pass never touches a nonce. A
//! subscription whose submission fails logs an error and leaves its nonce
//! slot consumed: the broadcast may have reached the mempool anyway, and
//! the next invocation re-reads the pending count fresh either way.

use std::sync::Arc;

use airkeeper_config::Subscription;
use airkeeper_utils::{probe, Result};
use ethers::abi::{encode_packed, Token};
use ethers::middleware::SignerMiddleware;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{H256, I256, U256};
use ethers::utils::keccak256;

use crate::condition;
use crate::contracts::DapiServer;
use crate::providers::{GasTarget, ProviderState};
use crate::sequencer::SponsorSequence;

/// Gas limit of every update transaction.
pub const GAS_LIMIT: u64 = 500_000;

/// What happened to one unit of work at the submission stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// The transaction was broadcast.
    Submitted,
    /// The work unit was skipped before any broadcast was attempted.
    Skipped,
    /// A broadcast was attempted and errored.
    Failed,
}

/// Whether an outcome consumes the nonce slot it was offered. Skips happen
/// before a transaction exists; failures happen after a broadcast attempt
/// that may have reached the mempool.
pub fn consumes_nonce(outcome: SubmissionOutcome) -> bool {
    match outcome {
        SubmissionOutcome::Submitted | SubmissionOutcome::Failed => true,
        SubmissionOutcome::Skipped => false,
    }
}

/// Per-sponsor submission counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct SponsorSummary {
    /// Transactions broadcast.
    pub submitted: usize,
    /// Work units skipped (no API value, condition not met, duplicate).
    pub skipped: usize,
    /// Broadcast attempts that errored.
    pub failed: usize,
}

impl SponsorSummary {
    /// Folds another summary into this one.
    pub fn absorb(&mut self, other: SponsorSummary) {
        self.submitted += other.submitted;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    /// A summary for a group that was dropped whole.
    pub fn all_skipped(count: usize) -> Self {
        Self {
            submitted: 0,
            skipped: count,
            failed: 0,
        }
    }
}

/// Signs the PSP fulfillment message with the airnode wallet:
/// `keccak256(encodePacked(subscriptionId, timestamp, sponsorWallet))`
/// wrapped as an EIP-191 personal message.
pub async fn sign_fulfillment(
    airnode_wallet: &LocalWallet,
    subscription_id: H256,
    timestamp: U256,
    sponsor_wallet: ethers::types::Address,
) -> Result<Vec<u8>> {
    let packed = encode_packed(&[
        Token::FixedBytes(subscription_id.as_bytes().to_vec()),
        Token::Uint(timestamp),
        Token::Address(sponsor_wallet),
    ])?;
    let message = keccak256(packed);
    let signature = airnode_wallet.sign_message(message).await?;
    Ok(signature.to_vec())
}

async fn submit_psp_update(
    dapi_server: &DapiServer<airkeeper_utils::EvmSignerClient>,
    state: &ProviderState,
    airnode_wallet: &LocalWallet,
    sponsor_wallet: &LocalWallet,
    subscription_id: H256,
    subscription: &Subscription,
    api_value: I256,
    nonce: U256,
) -> Result<H256> {
    let timestamp =
        U256::from(chrono::Utc::now().timestamp().unsigned_abs());
    let signature = sign_fulfillment(
        airnode_wallet,
        subscription_id,
        timestamp,
        sponsor_wallet.address(),
    )
    .await?;
    let data = condition::encode_fulfillment_data(api_value);

    let mut call = dapi_server
        .fulfill_psp_beacon_update(
            subscription_id.to_fixed_bytes(),
            subscription.airnode_address,
            subscription.relayer,
            subscription.sponsor,
            timestamp,
            data,
            signature.into(),
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

/// Processes one sponsor's subscriptions sequentially, in nonce order.
pub async fn process_sponsor_psp(
    state: &ProviderState,
    airnode_wallet: &LocalWallet,
    sequence: SponsorSequence,
    api_values: &std::collections::HashMap<H256, I256>,
) -> SponsorSummary {
    let mut summary = SponsorSummary::default();
    let dapi_server_address = match state.chain.contracts.dapi_server {
        Some(address) => address,
        None => {
            tracing::error!(
                chain_id = %state.chain.id,
                "DapiServer contract is not configured, dropping the sponsor group",
            );
            return SponsorSummary::all_skipped(sequence.subscriptions.len());
        }
    };
    let signer = Arc::new(SignerMiddleware::new(
        state.client.clone(),
        sequence.wallet.clone(),
    ));
    let dapi_server = DapiServer::new(dapi_server_address, signer);

    let mut nonce = sequence.starting_nonce;
    for (subscription_id, subscription) in &sequence.subscriptions {
        let api_value = match api_values.get(subscription_id) {
            Some(value) => *value,
            None => {
                // the API call phase already warned about this work unit
                summary.skipped += 1;
                continue;
            }
        };
        match condition::check_psp_condition(
            state,
            *subscription_id,
            subscription,
            api_value,
        )
        .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(
                    %subscription_id,
                    "update condition not met, skipping",
                );
                summary.skipped += 1;
                continue;
            }
            Err(e) => {
                tracing::warn!(
                    %subscription_id,
                    error = %e,
                    "condition check failed, skipping",
                );
                summary.skipped += 1;
                continue;
            }
        }

        let outcome = match submit_psp_update(
            &dapi_server,
            state,
            airnode_wallet,
            &sequence.wallet,
            *subscription_id,
            subscription,
            api_value,
            nonce,
        )
        .await
        {
            Ok(tx_hash) => {
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::Submitter,
                    %subscription_id,
                    %tx_hash,
                    %nonce,
                );
                tracing::info!(
                    %subscription_id,
                    %tx_hash,
                    "beacon update submitted",
                );
                summary.submitted += 1;
                SubmissionOutcome::Submitted
            }
            Err(e) => {
                tracing::error!(
                    %subscription_id,
                    error = %e,
                    "failed to submit the beacon update",
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

#[cfg(test)]
mod tests {
    use super::*;
    use airkeeper_protocol::wallet;
    use ethers::types::{Address, Signature};

    const TEST_MNEMONIC: &str =
        "test test test test test test test test test test test junk";

    #[test]
    fn skips_do_not_consume_nonces_but_failures_do() {
        assert!(consumes_nonce(SubmissionOutcome::Submitted));
        assert!(consumes_nonce(SubmissionOutcome::Failed));
        assert!(!consumes_nonce(SubmissionOutcome::Skipped));
    }

    #[tokio::test]
    async fn fulfillment_signature_recovers_to_the_airnode_address() {
        let airnode_wallet =
            wallet::derive_airnode_wallet(TEST_MNEMONIC).unwrap();
        let subscription_id = H256::from([0x11; 32]);
        let timestamp = U256::from(1_650_000_000u64);
        let sponsor_wallet = Address::from_low_u64_be(0x55);

        let raw = sign_fulfillment(
            &airnode_wallet,
            subscription_id,
            timestamp,
            sponsor_wallet,
        )
        .await
        .unwrap();
        assert_eq!(raw.len(), 65);

        let packed = encode_packed(&[
            Token::FixedBytes(subscription_id.as_bytes().to_vec()),
            Token::Uint(timestamp),
            Token::Address(sponsor_wallet),
        ])
        .unwrap();
        let message = keccak256(packed);
        let signature = Signature::try_from(raw.as_slice()).unwrap();
        let recovered = signature.recover(message.as_slice()).unwrap();
        assert_eq!(recovered, airnode_wallet.address());
    }
}
