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

//! The sponsor wallet sequencer.
//!
//! Work is grouped per sponsor in stable order. Each sponsor group derives
//! its wallet, reads the wallet's pending transaction count (mempool
//! included, so nothing broadcast by an earlier cycle is counted twice),
//! and hands the submitter an ordered sequence starting at that count. If
//! the count cannot be read the whole sponsor group is dropped for this
//! cycle. Groups are independent; only work inside one group is
//! serialized.

use airkeeper_config::Subscription;
use airkeeper_protocol::wallet;
use airkeeper_utils::{probe, retry, Error, Result};
use ethers::providers::Middleware;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, BlockId, BlockNumber, H256, U256};

use crate::providers::ProviderState;

/// An ordered sponsor work group with its wallet and starting nonce.
#[derive(Debug, Clone)]
pub struct SponsorSequence {
    /// The sponsor the group belongs to.
    pub sponsor: Address,
    /// The derived sponsor wallet, bound to the provider's chain id.
    pub wallet: LocalWallet,
    /// The wallet's pending transaction count, unconfirmed transactions
    /// included. The first submission uses exactly this nonce.
    pub starting_nonce: U256,
    /// The subscriptions of this sponsor, in grouping order.
    pub subscriptions: Vec<(H256, Subscription)>,
}

/// Groups subscriptions by sponsor, preserving both the relative order of
/// sponsors and of each sponsor's subscriptions.
pub fn group_by_sponsor(
    subscriptions: Vec<(H256, Subscription)>,
) -> Vec<(Address, Vec<(H256, Subscription)>)> {
    let mut groups: Vec<(Address, Vec<(H256, Subscription)>)> = Vec::new();
    for (subscription_id, subscription) in subscriptions {
        match groups
            .iter_mut()
            .find(|(sponsor, _)| *sponsor == subscription.sponsor)
        {
            Some((_, entries)) => {
                entries.push((subscription_id, subscription));
            }
            None => {
                groups.push((
                    subscription.sponsor,
                    vec![(subscription_id, subscription)],
                ));
            }
        }
    }
    groups
}

/// Derives a sponsor wallet bound to the provider's chain and reads its
/// pending transaction count. The pending tag counts the wallet's own
/// unconfirmed transactions, so a broadcast from an earlier cycle that is
/// still in the mempool does not get its nonce reused.
pub async fn pin_sponsor_wallet(
    state: &ProviderState,
    mnemonic: &str,
    protocol_id: &str,
    sponsor: Address,
) -> Result<(LocalWallet, U256)> {
    let chain_id: u64 = state.chain.id.parse().map_err(|_| {
        Error::ChainNotFound {
            chain_id: state.chain.id.clone(),
        }
    })?;
    let wallet = wallet::derive_sponsor_wallet(mnemonic, sponsor, protocol_id)?
        .with_chain_id(chain_id);
    let address = wallet.address();
    let block = BlockId::Number(BlockNumber::Pending);

    let starting_nonce = retry::with_defaults(|| {
        let client = state.client.clone();
        async move {
            client
                .get_transaction_count(address, Some(block))
                .await
                .map_err(Into::into)
        }
    })
    .await?;

    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Sequencer,
        %sponsor,
        sponsor_wallet = %address,
        %starting_nonce,
    );
    Ok((wallet, starting_nonce))
}

/// Derives the sponsor wallet and pins its starting nonce for a group of
/// subscriptions.
pub async fn sequence_sponsor(
    state: &ProviderState,
    mnemonic: &str,
    protocol_id: &str,
    sponsor: Address,
    subscriptions: Vec<(H256, Subscription)>,
) -> Result<SponsorSequence> {
    let (wallet, starting_nonce) =
        pin_sponsor_wallet(state, mnemonic, protocol_id, sponsor).await?;
    Ok(SponsorSequence {
        sponsor,
        wallet,
        starting_nonce,
        subscriptions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;

    #[test]
    fn grouping_is_stable_in_both_dimensions() {
        let fixture = test_utils::fixture();
        let eth = fixture
            .config
            .subscriptions
            .get(&fixture.eth_subscription_id)
            .unwrap()
            .clone();
        let btc = fixture
            .config
            .subscriptions
            .get(&fixture.btc_subscription_id)
            .unwrap()
            .clone();
        let mut other_sponsor = eth.clone();
        other_sponsor.sponsor = Address::from_low_u64_be(0x9999);
        let other_id = H256::from([0x42; 32]);

        let groups = group_by_sponsor(vec![
            (fixture.eth_subscription_id, eth),
            (other_id, other_sponsor),
            (fixture.btc_subscription_id, btc),
        ]);

        assert_eq!(groups.len(), 2);
        // first seen sponsor first, and its subscriptions in input order
        assert_eq!(groups[0].0, fixture.sponsor);
        assert_eq!(
            groups[0]
                .1
                .iter()
                .map(|(id, _)| *id)
                .collect::<Vec<_>>(),
            vec![fixture.eth_subscription_id, fixture.btc_subscription_id]
        );
        assert_eq!(groups[1].0, Address::from_low_u64_be(0x9999));
        assert_eq!(groups[1].1.len(), 1);
    }
}
