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

//! Provider initialization.
//!
//! Every `(chain, provider)` pair is initialized concurrently and
//! independently: construct the JSON-RPC client, pin the current block,
//! and compute the gas target update transactions will use. A pair that
//! fails either fetch is dropped for this cycle with an error log; the
//! other pairs proceed.

use std::time::Duration;

use airkeeper_config::{
    ChainConfig, ChainOptions, ChainProvider, Config, PriorityFee, TxType,
};
use airkeeper_utils::{probe, retry, Error, Result};
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{BlockNumber, U256, U64};

/// The gas parameters of an update transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasTarget {
    /// Pre-eip1559 pricing.
    Legacy {
        /// The gas price, in wei.
        gas_price: U256,
    },
    /// Base fee + priority fee pricing.
    Eip1559 {
        /// Fee cap, in wei.
        max_fee_per_gas: U256,
        /// Priority fee, in wei.
        max_priority_fee_per_gas: U256,
    },
}

/// Multiplier applied to the base fee when the config does not set one.
pub const DEFAULT_BASE_FEE_MULTIPLIER: u64 = 2;

/// Priority fee used when the config does not set one: 3.12 gwei.
pub fn default_priority_fee() -> U256 {
    U256::from(3_120_000_000u64)
}

fn fee_to_wei(fee: &PriorityFee) -> Result<U256> {
    let unit = fee.unit.map(|u| u.as_str()).unwrap_or("wei");
    let parsed = ethers::utils::parse_units(fee.value, unit)?;
    Ok(parsed.into())
}

/// Computes the eip1559 gas target from the latest base fee:
/// `maxFee = baseFee * baseFeeMultiplier + priorityFee`.
pub fn eip1559_gas_target(
    options: &ChainOptions,
    base_fee_per_gas: U256,
) -> Result<GasTarget> {
    let multiplier = options
        .base_fee_multiplier
        .unwrap_or(DEFAULT_BASE_FEE_MULTIPLIER);
    let max_priority_fee_per_gas = match &options.priority_fee {
        Some(fee) => fee_to_wei(fee)?,
        None => default_priority_fee(),
    };
    let max_fee_per_gas = base_fee_per_gas
        .saturating_mul(U256::from(multiplier))
        .saturating_add(max_priority_fee_per_gas);
    Ok(GasTarget::Eip1559 {
        max_fee_per_gas,
        max_priority_fee_per_gas,
    })
}

/// Everything phase four needs to talk to one provider.
#[derive(Debug, Clone)]
pub struct ProviderState {
    /// The configured provider name, for logs.
    pub provider_name: String,
    /// The chain this provider serves.
    pub chain: ChainConfig,
    /// The JSON-RPC client.
    pub client: Provider<Http>,
    /// The block the whole cycle is pinned to.
    pub current_block: U64,
    /// The gas target update transactions will use.
    pub gas_target: GasTarget,
}

async fn initialize_provider(
    chain: &ChainConfig,
    provider_name: &str,
    provider: &ChainProvider,
) -> Result<ProviderState> {
    let client = Provider::<Http>::try_from(provider.url.as_str())?
        .interval(Duration::from_millis(50));

    let current_block = retry::with_defaults(|| {
        let client = client.clone();
        async move { client.get_block_number().await.map_err(Into::into) }
    })
    .await?;

    let gas_target = match chain.options.tx_type {
        TxType::Eip1559 => {
            let block = retry::with_defaults(|| {
                let client = client.clone();
                async move {
                    client
                        .get_block(BlockNumber::Latest)
                        .await
                        .map_err(Into::into)
                }
            })
            .await?
            .ok_or(Error::Generic("provider returned no latest block"))?;
            let base_fee_per_gas = block
                .base_fee_per_gas
                .ok_or(Error::Generic("chain does not report a base fee"))?;
            eip1559_gas_target(&chain.options, base_fee_per_gas)?
        }
        TxType::Legacy => {
            let gas_price = retry::with_defaults(|| {
                let client = client.clone();
                async move { client.get_gas_price().await.map_err(Into::into) }
            })
            .await?;
            GasTarget::Legacy { gas_price }
        }
    };

    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Provider,
        chain_id = %chain.id,
        provider = %provider_name,
        current_block = %current_block,
        gas_target = ?gas_target,
    );

    Ok(ProviderState {
        provider_name: provider_name.to_string(),
        chain: chain.clone(),
        client,
        current_block,
        gas_target,
    })
}

/// Initializes every `(chain, provider)` pair, dropping failures.
pub async fn initialize_providers(config: &Config) -> Vec<ProviderState> {
    let pairs: Vec<(&ChainConfig, &String, &ChainProvider)> = config
        .evm_chains()
        .flat_map(|chain| {
            chain
                .providers
                .iter()
                .map(move |(name, provider)| (chain, name, provider))
        })
        .collect();
    let tasks = pairs
        .iter()
        .map(|(chain, name, provider)| initialize_provider(chain, name, provider));
    let results = futures::future::join_all(tasks).await;

    let mut states = Vec::new();
    for ((chain, name, _), result) in pairs.iter().zip(results) {
        match result {
            Ok(state) => states.push(state),
            Err(e) => {
                tracing::error!(
                    chain_id = %chain.id,
                    provider = %name,
                    error = %e,
                    "failed to initialize the provider, dropping it for this cycle",
                );
            }
        }
    }
    states
}

#[cfg(test)]
mod tests {
    use super::*;
    use airkeeper_config::FeeUnit;

    #[test]
    fn eip1559_target_multiplies_base_fee_and_adds_priority() {
        let options = ChainOptions {
            tx_type: TxType::Eip1559,
            base_fee_multiplier: Some(2),
            priority_fee: Some(PriorityFee {
                value: 3.12,
                unit: Some(FeeUnit::Gwei),
            }),
        };
        let base_fee = U256::from(100_000_000_000u64); // 100 gwei
        let target = eip1559_gas_target(&options, base_fee).unwrap();
        assert_eq!(
            target,
            GasTarget::Eip1559 {
                max_fee_per_gas: U256::from(203_120_000_000u64),
                max_priority_fee_per_gas: U256::from(3_120_000_000u64),
            }
        );
    }

    #[test]
    fn eip1559_target_falls_back_to_defaults() {
        let options = ChainOptions::default();
        let base_fee = U256::from(10_000_000_000u64); // 10 gwei
        let target = eip1559_gas_target(&options, base_fee).unwrap();
        assert_eq!(
            target,
            GasTarget::Eip1559 {
                max_fee_per_gas: U256::from(23_120_000_000u64),
                max_priority_fee_per_gas: default_priority_fee(),
            }
        );
    }

    #[test]
    fn priority_fee_units_convert_to_wei() {
        let fee = PriorityFee {
            value: 1.5,
            unit: Some(FeeUnit::Gwei),
        };
        assert_eq!(fee_to_wei(&fee).unwrap(), U256::from(1_500_000_000u64));

        let fee = PriorityFee {
            value: 42.0,
            unit: None,
        };
        assert_eq!(fee_to_wei(&fee).unwrap(), U256::from(42u64));
    }

    #[tokio::test]
    async fn a_dead_provider_does_not_block_the_live_one() {
        let fixture = crate::test_utils::fixture();
        let mut config = fixture.config;
        let stub = crate::test_utils::spawn_rpc_stub().await;
        // legacy pricing so the stub only has to answer eth_blockNumber
        // and eth_gasPrice
        config.chains[0].options.tx_type = TxType::Legacy;
        config.chains[0].providers.insert(
            "local".into(),
            ChainProvider {
                url: format!("http://{stub}")
                    .parse::<url::Url>()
                    .unwrap()
                    .into(),
            },
        );
        config.chains[0].providers.insert(
            "invalidProvider".into(),
            ChainProvider {
                url: "http://127.0.0.1:1".parse::<url::Url>().unwrap().into(),
            },
        );
        let states = initialize_providers(&config).await;
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].provider_name, "local");
        assert_eq!(states[0].current_block, U64::from(0x64u64));
        assert_eq!(
            states[0].gas_target,
            GasTarget::Legacy {
                gas_price: U256::from(1_000_000_000u64),
            }
        );
    }

    #[tokio::test]
    async fn an_unreachable_provider_is_dropped() {
        let fixture = crate::test_utils::fixture();
        let mut config = fixture.config;
        // nothing listens on these ports
        config.chains[0].providers.insert(
            "invalidProvider".into(),
            ChainProvider {
                url: "http://127.0.0.1:1".parse::<url::Url>().unwrap().into(),
            },
        );
        config.chains[0].providers.insert(
            "otherInvalidProvider".into(),
            ChainProvider {
                url: "http://127.0.0.1:2".parse::<url::Url>().unwrap().into(),
            },
        );
        config.chains[0].providers.remove("local");
        let states = initialize_providers(&config).await;
        assert!(states.is_empty());
    }
}
