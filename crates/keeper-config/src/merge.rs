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

//! Merging of the airnode and airkeeper configuration documents.
//!
//! Chains are matched by `id` and the keeper entry is deep-merged onto the
//! node entry: contract addresses and providers are added or replaced
//! individually, scalars are replaced when the keeper sets them. Triggers,
//! subscriptions, templates and endpoints from the keeper document replace
//! or add to the node's. A keeper chain whose id the node does not know is
//! fatal, as is a missing mnemonic, a missing `evm` chain, or an airnode
//! address that does not match the wallet the mnemonic derives.

use airkeeper_protocol::wallet;
use airkeeper_utils::{Error, Result};
use ethers::signers::Signer;

use crate::{
    ChainConfig, ChainOverlay, ChainType, Config, KeeperConfig, NodeConfig,
};

fn merge_chain(chain: &mut ChainConfig, overlay: ChainOverlay) {
    if let Some(address) = overlay.contracts.airnode_rrp {
        chain.contracts.airnode_rrp = Some(address);
    }
    if let Some(address) = overlay.contracts.rrp_beacon_server {
        chain.contracts.rrp_beacon_server = Some(address);
    }
    if let Some(address) = overlay.contracts.dapi_server {
        chain.contracts.dapi_server = Some(address);
    }
    chain.providers.extend(overlay.providers);
    if let Some(limit) = overlay.block_history_limit {
        chain.block_history_limit = limit;
    }
    if let Some(options) = overlay.options {
        chain.options = options;
    }
}

/// Merges the two configuration documents and validates the result.
pub fn merge(node: NodeConfig, keeper: KeeperConfig) -> Result<Config> {
    let mnemonic = node
        .node_settings
        .airnode_wallet_mnemonic
        .ok_or(Error::InvalidAirnodeConfig)?;

    let mut chains = node.chains;
    if !chains.iter().any(|c| c.chain_type == ChainType::Evm) {
        tracing::error!("no evm chain in the airnode config");
        return Err(Error::InvalidAirnodeConfig);
    }
    for overlay in keeper.chains {
        match chains.iter_mut().find(|c| c.id == overlay.id) {
            Some(chain) => merge_chain(chain, overlay),
            None => {
                tracing::error!(
                    chain_id = %overlay.id,
                    "airkeeper chain is not part of the airnode config",
                );
                return Err(Error::InvalidAirkeeperConfig);
            }
        }
    }

    let derived = wallet::derive_airnode_wallet(mnemonic.as_str())?.address();
    let airnode_address =
        keeper.airnode_address.ok_or(Error::InvalidAirkeeperConfig)?;
    if airnode_address != derived {
        tracing::error!(
            configured = %airnode_address,
            derived = %derived,
            "airnodeAddress does not match the mnemonic",
        );
        return Err(Error::InvalidAirkeeperConfig);
    }
    if let Some(xpub) = keeper.airnode_xpub.as_deref() {
        let from_xpub = wallet::derive_airnode_address_from_xpub(xpub)?;
        if from_xpub != airnode_address {
            tracing::error!(
                configured = %airnode_address,
                derived = %from_xpub,
                "airnodeAddress does not match airnodeXpub",
            );
            return Err(Error::InvalidAirkeeperConfig);
        }
    }

    let triggers = keeper
        .triggers
        .or(node.triggers)
        .unwrap_or_default();

    let mut subscriptions = node.subscriptions;
    subscriptions.extend(keeper.subscriptions);
    let mut templates = node.templates;
    templates.extend(keeper.templates);
    let mut endpoints = node.endpoints;
    endpoints.extend(keeper.endpoints);

    Ok(Config {
        chains,
        airnode_wallet_mnemonic: mnemonic,
        airnode_address,
        ois: node.ois,
        api_credentials: node.api_credentials,
        triggers,
        subscriptions,
        templates,
        endpoints,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TEST_MNEMONIC: &str =
        "test test test test test test test test test test test junk";
    // m/44'/60'/0'/0/0 of the mnemonic above
    const TEST_AIRNODE: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn node_config(value: serde_json::Value) -> NodeConfig {
        serde_json::from_value(value).unwrap()
    }

    fn keeper_config(value: serde_json::Value) -> KeeperConfig {
        serde_json::from_value(value).unwrap()
    }

    fn base_node() -> NodeConfig {
        node_config(json!({
            "chains": [{
                "id": "31337",
                "type": "evm",
                "contracts": {
                    "AirnodeRrp": "0x5FbDB2315678afecb367f032d93F642f64180aa3"
                },
                "providers": {
                    "local": { "url": "http://127.0.0.1:8545" }
                }
            }],
            "nodeSettings": { "airnodeWalletMnemonic": TEST_MNEMONIC }
        }))
    }

    fn base_keeper() -> KeeperConfig {
        keeper_config(json!({
            "airnodeAddress": TEST_AIRNODE,
            "chains": [{
                "id": "31337",
                "contracts": {
                    "RrpBeaconServer":
                        "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512",
                    "DapiServer":
                        "0x9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0"
                },
                "providers": {
                    "backup": { "url": "http://127.0.0.1:8546" }
                },
                "blockHistoryLimit": 100
            }],
            "triggers": { "protoPsp": [] }
        }))
    }

    #[test]
    fn merges_chains_by_id() {
        let config = merge(base_node(), base_keeper()).unwrap();
        assert_eq!(config.chains.len(), 1);
        let chain = &config.chains[0];
        assert!(chain.contracts.airnode_rrp.is_some());
        assert!(chain.contracts.rrp_beacon_server.is_some());
        assert!(chain.contracts.dapi_server.is_some());
        assert_eq!(chain.providers.len(), 2);
        assert_eq!(chain.block_history_limit, 100);
        assert_eq!(
            config.airnode_address,
            TEST_AIRNODE.parse().unwrap()
        );
    }

    #[test]
    fn missing_mnemonic_is_an_airnode_config_error() {
        let node = node_config(json!({
            "chains": [{ "id": "31337", "type": "evm" }],
            "nodeSettings": { "airnodeWalletMnemonic": null }
        }));
        let err = merge(node, base_keeper()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid Airnode configuration file");
    }

    #[test]
    fn missing_airnode_address_is_an_airkeeper_config_error() {
        let keeper = keeper_config(json!({ "airnodeAddress": null }));
        let err = merge(base_node(), keeper).unwrap_err();
        assert_eq!(err.to_string(), "Invalid Airkeeper configuration file");
    }

    #[test]
    fn mismatched_airnode_address_is_an_airkeeper_config_error() {
        let keeper = keeper_config(json!({
            "airnodeAddress": "0x0000000000000000000000000000000000000001"
        }));
        let err = merge(base_node(), keeper).unwrap_err();
        assert_eq!(err.to_string(), "Invalid Airkeeper configuration file");
    }

    #[test]
    fn unknown_keeper_chain_is_fatal() {
        let mut keeper = base_keeper();
        keeper.chains[0].id = "1".into();
        let err = merge(base_node(), keeper).unwrap_err();
        assert_eq!(err.to_string(), "Invalid Airkeeper configuration file");
    }

    #[test]
    fn a_config_without_evm_chains_is_rejected() {
        let node = node_config(json!({
            "chains": [{ "id": "sol", "type": "solana" }],
            "nodeSettings": { "airnodeWalletMnemonic": TEST_MNEMONIC }
        }));
        let err = merge(node, base_keeper()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid Airnode configuration file");
    }

    #[test]
    fn keeper_entities_replace_or_add() {
        let mut node = base_node();
        node.templates = serde_json::from_value(json!({
            "0x0000000000000000000000000000000000000000000000000000000000000001": {
                "endpointId":
                    "0x00000000000000000000000000000000000000000000000000000000000000aa",
                "templateParameters": "0x"
            }
        }))
        .unwrap();
        let mut keeper = base_keeper();
        keeper.templates = serde_json::from_value(json!({
            "0x0000000000000000000000000000000000000000000000000000000000000001": {
                "endpointId":
                    "0x00000000000000000000000000000000000000000000000000000000000000bb",
                "templateParameters": "0x"
            },
            "0x0000000000000000000000000000000000000000000000000000000000000002": {
                "endpointId":
                    "0x00000000000000000000000000000000000000000000000000000000000000cc",
                "templateParameters": "0x"
            }
        }))
        .unwrap();
        let config = merge(node, keeper).unwrap();
        assert_eq!(config.templates.len(), 2);
        let replaced = config.templates
            [&"0x0000000000000000000000000000000000000000000000000000000000000001"
                .parse()
                .unwrap()]
            .clone();
        assert_eq!(
            replaced.endpoint_id,
            "0x00000000000000000000000000000000000000000000000000000000000000bb"
                .parse()
                .unwrap()
        );
    }
}
