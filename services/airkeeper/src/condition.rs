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

//! The PSP update condition check.
//!
//! The subscription's `conditions` blob names an on-chain view function by
//! selector; the keeper dispatches over a fixed table of known selectors
//! and asks the contract, as the zero address, whether the fetched value
//! deviates enough to justify an update. A failed call or a `false` answer
//! drops the subscription from this invocation without consuming a nonce.

use std::sync::Arc;

use airkeeper_config::Subscription;
use airkeeper_protocol::conditions;
use airkeeper_utils::{probe, retry, Error, Result};
use ethers::abi::Token;
use ethers::types::{Address, Bytes, H256, I256};
use ethers::utils::id;

use crate::contracts::DapiServer;
use crate::providers::ProviderState;

/// The one condition function the keeper knows how to evaluate.
pub const CONDITION_PSP_BEACON_UPDATE: &str =
    "conditionPspBeaconUpdate(bytes32,bytes,bytes)";

/// ABI encodes an API value the way beacon fulfillments carry it.
pub fn encode_fulfillment_data(api_value: I256) -> Bytes {
    ethers::abi::encode(&[Token::Int(api_value.into_raw())]).into()
}

/// Evaluates the subscription's update condition against the fetched
/// value.
pub async fn check_psp_condition(
    state: &ProviderState,
    subscription_id: H256,
    subscription: &Subscription,
    api_value: I256,
) -> Result<bool> {
    let decoded = conditions::decode_conditions(&subscription.conditions)?;
    let known_selector = id(CONDITION_PSP_BEACON_UPDATE);
    if decoded.condition_function_id != known_selector {
        return Err(Error::UnknownConditionFunction {
            selector: decoded.condition_function_id,
        });
    }

    let dapi_server_address = state
        .chain
        .contracts
        .dapi_server
        .ok_or(Error::Generic("DapiServer contract is not configured"))?;
    let dapi_server =
        DapiServer::new(dapi_server_address, Arc::new(state.client.clone()));
    let data = encode_fulfillment_data(api_value);
    let call = dapi_server
        .condition_psp_beacon_update(
            subscription_id.to_fixed_bytes(),
            data,
            Bytes::from(decoded.condition_parameters),
        )
        .from(Address::zero());

    let worthwhile =
        retry::with_defaults(|| async {
            call.call().await.map_err(Into::into)
        })
        .await?;

    tracing::event!(
        target: probe::TARGET,
        tracing::Level::DEBUG,
        kind = %probe::Kind::Condition,
        %subscription_id,
        %worthwhile,
    );
    Ok(worthwhile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;
    use airkeeper_protocol::conditions::encode_conditions;

    #[tokio::test]
    async fn an_unknown_selector_is_rejected_without_any_rpc_call() {
        let fixture = test_utils::fixture();
        let subscription = fixture
            .config
            .subscriptions
            .get(&fixture.eth_subscription_id)
            .unwrap();
        let mut tampered = subscription.clone();
        tampered.conditions =
            encode_conditions([0x01, 0x02, 0x03, 0x04], &[]).into();

        // a provider state that points at nothing; the selector check must
        // fire before any call is attempted
        let state = ProviderState {
            provider_name: "local".into(),
            chain: fixture.config.chains[0].clone(),
            client: ethers::providers::Provider::try_from(
                "http://127.0.0.1:1",
            )
            .unwrap(),
            current_block: 0u64.into(),
            gas_target: crate::providers::GasTarget::Legacy {
                gas_price: Default::default(),
            },
        };
        let result = check_psp_condition(
            &state,
            fixture.eth_subscription_id,
            &tampered,
            I256::from(1i64),
        )
        .await;
        assert!(matches!(
            result,
            Err(Error::UnknownConditionFunction { .. })
        ));
    }

    #[test]
    fn fulfillment_data_is_a_single_int256_word() {
        let data = encode_fulfillment_data(I256::from(-1i64));
        assert_eq!(data.len(), 32);
        assert_eq!(data.as_ref(), &[0xffu8; 32]);
    }
}
