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

//! Derivation of the protocol entity ids.
//!
//! Every id in the airnode protocol is the Keccak-256 of a canonical
//! encoding of the entity's fields. Configured ids are never trusted: the
//! keeper recomputes each id and drops any work unit whose declared id does
//! not match the derived one.

use ethers::abi::{encode, encode_packed, Token};
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;

use airkeeper_utils::Result;

/// Derives an endpoint id from the OIS title and endpoint name.
///
/// `keccak256(abi.encode(oisTitle, endpointName))`
pub fn derive_endpoint_id(ois_title: &str, endpoint_name: &str) -> H256 {
    let encoded = encode(&[
        Token::String(ois_title.to_owned()),
        Token::String(endpoint_name.to_owned()),
    ]);
    H256::from(keccak256(encoded))
}

/// Derives a PSP (protocol v1) template id.
///
/// `keccak256(abi.encodePacked(endpointId, templateParameters))`
pub fn derive_template_id(
    endpoint_id: H256,
    template_parameters: &[u8],
) -> Result<H256> {
    let packed = encode_packed(&[
        Token::FixedBytes(endpoint_id.as_bytes().to_vec()),
        Token::Bytes(template_parameters.to_vec()),
    ])?;
    Ok(H256::from(keccak256(packed)))
}

/// Derives an RRP (protocol v0) template id, which also commits to the
/// airnode address.
///
/// `keccak256(abi.encodePacked(airnode, endpointId, templateParameters))`
pub fn derive_rrp_template_id(
    airnode: Address,
    endpoint_id: H256,
    template_parameters: &[u8],
) -> Result<H256> {
    let packed = encode_packed(&[
        Token::Address(airnode),
        Token::FixedBytes(endpoint_id.as_bytes().to_vec()),
        Token::Bytes(template_parameters.to_vec()),
    ])?;
    Ok(H256::from(keccak256(packed)))
}

/// Derives a beacon id from a template id and the request parameters.
///
/// `keccak256(abi.encodePacked(templateId, parameters))`
pub fn derive_beacon_id(template_id: H256, parameters: &[u8]) -> Result<H256> {
    let packed = encode_packed(&[
        Token::FixedBytes(template_id.as_bytes().to_vec()),
        Token::Bytes(parameters.to_vec()),
    ])?;
    Ok(H256::from(keccak256(packed)))
}

/// Derives a subscription id from the nine canonical subscription fields.
#[allow(clippy::too_many_arguments)]
pub fn derive_subscription_id(
    chain_id: U256,
    airnode: Address,
    template_id: H256,
    parameters: &[u8],
    conditions: &[u8],
    relayer: Address,
    sponsor: Address,
    requester: Address,
    fulfill_function_id: [u8; 4],
) -> H256 {
    let encoded = encode(&[
        Token::Uint(chain_id),
        Token::Address(airnode),
        Token::FixedBytes(template_id.as_bytes().to_vec()),
        Token::Bytes(parameters.to_vec()),
        Token::Bytes(conditions.to_vec()),
        Token::Address(relayer),
        Token::Address(sponsor),
        Token::Address(requester),
        Token::FixedBytes(fulfill_function_id.to_vec()),
    ]);
    H256::from(keccak256(encoded))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::from([b; 20])
    }

    #[test]
    fn endpoint_id_commits_to_both_fields() {
        let id = derive_endpoint_id("Currency Converter API", "convertToUSD");
        assert_ne!(
            id,
            derive_endpoint_id("Currency Converter API", "convertToEUR")
        );
        assert_ne!(id, derive_endpoint_id("Another API", "convertToUSD"));
        assert_eq!(
            id,
            derive_endpoint_id("Currency Converter API", "convertToUSD")
        );
    }

    #[test]
    fn template_ids_differ_between_protocol_versions() {
        let endpoint_id = H256::from([1u8; 32]);
        let params = vec![0xde, 0xad, 0xbe, 0xef];
        let v1 = derive_template_id(endpoint_id, &params).unwrap();
        let v0 =
            derive_rrp_template_id(addr(2), endpoint_id, &params).unwrap();
        assert_ne!(v1, v0);
    }

    #[test]
    fn subscription_id_commits_to_every_field() {
        let base = || {
            derive_subscription_id(
                U256::from(31337u64),
                addr(1),
                H256::from([2u8; 32]),
                &[],
                &[3u8; 8],
                addr(4),
                addr(5),
                addr(6),
                [0xab, 0xcd, 0xef, 0x01],
            )
        };
        let reference = base();
        assert_eq!(reference, base());

        let tampered_chain = derive_subscription_id(
            U256::from(1u64),
            addr(1),
            H256::from([2u8; 32]),
            &[],
            &[3u8; 8],
            addr(4),
            addr(5),
            addr(6),
            [0xab, 0xcd, 0xef, 0x01],
        );
        assert_ne!(reference, tampered_chain);

        let tampered_fulfill = derive_subscription_id(
            U256::from(31337u64),
            addr(1),
            H256::from([2u8; 32]),
            &[],
            &[3u8; 8],
            addr(4),
            addr(5),
            addr(6),
            [0xab, 0xcd, 0xef, 0x02],
        );
        assert_ne!(reference, tampered_fulfill);
    }

    #[test]
    fn beacon_id_changes_with_parameters() {
        let template_id = H256::from([7u8; 32]);
        let a = derive_beacon_id(template_id, &[]).unwrap();
        let b = derive_beacon_id(template_id, &[0x01]).unwrap();
        assert_ne!(a, b);
    }
}
