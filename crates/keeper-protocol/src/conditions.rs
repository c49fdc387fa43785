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

//! Subscription conditions decoding.
//!
//! A PSP subscription carries an opaque `conditions` blob: the ABI encoding
//! of `(bytes4 _conditionFunctionId, bytes _conditionParameters)`. The
//! selector picks the on-chain view function that decides whether an update
//! is worthwhile; the keeper only dispatches over a fixed set of known
//! selectors.

use ethers::abi::{self, ParamType, Token};

use airkeeper_utils::{Error, Result};

/// The decoded contents of a subscription `conditions` blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedConditions {
    /// Selector of the on-chain condition view function.
    pub condition_function_id: [u8; 4],
    /// Opaque parameters forwarded to the condition function.
    pub condition_parameters: Vec<u8>,
}

/// Decodes a `conditions` blob.
pub fn decode_conditions(raw: &[u8]) -> Result<DecodedConditions> {
    let tokens = abi::decode(
        &[ParamType::FixedBytes(4), ParamType::Bytes],
        raw,
    )
    .map_err(|_| Error::InvalidConditions)?;
    match (&tokens[0], &tokens[1]) {
        (Token::FixedBytes(id), Token::Bytes(parameters)) if id.len() == 4 => {
            let mut condition_function_id = [0u8; 4];
            condition_function_id.copy_from_slice(id);
            Ok(DecodedConditions {
                condition_function_id,
                condition_parameters: parameters.clone(),
            })
        }
        _ => Err(Error::InvalidConditions),
    }
}

/// Encodes a `conditions` blob. The inverse of [`decode_conditions`], used
/// when constructing subscriptions.
pub fn encode_conditions(
    condition_function_id: [u8; 4],
    condition_parameters: &[u8],
) -> Vec<u8> {
    abi::encode(&[
        Token::FixedBytes(condition_function_id.to_vec()),
        Token::Bytes(condition_parameters.to_vec()),
    ])
}
