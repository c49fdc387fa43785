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

#![warn(missing_docs)]
//! # Airkeeper Utils 🛠️
//!
//! Common error types, probe logging targets and retry policies shared by
//! every Airkeeper crate.

use std::time::Duration;

use ethers::core::k256::ecdsa::SigningKey;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Provider};
use ethers::signers::Wallet;

/// A module used for debugging the keeper lifecycle, cycle phases, or other
/// keeper state.
pub mod probe;
/// Retry functionality
pub mod retry;

/// The JSON-RPC client type used for read-only calls.
pub type EvmClient = Provider<Http>;
/// The JSON-RPC client type used for submitting signed transactions.
pub type EvmSignerClient = SignerMiddleware<Provider<Http>, Wallet<SigningKey>>;

/// An enum of all possible errors that could be encountered during the
/// execution of the Airkeeper.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Error while parsing the config files.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<serde_json::Error>),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error from Glob Iterator.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// HTTP error while calling an off-chain API.
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// Error in Http Provider (ethers client).
    #[error(transparent)]
    EthersProvider(#[from] ethers::providers::ProviderError),
    /// Smart contract error.
    #[error(transparent)]
    EthersContractCall(#[from] ethers::contract::ContractError<EvmClient>),
    /// Smart contract error, for calls going through a signer.
    #[error(transparent)]
    EthersContractCallWithSigner(
        #[from] ethers::contract::ContractError<EvmSignerClient>,
    ),
    /// Ether wallet errors.
    #[error(transparent)]
    EtherWalletError(#[from] ethers::signers::WalletError),
    /// ABI de/serialization error.
    #[error(transparent)]
    EthersAbi(#[from] ethers::abi::Error),
    /// Packed ABI encoding error.
    #[error(transparent)]
    EthersAbiEncodePacked(#[from] ethers::abi::EncodePackedError),
    /// Ethers currency conversion error.
    #[error(transparent)]
    Conversion(#[from] ethers::utils::ConversionError),
    /// The airnode configuration file is missing or malformed.
    #[error("Invalid Airnode configuration file")]
    InvalidAirnodeConfig,
    /// The airkeeper configuration file is missing or malformed.
    #[error("Invalid Airkeeper configuration file")]
    InvalidAirkeeperConfig,
    /// EVM Chain not found.
    #[error("Chain Not Found: {}", chain_id)]
    ChainNotFound {
        /// The chain id of the chain.
        chain_id: String,
    },
    /// OIS referenced by an endpoint is not part of the config.
    #[error("OIS Not Found: {}", ois_title)]
    OisNotFound {
        /// The title of the missing OIS.
        ois_title: String,
    },
    /// Failed to derive a wallet from the configured mnemonic.
    #[error("Wallet derivation failed: {}", _0)]
    WalletDerivation(String),
    /// A required reserved parameter was missing from the template.
    #[error("Missing reserved parameter: {}", _0)]
    MissingReservedParameter(&'static str),
    /// The off-chain API response could not be reduced to a numeric value.
    #[error("Invalid API response: {}", _0)]
    InvalidApiResponse(String),
    /// The airnode-ABI encoded parameters blob is malformed.
    #[error("Invalid airnode-ABI parameters: {}", _0)]
    InvalidAbiParameters(String),
    /// Subscription conditions blob could not be decoded.
    #[error("Invalid subscription conditions")]
    InvalidConditions,
    /// The condition function selector is not one the keeper knows about.
    #[error("Unknown condition function: 0x{}", hex::encode(selector))]
    UnknownConditionFunction {
        /// The 4-byte selector found in the conditions blob.
        selector: [u8; 4],
    },
    /// No API value was fetched for the given subscription this cycle.
    #[error("No API value for subscription: {}", subscription_id)]
    MissingApiValue {
        /// The subscription missing its value.
        subscription_id: String,
    },
    /// An external call did not finish within its per-attempt timeout.
    #[error("Operation timed out after {:?}", _0)]
    Timeout(Duration),
    /// The whole update cycle overran its deadline and was aborted.
    #[error("Update cycle deadline of {:?} exceeded", _0)]
    CycleDeadlineExceeded(Duration),
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
}

/// A type alias for the result used across the Airkeeper, that uses the
/// [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;
