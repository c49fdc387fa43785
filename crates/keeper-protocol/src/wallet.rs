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

//! Deterministic wallet derivation.
//!
//! The airnode identity lives at `m/44'/60'/0'/0/0` of the configured
//! mnemonic. Sponsor wallets live under a per-protocol subtree addressed by
//! the sponsor address itself, so the same `(mnemonic, sponsor, protocolId)`
//! always produces the same gas-paying wallet without any bookkeeping.

use coins_bip32::prelude::*;
use ethers::core::k256::ecdsa::VerifyingKey;
use ethers::core::k256::elliptic_curve::sec1::ToEncodedPoint;
use ethers::signers::coins_bip39::English;
use ethers::signers::{LocalWallet, MnemonicBuilder};
use ethers::types::{Address, U256};
use ethers::utils::keccak256;

use airkeeper_utils::{Error, Result};

/// Protocol id of the request-response protocol (plain airnode requests).
pub const PROTOCOL_ID_RRP: &str = "1";
/// Protocol id of the publish-subscribe protocol.
pub const PROTOCOL_ID_PSP: &str = "2";
/// Protocol id of the previous publish-subscribe convention. Kept because
/// wallets funded under it are still in use on-chain.
pub const PROTOCOL_ID_PSP_LEGACY: &str = "3";
/// Protocol id of the keeper-sponsor convention for RRP beacon update jobs.
pub const PROTOCOL_ID_RRP_KEEPER: &str = "12345";

/// The derivation path of the airnode identity wallet.
pub const AIRNODE_DERIVATION_PATH: &str = "m/44'/60'/0'/0/0";

/// Derives the airnode identity wallet from the configured mnemonic.
pub fn derive_airnode_wallet(mnemonic: &str) -> Result<LocalWallet> {
    let wallet = MnemonicBuilder::<English>::default()
        .phrase(mnemonic)
        .derivation_path(AIRNODE_DERIVATION_PATH)?
        .build()?;
    Ok(wallet)
}

/// Splits a sponsor address into the six 31-bit derivation path groups,
/// least-significant group first.
pub fn sponsor_address_to_derivation_path(sponsor: Address) -> String {
    let sponsor = U256::from_big_endian(sponsor.as_bytes());
    let mask = U256::from((1u64 << 31) - 1);
    (0..6)
        .map(|i| ((sponsor >> (31 * i)) & mask).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Builds the full sponsor wallet derivation path for a protocol id.
pub fn sponsor_wallet_path(sponsor: Address, protocol_id: &str) -> String {
    format!(
        "m/44'/60'/0'/{protocol_id}/{}",
        sponsor_address_to_derivation_path(sponsor)
    )
}

/// Derives the sponsor wallet for `(mnemonic, sponsor, protocolId)`.
pub fn derive_sponsor_wallet(
    mnemonic: &str,
    sponsor: Address,
    protocol_id: &str,
) -> Result<LocalWallet> {
    let path = sponsor_wallet_path(sponsor, protocol_id);
    let wallet = MnemonicBuilder::<English>::default()
        .phrase(mnemonic)
        .derivation_path(&path)?
        .build()?;
    Ok(wallet)
}

fn verifying_key_to_address(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Derives the airnode address from an extended public key rooted at
/// `m/44'/60'/0'`, by walking the non-hardened `0/0` suffix.
pub fn derive_airnode_address_from_xpub(xpub: &str) -> Result<Address> {
    let xpub: XPub = xpub.parse().map_err(|e| {
        Error::WalletDerivation(format!("invalid airnodeXpub: {e:?}"))
    })?;
    let child = xpub
        .derive_child(0)
        .and_then(|x| x.derive_child(0))
        .map_err(|e| {
            Error::WalletDerivation(format!("airnodeXpub derivation: {e:?}"))
        })?;
    let key: &VerifyingKey = child.as_ref();
    Ok(verifying_key_to_address(key))
}
