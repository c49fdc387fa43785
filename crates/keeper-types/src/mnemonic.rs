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

use ethers::signers::coins_bip39::{English, Mnemonic as Bip39Mnemonic};
use serde::Deserialize;

/// Mnemonic represents the airnode wallet mnemonic seed phrase.
///
/// The phrase is validated against the english BIP-39 word list on
/// deserialization. `Debug` never prints the phrase.
#[derive(Clone)]
pub struct Mnemonic(String);

impl Mnemonic {
    /// Returns the phrase itself, for wallet derivation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Mnemonic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("mnemonic").finish()
    }
}

impl std::str::FromStr for Mnemonic {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Bip39Mnemonic::<English>::new_from_phrase(value).map_err(|_| {
            String::from("not a valid 12/24 word mnemonic phrase")
        })?;
        Ok(Self(value.to_string()))
    }
}

impl<'de> Deserialize<'de> for Mnemonic {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        let phrase = if let Some(var) = value.strip_prefix('$') {
            // an env var holding the phrase
            tracing::trace!("Reading {} from env", var);
            std::env::var(var).map_err(|e| {
                serde::de::Error::custom(format!(
                    "error while loading this env {var}: {e}",
                ))
            })?
        } else {
            value
        };
        phrase.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str =
        "test test test test test test test test test test test junk";

    #[test]
    fn parses_a_valid_phrase() {
        let mnemonic: Mnemonic = TEST_MNEMONIC.parse().unwrap();
        assert_eq!(mnemonic.as_str(), TEST_MNEMONIC);
    }

    #[test]
    fn rejects_garbage() {
        assert!("not a mnemonic".parse::<Mnemonic>().is_err());
    }

    #[test]
    fn debug_does_not_leak_the_phrase() {
        let mnemonic: Mnemonic = TEST_MNEMONIC.parse().unwrap();
        let rendered = format!("{mnemonic:?}");
        assert!(!rendered.contains("junk"));
    }

    #[test]
    fn deserializes_from_env_indirection() {
        std::env::set_var("AIRKEEPER_TEST_MNEMONIC", TEST_MNEMONIC);
        let json = "\"$AIRKEEPER_TEST_MNEMONIC\"";
        let mnemonic: Mnemonic = serde_json::from_str(json).unwrap();
        assert_eq!(mnemonic.as_str(), TEST_MNEMONIC);
    }
}
