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

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::{merge, Config, KeeperConfig, NodeConfig};

/// File name of the airnode node configuration document.
pub const NODE_CONFIG_FILE: &str = "config.json";
/// File name of the airkeeper configuration document.
pub const KEEPER_CONFIG_FILE: &str = "airkeeper.json";

/// A helper function that will search for all config files in the given
/// directory and return them as a vec of the paths.
pub fn search_config_files<P: AsRef<Path>>(
    base_dir: P,
) -> airkeeper_utils::Result<Vec<PathBuf>> {
    let json_pattern = format!("{}/**/*.json", base_dir.as_ref().display());
    tracing::trace!("Loading config files from {}", json_pattern);
    let json_files = glob::glob(&json_pattern)?;
    json_files
        .map(|v| v.map_err(airkeeper_utils::Error::from))
        .collect()
}

/// Parses one config document. The documents are camelCase JSON, parsed
/// strictly; secrets inside them use `$ENV` indirection instead of a
/// config overlay.
fn parse_document<T: DeserializeOwned>(
    path: &Path,
) -> airkeeper_utils::Result<T> {
    tracing::trace!("Loading config file: {}", path.display());
    let raw = std::fs::read_to_string(path)?;
    let mut deserializer = serde_json::Deserializer::from_str(&raw);
    let document: Result<
        T,
        serde_path_to_error::Error<serde_json::Error>,
    > = serde_path_to_error::deserialize(&mut deserializer);
    match document {
        Ok(document) => Ok(document),
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}

/// Loads and merges the two configuration documents from a directory.
///
/// The directory must contain [`NODE_CONFIG_FILE`] and
/// [`KEEPER_CONFIG_FILE`]; anything else matching `*.json` is ignored.
pub fn load<P: AsRef<Path>>(base_dir: P) -> airkeeper_utils::Result<Config> {
    let files = search_config_files(&base_dir)?;
    let find = |name: &str| {
        files
            .iter()
            .find(|p| p.file_name().map(|f| f == name).unwrap_or(false))
            .cloned()
    };
    let node_path = find(NODE_CONFIG_FILE)
        .ok_or(airkeeper_utils::Error::InvalidAirnodeConfig)?;
    let keeper_path = find(KEEPER_CONFIG_FILE)
        .ok_or(airkeeper_utils::Error::InvalidAirkeeperConfig)?;

    let node: NodeConfig = parse_document(&node_path)?;
    let keeper: KeeperConfig = parse_document(&keeper_path)?;
    merge::merge(node, keeper)
}
