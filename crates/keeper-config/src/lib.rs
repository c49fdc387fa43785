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

//! # Airkeeper Configuration Module
//!
//! The keeper consumes two JSON documents: the airnode node configuration
//! (`config.json`: chains, wallet mnemonic, OIS endpoint specifications,
//! API credentials) and the airkeeper configuration (`airkeeper.json`:
//! the airnode address, chain overlays and the update triggers). The two
//! are merged into one immutable [`Config`] per invocation; see
//! [`merge::merge`] for the rules.

/// CLI configuration
pub mod cli;
/// Merging of the node and keeper documents
pub mod merge;
/// Utils for locating and parsing configuration files
pub mod utils;

use std::collections::HashMap;

use airkeeper_types::{Mnemonic, RpcUrl};
use ethers::types::{Address, Bytes, H256};
use serde::Deserialize;

/// Blocks of on-chain history scanned for duplicate update requests.
const fn default_block_history_limit() -> u64 {
    300
}

/// The airnode node configuration document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    /// The chains the airnode serves.
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
    /// Node-wide settings, including the wallet mnemonic.
    pub node_settings: NodeSettings,
    /// The OIS (endpoint specification) list.
    #[serde(default)]
    pub ois: Vec<Ois>,
    /// Credentials for the APIs described by the OIS list.
    #[serde(default)]
    pub api_credentials: Vec<ApiCredentials>,
    /// Optional node-side triggers, overridable by the keeper document.
    #[serde(default)]
    pub triggers: Option<Triggers>,
    /// Known subscriptions by id.
    #[serde(default)]
    pub subscriptions: HashMap<H256, Subscription>,
    /// Known templates by id.
    #[serde(default)]
    pub templates: HashMap<H256, Template>,
    /// Known endpoints by id.
    #[serde(default)]
    pub endpoints: HashMap<H256, Endpoint>,
}

/// Node-wide settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSettings {
    /// The mnemonic every keeper wallet is derived from.
    #[serde(default)]
    pub airnode_wallet_mnemonic: Option<Mnemonic>,
    /// Deployment stage label (e.g. `dev`), for logging only.
    #[serde(default)]
    pub stage: Option<String>,
    /// Cloud provider label, for logging only.
    #[serde(default)]
    pub cloud_provider: Option<String>,
}

/// Configuration of a single chain.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    /// Chain id, as a decimal string.
    pub id: String,
    /// Chain family. Only `evm` chains are served.
    #[serde(rename = "type")]
    pub chain_type: ChainType,
    /// Protocol contract addresses deployed on this chain.
    #[serde(default)]
    pub contracts: ChainContracts,
    /// Named JSON-RPC providers for this chain.
    #[serde(default)]
    pub providers: HashMap<String, ChainProvider>,
    /// Blocks of history scanned for pending update requests.
    #[serde(default = "default_block_history_limit")]
    pub block_history_limit: u64,
    /// Transaction pricing options.
    #[serde(default)]
    pub options: ChainOptions,
}

/// The chain family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    /// An EVM compatible chain.
    Evm,
    /// Anything the keeper does not serve.
    #[serde(other)]
    Other,
}

/// Protocol contract addresses on one chain.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainContracts {
    /// The AirnodeRrp contract.
    #[serde(rename = "AirnodeRrp", default)]
    pub airnode_rrp: Option<Address>,
    /// The RrpBeaconServer contract.
    #[serde(rename = "RrpBeaconServer", default)]
    pub rrp_beacon_server: Option<Address>,
    /// The DapiServer contract.
    #[serde(rename = "DapiServer", default)]
    pub dapi_server: Option<Address>,
}

/// A named JSON-RPC provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainProvider {
    /// The JSON-RPC endpoint.
    pub url: RpcUrl,
}

/// Transaction pricing options for one chain.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainOptions {
    /// Which transaction type update transactions use.
    #[serde(default)]
    pub tx_type: TxType,
    /// Multiplier applied to the latest base fee (eip1559 only).
    #[serde(default)]
    pub base_fee_multiplier: Option<u64>,
    /// Priority fee added on top of the multiplied base fee (eip1559 only).
    #[serde(default)]
    pub priority_fee: Option<PriorityFee>,
}

/// Transaction type selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxType {
    /// Pre-eip1559 gas pricing.
    Legacy,
    /// Base fee + priority fee pricing.
    #[default]
    Eip1559,
}

/// A gas fee amount with its unit.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PriorityFee {
    /// The amount, possibly fractional (e.g. `3.12` gwei).
    pub value: f64,
    /// The unit of the amount. Defaults to wei.
    #[serde(default)]
    pub unit: Option<FeeUnit>,
}

/// Ether denominations accepted for fee amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeUnit {
    /// 10^0 wei
    Wei,
    /// 10^3 wei
    Kwei,
    /// 10^6 wei
    Mwei,
    /// 10^9 wei
    Gwei,
    /// 10^12 wei
    Szabo,
    /// 10^15 wei
    Finney,
    /// 10^18 wei
    Ether,
}

impl FeeUnit {
    /// The unit name as `ethers` spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wei => "wei",
            Self::Kwei => "kwei",
            Self::Mwei => "mwei",
            Self::Gwei => "gwei",
            Self::Szabo => "szabo",
            Self::Finney => "finney",
            Self::Ether => "ether",
        }
    }
}

/// A request template: an endpoint plus encoded parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    /// The endpoint this template points at.
    pub endpoint_id: H256,
    /// airnode-ABI encoded template parameters.
    #[serde(default)]
    pub template_parameters: Bytes,
}

/// An endpoint reference: which OIS, which operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Title of the OIS the endpoint belongs to.
    pub ois_title: String,
    /// Name of the endpoint within the OIS.
    pub endpoint_name: String,
}

/// A PSP subscription: the full nine-tuple an on-chain subscription id
/// commits to.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Chain id, as a decimal string.
    pub chain_id: String,
    /// The airnode that serves the subscription.
    pub airnode_address: Address,
    /// The template the subscription requests.
    pub template_id: H256,
    /// airnode-ABI encoded request parameters.
    #[serde(default)]
    pub parameters: Bytes,
    /// ABI encoded `(bytes4, bytes)` condition blob.
    pub conditions: Bytes,
    /// The relayer address.
    pub relayer: Address,
    /// The sponsor whose wallet pays for updates.
    pub sponsor: Address,
    /// The requester contract.
    pub requester: Address,
    /// Selector of the fulfillment function (4 bytes).
    pub fulfill_function_id: Bytes,
}

/// The keeper's update triggers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Triggers {
    /// Legacy RRP beacon update jobs.
    #[serde(default)]
    pub rrp_beacon_server_keeper_jobs: Vec<RrpBeaconServerKeeperJob>,
    /// PSP subscription ids to serve.
    #[serde(default)]
    pub proto_psp: Vec<H256>,
}

/// A single RRP beacon update job.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RrpBeaconServerKeeperJob {
    /// The template the job requests.
    pub template_id: H256,
    /// Typed template parameters, encoded on demand.
    #[serde(default)]
    pub template_parameters: Vec<ConfigParameter>,
    /// The endpoint behind the template.
    pub endpoint_id: H256,
    /// Deviation percentage above which an update is worthwhile, with up
    /// to two decimal places.
    pub deviation_percentage: f64,
    /// Sponsor of the keeper wallet that pays for update requests.
    pub keeper_sponsor: Address,
    /// Sponsor of the wallet that fulfills the request.
    pub request_sponsor: Address,
    /// Restrict the job to these chains. `None` means every chain.
    #[serde(default)]
    pub chain_ids: Option<Vec<String>>,
}

/// A typed parameter as written in config files.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigParameter {
    /// The airnode-ABI type name (e.g. `string32`).
    pub r#type: String,
    /// Parameter name.
    pub name: String,
    /// Parameter value, rendered as a string.
    pub value: String,
}

/// An OIS: the specification of one HTTP API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ois {
    /// Unique title endpoints refer to.
    pub title: String,
    /// OIS document version.
    #[serde(default)]
    pub version: Option<String>,
    /// Where and how to reach the API.
    pub api_specifications: ApiSpecifications,
    /// Callable endpoints of the API.
    #[serde(default)]
    pub endpoints: Vec<OisEndpoint>,
}

/// The transport-level part of an OIS.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSpecifications {
    /// Base URLs; the first is used.
    #[serde(default)]
    pub servers: Vec<ApiServer>,
    /// Reusable components (security schemes).
    #[serde(default)]
    pub components: ApiComponents,
}

/// A server base URL.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiServer {
    /// The base URL of the API.
    pub url: url::Url,
}

/// Reusable OIS components.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiComponents {
    /// Security schemes by name.
    #[serde(default)]
    pub security_schemes: HashMap<String, SecurityScheme>,
}

/// How an API authenticates callers.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityScheme {
    /// The scheme kind; only `apiKey` is supported.
    #[serde(rename = "type")]
    pub scheme_type: SecuritySchemeType,
    /// Where the key goes.
    #[serde(rename = "in")]
    pub location: SecuritySchemeLocation,
    /// The query parameter or header name carrying the key.
    pub name: String,
}

/// Supported security scheme kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SecuritySchemeType {
    /// A static API key.
    ApiKey,
    /// Anything else; skipped with a warning.
    #[serde(other)]
    Other,
}

/// Where a security scheme places its credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecuritySchemeLocation {
    /// As a query string parameter.
    Query,
    /// As an HTTP header.
    Header,
}

/// A callable endpoint of an OIS.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OisEndpoint {
    /// Endpoint name, referenced from [`Endpoint`].
    pub name: String,
    /// The HTTP operation behind the endpoint.
    pub operation: OisOperation,
    /// Parameters hardwired by the OIS.
    #[serde(default)]
    pub fixed_operation_parameters: Vec<FixedOperationParameter>,
    /// User-suppliable parameters and how they map onto the operation.
    #[serde(default)]
    pub parameters: Vec<EndpointParameter>,
    /// Reserved parameters (`_type`, `_path`, `_times`) and their defaults.
    #[serde(default)]
    pub reserved_parameters: Vec<ReservedParameter>,
}

/// The HTTP operation of an endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OisOperation {
    /// The HTTP method.
    pub method: HttpMethod,
    /// The path under the server base URL.
    pub path: String,
}

/// Supported HTTP methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    /// HTTP GET.
    Get,
    /// HTTP POST.
    Post,
}

/// A parameter hardwired by the OIS author.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedOperationParameter {
    /// Where the value goes in the operation.
    pub operation_parameter: OperationParameter,
    /// The hardwired value.
    pub value: String,
}

/// A user-suppliable endpoint parameter.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointParameter {
    /// The name requests use.
    pub name: String,
    /// Where the value goes in the operation.
    pub operation_parameter: OperationParameter,
}

/// Placement of a parameter in the HTTP operation.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationParameter {
    /// Query string, header, or path.
    #[serde(rename = "in")]
    pub location: OperationParameterLocation,
    /// The wire name of the parameter.
    pub name: String,
}

/// Where an operation parameter is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationParameterLocation {
    /// In the query string.
    Query,
    /// As an HTTP header.
    Header,
    /// Substituted into the path.
    Path,
}

/// A reserved parameter declaration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservedParameter {
    /// The reserved parameter name (`_type`, `_path`, `_times`).
    pub name: String,
    /// A value the OIS pins; requests cannot override it.
    #[serde(default)]
    pub fixed: Option<String>,
    /// A fallback used when requests do not supply the parameter.
    #[serde(default)]
    pub default: Option<String>,
}

/// Credentials for one OIS.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCredentials {
    /// The OIS these credentials belong to.
    pub ois_title: String,
    /// Which of the OIS security schemes to use.
    pub security_scheme_name: String,
    /// The credential itself.
    pub security_scheme_value: String,
}

/// The airkeeper configuration document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeeperConfig {
    /// The airnode address; must match the wallet the mnemonic derives.
    #[serde(default)]
    pub airnode_address: Option<Address>,
    /// The airnode extended public key rooted at `m/44'/60'/0'`.
    #[serde(default)]
    pub airnode_xpub: Option<String>,
    /// Chain overlays, deep-merged onto the node chains by id.
    #[serde(default)]
    pub chains: Vec<ChainOverlay>,
    /// Keeper-side triggers; replace the node triggers when present.
    #[serde(default)]
    pub triggers: Option<Triggers>,
    /// Subscriptions added or replaced by the keeper document.
    #[serde(default)]
    pub subscriptions: HashMap<H256, Subscription>,
    /// Templates added or replaced by the keeper document.
    #[serde(default)]
    pub templates: HashMap<H256, Template>,
    /// Endpoints added or replaced by the keeper document.
    #[serde(default)]
    pub endpoints: HashMap<H256, Endpoint>,
}

/// A partial chain entry merged onto the matching node chain.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainOverlay {
    /// The id of the node chain to merge onto.
    pub id: String,
    /// Contract addresses to add or replace.
    #[serde(default)]
    pub contracts: ChainContracts,
    /// Providers to add or replace.
    #[serde(default)]
    pub providers: HashMap<String, ChainProvider>,
    /// Overrides the node's block history limit.
    #[serde(default)]
    pub block_history_limit: Option<u64>,
    /// Overrides the node's transaction pricing options.
    #[serde(default)]
    pub options: Option<ChainOptions>,
}

/// The merged, validated configuration an update cycle runs against.
#[derive(Debug, Clone)]
pub struct Config {
    /// Merged chains.
    pub chains: Vec<ChainConfig>,
    /// The wallet mnemonic.
    pub airnode_wallet_mnemonic: Mnemonic,
    /// The validated airnode address.
    pub airnode_address: Address,
    /// OIS list from the node document.
    pub ois: Vec<Ois>,
    /// API credentials from the node document.
    pub api_credentials: Vec<ApiCredentials>,
    /// Effective triggers.
    pub triggers: Triggers,
    /// Effective subscriptions by id.
    pub subscriptions: HashMap<H256, Subscription>,
    /// Effective templates by id.
    pub templates: HashMap<H256, Template>,
    /// Effective endpoints by id.
    pub endpoints: HashMap<H256, Endpoint>,
}

impl Config {
    /// Looks up an OIS by title.
    pub fn ois_by_title(&self, title: &str) -> Option<&Ois> {
        self.ois.iter().find(|ois| ois.title == title)
    }

    /// Looks up the credentials configured for an OIS.
    pub fn credentials_for(&self, title: &str) -> Option<&ApiCredentials> {
        self.api_credentials
            .iter()
            .find(|credentials| credentials.ois_title == title)
    }

    /// The chains the keeper actually serves.
    pub fn evm_chains(&self) -> impl Iterator<Item = &ChainConfig> {
        self.chains
            .iter()
            .filter(|chain| chain.chain_type == ChainType::Evm)
    }
}
