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

//! Test fixtures: a small but fully consistent configuration with two
//! currency-conversion beacons (ETH and BTC) sharing one sponsor, the way
//! a real deployment would wire them up. All ids are derived, never
//! hardcoded, so the fixtures stay valid under the same rules the resolver
//! enforces.

use std::collections::HashMap;

use airkeeper_config::{
    ApiComponents, ApiCredentials, ApiServer, ApiSpecifications, ChainConfig,
    ChainContracts, ChainOptions, ChainProvider, ChainType, Config,
    ConfigParameter, Endpoint, EndpointParameter, HttpMethod, Ois,
    OisEndpoint, OisOperation, OperationParameter,
    OperationParameterLocation, ReservedParameter, RrpBeaconServerKeeperJob,
    SecurityScheme, SecuritySchemeLocation, SecuritySchemeType,
    Subscription, Template, Triggers,
};
use airkeeper_protocol::abi::{self, TypedParameter};
use airkeeper_protocol::{conditions, ids, wallet};
use ethers::abi::Token;
use ethers::signers::Signer;
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::id;

pub const TEST_MNEMONIC: &str =
    "test test test test test test test test test test test junk";

pub const CHAIN_ID: &str = "31337";

pub struct Fixture {
    pub config: Config,
    pub airnode_address: Address,
    pub sponsor: Address,
    pub eth_subscription_id: H256,
    pub btc_subscription_id: H256,
    pub eth_template_id: H256,
    pub btc_template_id: H256,
}

pub struct RrpFixture {
    pub config: Config,
    pub airnode_address: Address,
}

fn currency_converter_ois() -> Ois {
    Ois {
        title: "Currency Converter API".into(),
        version: Some("1.0.0".into()),
        api_specifications: ApiSpecifications {
            servers: vec![ApiServer {
                url: "http://localhost:5000".parse().unwrap(),
            }],
            components: ApiComponents {
                security_schemes: HashMap::from([(
                    "currencyConverterSecurityScheme".to_string(),
                    SecurityScheme {
                        scheme_type: SecuritySchemeType::ApiKey,
                        location: SecuritySchemeLocation::Query,
                        name: "access_key".into(),
                    },
                )]),
            },
        },
        endpoints: vec![OisEndpoint {
            name: "convertToUSD".into(),
            operation: OisOperation {
                method: HttpMethod::Get,
                path: "/convert".into(),
            },
            fixed_operation_parameters: vec![],
            parameters: vec![
                EndpointParameter {
                    name: "from".into(),
                    operation_parameter: OperationParameter {
                        location: OperationParameterLocation::Query,
                        name: "from".into(),
                    },
                },
                EndpointParameter {
                    name: "to".into(),
                    operation_parameter: OperationParameter {
                        location: OperationParameterLocation::Query,
                        name: "to".into(),
                    },
                },
            ],
            reserved_parameters: vec![
                ReservedParameter {
                    name: "_type".into(),
                    fixed: None,
                    default: None,
                },
                ReservedParameter {
                    name: "_path".into(),
                    fixed: None,
                    default: Some("result".into()),
                },
                ReservedParameter {
                    name: "_times".into(),
                    fixed: None,
                    default: None,
                },
            ],
        }],
    }
}

fn conversion_parameters(from: &str) -> Vec<ConfigParameter> {
    let parameter = |r#type: &str, name: &str, value: &str| ConfigParameter {
        r#type: r#type.into(),
        name: name.into(),
        value: value.into(),
    };
    vec![
        parameter("string32", "from", from),
        parameter("string32", "to", "USD"),
        parameter("string32", "_type", "int256"),
        parameter("string32", "_path", "result"),
        parameter("string32", "_times", "1000000"),
    ]
}

fn encode_parameters(parameters: &[ConfigParameter]) -> Bytes {
    let typed: Vec<TypedParameter<'_>> = parameters
        .iter()
        .map(|p| TypedParameter {
            r#type: &p.r#type,
            name: &p.name,
            value: &p.value,
        })
        .collect();
    abi::encode(&typed).unwrap()
}

fn chain() -> ChainConfig {
    ChainConfig {
        id: CHAIN_ID.into(),
        chain_type: ChainType::Evm,
        contracts: ChainContracts {
            airnode_rrp: Some(Address::from_low_u64_be(0x01)),
            rrp_beacon_server: Some(Address::from_low_u64_be(0x02)),
            dapi_server: Some(Address::from_low_u64_be(0x03)),
        },
        providers: HashMap::from([(
            "local".to_string(),
            ChainProvider {
                url: "http://127.0.0.1:8545"
                    .parse::<url::Url>()
                    .unwrap()
                    .into(),
            },
        )]),
        block_history_limit: 300,
        options: ChainOptions::default(),
    }
}

fn empty_config(airnode_address: Address) -> Config {
    Config {
        chains: vec![chain()],
        airnode_wallet_mnemonic: TEST_MNEMONIC.parse().unwrap(),
        airnode_address,
        ois: vec![currency_converter_ois()],
        api_credentials: vec![ApiCredentials {
            ois_title: "Currency Converter API".into(),
            security_scheme_name: "currencyConverterSecurityScheme".into(),
            security_scheme_value: "test-api-key".into(),
        }],
        triggers: Triggers::default(),
        subscriptions: HashMap::new(),
        templates: HashMap::new(),
        endpoints: HashMap::new(),
    }
}

fn make_subscription(
    airnode_address: Address,
    sponsor: Address,
    template_id: H256,
) -> (H256, Subscription) {
    let condition_parameters =
        ethers::abi::encode(&[Token::Uint(U256::exp10(16))]);
    let conditions: Bytes = conditions::encode_conditions(
        id("conditionPspBeaconUpdate(bytes32,bytes,bytes)"),
        &condition_parameters,
    )
    .into();
    let fulfill_function_id: Bytes = id(
        "fulfillPspBeaconUpdate(bytes32,address,address,address,uint256,bytes,bytes)",
    )
    .to_vec()
    .into();
    let subscription = Subscription {
        chain_id: CHAIN_ID.into(),
        airnode_address,
        template_id,
        parameters: Bytes::default(),
        conditions,
        relayer: airnode_address,
        sponsor,
        requester: Address::from_low_u64_be(0x07),
        fulfill_function_id,
    };
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&subscription.fulfill_function_id);
    let subscription_id = ids::derive_subscription_id(
        U256::from_dec_str(CHAIN_ID).unwrap(),
        subscription.airnode_address,
        subscription.template_id,
        &subscription.parameters,
        &subscription.conditions,
        subscription.relayer,
        subscription.sponsor,
        subscription.requester,
        selector,
    );
    (subscription_id, subscription)
}

/// Two PSP subscriptions (ETH and BTC) sharing one sponsor.
pub fn fixture() -> Fixture {
    let airnode_address = wallet::derive_airnode_wallet(TEST_MNEMONIC)
        .unwrap()
        .address();
    let sponsor = Address::from_low_u64_be(0x1234);
    let mut config = empty_config(airnode_address);

    let endpoint = Endpoint {
        ois_title: "Currency Converter API".into(),
        endpoint_name: "convertToUSD".into(),
    };
    let endpoint_id =
        ids::derive_endpoint_id(&endpoint.ois_title, &endpoint.endpoint_name);
    config.endpoints.insert(endpoint_id, endpoint);

    let mut add_beacon = |from: &str| {
        let parameters = encode_parameters(&conversion_parameters(from));
        let template_id =
            ids::derive_template_id(endpoint_id, &parameters).unwrap();
        config.templates.insert(
            template_id,
            Template {
                endpoint_id,
                template_parameters: parameters,
            },
        );
        let (subscription_id, subscription) =
            make_subscription(airnode_address, sponsor, template_id);
        config.subscriptions.insert(subscription_id, subscription);
        config.triggers.proto_psp.push(subscription_id);
        (subscription_id, template_id)
    };
    let (eth_subscription_id, eth_template_id) = add_beacon("ETH");
    let (btc_subscription_id, btc_template_id) = add_beacon("BTC");

    Fixture {
        config,
        airnode_address,
        sponsor,
        eth_subscription_id,
        btc_subscription_id,
        eth_template_id,
        btc_template_id,
    }
}

/// Adds a third subscription that reuses the ETH template, with a
/// different requester so it gets its own id.
pub fn add_subscription_sharing_eth_template(fixture: &mut Fixture) -> H256 {
    let (_, mut subscription) = make_subscription(
        fixture.airnode_address,
        fixture.sponsor,
        fixture.eth_template_id,
    );
    subscription.requester = Address::from_low_u64_be(0x08);
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&subscription.fulfill_function_id);
    let subscription_id = ids::derive_subscription_id(
        U256::from_dec_str(CHAIN_ID).unwrap(),
        subscription.airnode_address,
        subscription.template_id,
        &subscription.parameters,
        &subscription.conditions,
        subscription.relayer,
        subscription.sponsor,
        subscription.requester,
        selector,
    );
    fixture
        .config
        .subscriptions
        .insert(subscription_id, subscription);
    fixture.config.triggers.proto_psp.push(subscription_id);
    subscription_id
}

async fn serve_rpc_request(mut socket: tokio::net::TcpStream) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    let (header_end, content_length) = loop {
        let read = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(read) => read,
        };
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(position) =
            buffer.windows(4).position(|window| window == b"\r\n\r\n")
        {
            let headers =
                String::from_utf8_lossy(&buffer[..position]).to_lowercase();
            let content_length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            break (position + 4, content_length);
        }
    };
    while buffer.len() < header_end + content_length {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(read) => buffer.extend_from_slice(&chunk[..read]),
        }
    }

    let request: serde_json::Value = match serde_json::from_slice(
        &buffer[header_end..header_end + content_length],
    ) {
        Ok(request) => request,
        Err(_) => return,
    };
    let result = match request["method"].as_str() {
        Some("eth_blockNumber") => "0x64",
        // 1 gwei
        Some("eth_gasPrice") => "0x3b9aca00",
        Some("eth_getTransactionCount") => "0x0",
        _ => "0x0",
    };
    let payload = serde_json::json!({
        "jsonrpc": "2.0",
        "id": request["id"],
        "result": result,
    })
    .to_string();
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{payload}",
        payload.len(),
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Spawns a throwaway JSON-RPC stub answering `eth_blockNumber` with
/// block `100` and `eth_gasPrice` with 1 gwei, one request per
/// connection. Returns the address it listens on.
pub async fn spawn_rpc_stub() -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(serve_rpc_request(socket));
        }
    });
    address
}

/// One RRP beacon update job for the ETH/USD conversion.
pub fn rrp_fixture() -> RrpFixture {
    let airnode_address = wallet::derive_airnode_wallet(TEST_MNEMONIC)
        .unwrap()
        .address();
    let mut config = empty_config(airnode_address);

    let endpoint = Endpoint {
        ois_title: "Currency Converter API".into(),
        endpoint_name: "convertToUSD".into(),
    };
    let endpoint_id =
        ids::derive_endpoint_id(&endpoint.ois_title, &endpoint.endpoint_name);
    config.endpoints.insert(endpoint_id, endpoint);

    let template_parameters = conversion_parameters("ETH");
    let encoded = encode_parameters(&template_parameters);
    let template_id =
        ids::derive_rrp_template_id(airnode_address, endpoint_id, &encoded)
            .unwrap();
    config.triggers.rrp_beacon_server_keeper_jobs =
        vec![RrpBeaconServerKeeperJob {
            template_id,
            template_parameters,
            endpoint_id,
            deviation_percentage: 0.2,
            keeper_sponsor: Address::from_low_u64_be(0x21),
            request_sponsor: Address::from_low_u64_be(0x22),
            chain_ids: None,
        }];

    RrpFixture {
        config,
        airnode_address,
    }
}
