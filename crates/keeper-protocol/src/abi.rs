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

//! The airnode-ABI parameter codec, version `1`.
//!
//! Template and request parameters travel on-chain as a single `bytes`
//! blob: a 32-byte header whose ASCII contents are the version character
//! `'1'` followed by one type character per parameter, then the standard
//! ABI encoding of `(bytes32 name, value)` pairs. Type characters:
//!
//! | char | type     | char | type    |
//! |------|----------|------|---------|
//! | `B`  | bytes    | `b`  | bytes32 |
//! | `S`  | string   | `s`  | string32|
//! | `a`  | address  | `u`  | uint256 |
//! |      |          | `i`  | int256  |

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, H256, I256, U256};
use ethers::utils::to_checksum;

use airkeeper_utils::{Error, Result};

/// A decoded airnode-ABI parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterValue {
    /// `B`: dynamic bytes.
    Bytes(Vec<u8>),
    /// `S`: dynamic string.
    String(String),
    /// `s`: a short string packed into a bytes32.
    String32(String),
    /// `a`: an address.
    Address(Address),
    /// `b`: a bytes32 word.
    Bytes32(H256),
    /// `u`: an unsigned 256-bit integer.
    Uint(U256),
    /// `i`: a signed 256-bit integer.
    Int(I256),
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytes(v) => write!(f, "0x{}", hex::encode(v)),
            Self::String(s) | Self::String32(s) => write!(f, "{s}"),
            Self::Address(a) => write!(f, "{}", to_checksum(a, None)),
            Self::Bytes32(h) => write!(f, "0x{}", hex::encode(h.as_bytes())),
            Self::Uint(u) => write!(f, "{u}"),
            Self::Int(i) => write!(f, "{i}"),
        }
    }
}

/// A single named parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// The parameter name, at most 31 bytes.
    pub name: String,
    /// The decoded value.
    pub value: ParameterValue,
}

fn bytes32_to_string(word: &[u8]) -> Result<String> {
    let trimmed: Vec<u8> =
        word.iter().copied().take_while(|b| *b != 0).collect();
    String::from_utf8(trimmed).map_err(|_| {
        Error::InvalidAbiParameters("non-utf8 bytes32 string".into())
    })
}

fn string_to_bytes32(value: &str) -> Result<Vec<u8>> {
    let raw = value.as_bytes();
    if raw.len() > 31 {
        return Err(Error::InvalidAbiParameters(format!(
            "string32 value too long: {value}"
        )));
    }
    let mut word = vec![0u8; 32];
    word[..raw.len()].copy_from_slice(raw);
    Ok(word)
}

fn value_param_type(type_char: u8) -> Result<ParamType> {
    Ok(match type_char {
        b'B' => ParamType::Bytes,
        b'S' => ParamType::String,
        b'a' => ParamType::Address,
        b'b' | b's' => ParamType::FixedBytes(32),
        b'u' => ParamType::Uint(256),
        b'i' => ParamType::Int(256),
        other => {
            return Err(Error::InvalidAbiParameters(format!(
                "unknown type character: {}",
                other as char
            )))
        }
    })
}

/// Decodes an airnode-ABI blob into named parameters.
///
/// An empty blob decodes to no parameters.
pub fn decode(data: &[u8]) -> Result<Vec<Parameter>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if data.len() < 32 {
        return Err(Error::InvalidAbiParameters(
            "blob shorter than its header".into(),
        ));
    }
    let header = &data[..32];
    if header[0] != b'1' {
        return Err(Error::InvalidAbiParameters(format!(
            "unsupported encoding version: {}",
            header[0] as char
        )));
    }
    let type_chars: Vec<u8> =
        header[1..].iter().copied().take_while(|b| *b != 0).collect();

    let mut schema = vec![ParamType::FixedBytes(32)];
    for c in &type_chars {
        schema.push(ParamType::FixedBytes(32));
        schema.push(value_param_type(*c)?);
    }
    let tokens = abi::decode(&schema, data)?;

    let mut parameters = Vec::with_capacity(type_chars.len());
    // tokens[0] is the header word itself.
    for (i, c) in type_chars.iter().enumerate() {
        let name = match &tokens[1 + 2 * i] {
            Token::FixedBytes(word) => bytes32_to_string(word)?,
            _ => unreachable!("schema drives the token types"),
        };
        let value = match (&tokens[2 + 2 * i], c) {
            (Token::Bytes(v), b'B') => ParameterValue::Bytes(v.clone()),
            (Token::String(s), b'S') => ParameterValue::String(s.clone()),
            (Token::Address(a), b'a') => ParameterValue::Address(*a),
            (Token::FixedBytes(w), b'b') => {
                ParameterValue::Bytes32(H256::from_slice(w))
            }
            (Token::FixedBytes(w), b's') => {
                ParameterValue::String32(bytes32_to_string(w)?)
            }
            (Token::Uint(u), b'u') => ParameterValue::Uint(*u),
            (Token::Int(u), b'i') => ParameterValue::Int(I256::from_raw(*u)),
            _ => unreachable!("schema drives the token types"),
        };
        parameters.push(Parameter { name, value });
    }
    Ok(parameters)
}

/// A typed parameter triple as it appears in keeper config files.
#[derive(Debug, Clone)]
pub struct TypedParameter<'a> {
    /// The solidity-ish type name, e.g. `string32` or `int256`.
    pub r#type: &'a str,
    /// The parameter name.
    pub name: &'a str,
    /// The value, rendered as a string.
    pub value: &'a str,
}

fn type_char(type_name: &str) -> Result<u8> {
    Ok(match type_name {
        "bytes" => b'B',
        "string" => b'S',
        "address" => b'a',
        "bytes32" => b'b',
        "string32" => b's',
        "uint256" => b'u',
        "int256" => b'i',
        other => {
            return Err(Error::InvalidAbiParameters(format!(
                "unknown parameter type: {other}"
            )))
        }
    })
}

fn parse_hex(value: &str) -> Result<Vec<u8>> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(stripped).map_err(|e| {
        Error::InvalidAbiParameters(format!("invalid hex value: {e}"))
    })
}

fn value_token(type_char: u8, value: &str) -> Result<Token> {
    Ok(match type_char {
        b'B' => Token::Bytes(parse_hex(value)?),
        b'S' => Token::String(value.to_owned()),
        b'a' => Token::Address(value.parse().map_err(|_| {
            Error::InvalidAbiParameters(format!("invalid address: {value}"))
        })?),
        b'b' => {
            let raw = parse_hex(value)?;
            if raw.len() != 32 {
                return Err(Error::InvalidAbiParameters(format!(
                    "bytes32 value must be 32 bytes, got {}",
                    raw.len()
                )));
            }
            Token::FixedBytes(raw)
        }
        b's' => Token::FixedBytes(string_to_bytes32(value)?),
        b'u' => Token::Uint(U256::from_dec_str(value).map_err(|e| {
            Error::InvalidAbiParameters(format!("invalid uint256: {e:?}"))
        })?),
        b'i' => {
            let parsed = I256::from_dec_str(value).map_err(|e| {
                Error::InvalidAbiParameters(format!("invalid int256: {e:?}"))
            })?;
            Token::Int(parsed.into_raw())
        }
        _ => unreachable!("type_char only yields known characters"),
    })
}

/// Encodes typed parameter triples into an airnode-ABI blob.
pub fn encode(parameters: &[TypedParameter<'_>]) -> Result<Bytes> {
    if parameters.is_empty() {
        return Ok(Bytes::default());
    }
    if parameters.len() > 31 {
        return Err(Error::InvalidAbiParameters(format!(
            "too many parameters: {}",
            parameters.len()
        )));
    }
    let mut header = vec![b'1'];
    let mut tokens = Vec::with_capacity(1 + parameters.len() * 2);
    // placeholder, replaced once the header is complete
    tokens.push(Token::FixedBytes(vec![0u8; 32]));
    for parameter in parameters {
        let c = type_char(parameter.r#type)?;
        header.push(c);
        if parameter.name.len() > 31 {
            return Err(Error::InvalidAbiParameters(format!(
                "parameter name too long: {}",
                parameter.name
            )));
        }
        tokens.push(Token::FixedBytes(string_to_bytes32(parameter.name)?));
        tokens.push(value_token(c, parameter.value)?);
    }
    header.resize(32, 0);
    tokens[0] = Token::FixedBytes(header);
    Ok(abi::encode(&tokens).into())
}
