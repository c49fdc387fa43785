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

//! The off-chain HTTP adapter.
//!
//! Resolves an OIS endpoint plus decoded parameters into an HTTP request,
//! executes it, and reduces the JSON response to a signed 256-bit integer
//! using the reserved parameters: `_type` (required), `_path` (a dotted
//! pointer into the response) and `_times` (a decimal scaling factor).
//! Scaling is done with decimal string arithmetic so fractional API values
//! hit the chain without floating point error.

use airkeeper_config::{
    ApiCredentials, HttpMethod, Ois, OisEndpoint, OperationParameterLocation,
    SecuritySchemeLocation, SecuritySchemeType,
};
use airkeeper_utils::{Error, Result};
use ethers::types::{I256, U256};
use serde_json::Value;

/// An HTTP request the adapter is about to execute.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method of the operation.
    pub method: HttpMethod,
    /// Fully resolved URL (server base + operation path).
    pub url: url::Url,
    /// Query string parameters.
    pub query: Vec<(String, String)>,
    /// HTTP headers.
    pub headers: Vec<(String, String)>,
}

/// The transport seam: executes a built request and returns the JSON body.
#[async_trait::async_trait]
pub trait ApiClient: Send + Sync {
    /// Executes the request once. Retries live in the caller.
    async fn execute(&self, request: &ApiRequest) -> Result<Value>;
}

/// The production [`ApiClient`] backed by `reqwest`.
pub struct HttpApiClient {
    client: reqwest::Client,
}

impl HttpApiClient {
    /// Creates a client. Per-attempt timeouts are enforced by the retry
    /// wrapper, not here.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpApiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ApiClient for HttpApiClient {
    async fn execute(&self, request: &ApiRequest) -> Result<Value> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(request.url.clone()),
            HttpMethod::Post => self.client.post(request.url.clone()),
        };
        builder = builder.query(&request.query);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder.send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

/// Builds the HTTP request for an endpoint from decoded parameters and the
/// configured credentials. Reserved parameters (leading `_`) never reach
/// the wire; parameters the endpoint does not declare are skipped with a
/// warning.
pub fn build_request(
    ois: &Ois,
    endpoint: &OisEndpoint,
    parameters: &[(String, String)],
    credentials: Option<&ApiCredentials>,
) -> Result<ApiRequest> {
    let server = ois
        .api_specifications
        .servers
        .first()
        .ok_or(Error::Generic("OIS declares no servers"))?;
    let mut url = server.url.clone();
    let mut path = format!(
        "{}/{}",
        url.path().trim_end_matches('/'),
        endpoint.operation.path.trim_start_matches('/')
    );

    let mut query = Vec::new();
    let mut headers = Vec::new();
    for fixed in &endpoint.fixed_operation_parameters {
        let name = fixed.operation_parameter.name.clone();
        match fixed.operation_parameter.location {
            OperationParameterLocation::Query => {
                query.push((name, fixed.value.clone()));
            }
            OperationParameterLocation::Header => {
                headers.push((name, fixed.value.clone()));
            }
            OperationParameterLocation::Path => {
                path = path.replace(&format!("{{{name}}}"), &fixed.value);
            }
        }
    }
    for (name, value) in parameters {
        if name.starts_with('_') {
            continue;
        }
        let declared =
            endpoint.parameters.iter().find(|p| p.name == *name);
        match declared {
            Some(parameter) => {
                let wire_name = parameter.operation_parameter.name.clone();
                match parameter.operation_parameter.location {
                    OperationParameterLocation::Query => {
                        query.push((wire_name, value.clone()));
                    }
                    OperationParameterLocation::Header => {
                        headers.push((wire_name, value.clone()));
                    }
                    OperationParameterLocation::Path => {
                        path = path
                            .replace(&format!("{{{wire_name}}}"), value);
                    }
                }
            }
            None => {
                tracing::warn!(
                    parameter = %name,
                    endpoint = %endpoint.name,
                    "parameter not declared by the endpoint, skipping",
                );
            }
        }
    }
    url.set_path(&path);

    if let Some(credentials) = credentials {
        let scheme = ois
            .api_specifications
            .components
            .security_schemes
            .get(&credentials.security_scheme_name);
        match scheme {
            Some(scheme)
                if scheme.scheme_type == SecuritySchemeType::ApiKey =>
            {
                let entry = (
                    scheme.name.clone(),
                    credentials.security_scheme_value.clone(),
                );
                match scheme.location {
                    SecuritySchemeLocation::Query => query.push(entry),
                    SecuritySchemeLocation::Header => headers.push(entry),
                }
            }
            Some(_) => {
                tracing::warn!(
                    scheme = %credentials.security_scheme_name,
                    "unsupported security scheme type, calling without credentials",
                );
            }
            None => {
                tracing::warn!(
                    scheme = %credentials.security_scheme_name,
                    "security scheme not declared by the OIS, calling without credentials",
                );
            }
        }
    }

    Ok(ApiRequest {
        method: endpoint.operation.method,
        url,
        query,
        headers,
    })
}

/// The effective reserved parameters of one work unit.
#[derive(Debug, Clone)]
pub struct ReservedParameters {
    /// The `_type` the response is cast to. Required.
    pub response_type: String,
    /// The `_path` pointer into the response.
    pub path: Option<String>,
    /// The `_times` decimal scaling factor.
    pub times: Option<String>,
}

/// Resolves reserved parameters: an OIS `fixed` value wins over the
/// request parameters, which win over the OIS `default`.
pub fn reserved_parameters(
    endpoint: &OisEndpoint,
    parameters: &[(String, String)],
) -> Result<ReservedParameters> {
    let lookup = |name: &str| -> Option<String> {
        let declared =
            endpoint.reserved_parameters.iter().find(|r| r.name == name);
        if let Some(fixed) =
            declared.and_then(|r| r.fixed.clone())
        {
            return Some(fixed);
        }
        if let Some((_, value)) =
            parameters.iter().find(|(n, _)| n == name)
        {
            return Some(value.clone());
        }
        declared.and_then(|r| r.default.clone())
    };
    let response_type = lookup("_type")
        .ok_or(Error::MissingReservedParameter("_type"))?;
    Ok(ReservedParameters {
        response_type,
        path: lookup("_path"),
        times: lookup("_times"),
    })
}

fn value_at_path<'a>(
    response: &'a Value,
    path: Option<&str>,
) -> Result<&'a Value> {
    let path = match path {
        Some(path) if !path.is_empty() => path,
        _ => return Ok(response),
    };
    let mut current = response;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment).ok_or_else(|| {
                Error::InvalidApiResponse(format!(
                    "no field {segment:?} in the response"
                ))
            })?,
            Value::Array(items) => {
                let index: usize = segment.parse().map_err(|_| {
                    Error::InvalidApiResponse(format!(
                        "non-numeric index {segment:?} into an array"
                    ))
                })?;
                items.get(index).ok_or_else(|| {
                    Error::InvalidApiResponse(format!(
                        "index {index} out of bounds"
                    ))
                })?
            }
            _ => {
                return Err(Error::InvalidApiResponse(format!(
                    "cannot descend into a leaf at {segment:?}"
                )))
            }
        };
    }
    Ok(current)
}

/// Scales a decimal string by an integer factor, truncating any leftover
/// fraction toward zero. All arithmetic is integral.
fn scale_decimal(rendered: &str, times: U256) -> Result<I256> {
    let (negative, magnitude) = match rendered.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, rendered),
    };
    let (int_part, frac_part) = match magnitude.split_once('.') {
        Some((i, f)) => (i, f),
        None => (magnitude, ""),
    };
    let int_part = if int_part.is_empty() { "0" } else { int_part };
    if frac_part.len() > 30 {
        return Err(Error::InvalidApiResponse(format!(
            "too many decimal places: {rendered}"
        )));
    }
    let digits = format!("{int_part}{frac_part}");
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidApiResponse(format!(
            "not a decimal number: {rendered}"
        )));
    }
    let numerator = U256::from_dec_str(&digits).map_err(|_| {
        Error::InvalidApiResponse(format!("not a decimal number: {rendered}"))
    })?;
    let scaled = numerator
        .checked_mul(times)
        .ok_or_else(|| {
            Error::InvalidApiResponse(format!(
                "value overflows when scaled: {rendered}"
            ))
        })?
        / U256::exp10(frac_part.len());
    let magnitude = I256::try_from(scaled).map_err(|_| {
        Error::InvalidApiResponse(format!(
            "value does not fit an int256: {rendered}"
        ))
    })?;
    Ok(if negative { -magnitude } else { magnitude })
}

/// Extracts the value at `_path`, scales it by `_times` and encodes it as
/// the signed 256-bit integer beacons store.
pub fn extract_and_encode(
    response: &Value,
    reserved: &ReservedParameters,
) -> Result<I256> {
    match reserved.response_type.as_str() {
        "int256" | "uint256" => {}
        other => {
            return Err(Error::InvalidApiResponse(format!(
                "unsupported _type: {other}"
            )))
        }
    }
    let value = value_at_path(response, reserved.path.as_deref())?;
    let rendered = match value {
        Value::Number(number) => number.to_string(),
        Value::String(string) => string.clone(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => "0".to_string(),
        other => {
            return Err(Error::InvalidApiResponse(format!(
                "non-numeric value at _path: {other}"
            )))
        }
    };
    let times = match reserved.times.as_deref() {
        Some(times) if !times.is_empty() => U256::from_dec_str(times)
            .map_err(|_| {
                Error::InvalidApiResponse(format!("invalid _times: {times}"))
            })?,
        _ => U256::one(),
    };
    scale_decimal(&rendered, times)
}
