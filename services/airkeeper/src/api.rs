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

//! The API call phase.
//!
//! One call per distinct work unit: a template (PSP) or a beacon job
//! (RRP). All work units run concurrently; each is wrapped in the bounded
//! retry-with-timeout policy; a failing work unit is dropped with a
//! warning and the rest of the cycle proceeds without it.

use std::collections::HashMap;

use airkeeper_config::{Config, Endpoint, Ois, OisEndpoint};
use airkeeper_protocol::abi;
use airkeeper_utils::{probe, retry, Error, Result};
use ethers::types::{H256, I256};

use crate::adapter::{self, ApiClient};
use crate::triggers::{GroupedSubscriptions, ResolvedBeaconJob};

fn find_ois_endpoint<'a>(
    config: &'a Config,
    endpoint: &Endpoint,
) -> Result<(&'a Ois, &'a OisEndpoint)> {
    let ois = config.ois_by_title(&endpoint.ois_title).ok_or_else(|| {
        Error::OisNotFound {
            ois_title: endpoint.ois_title.clone(),
        }
    })?;
    let ois_endpoint = ois
        .endpoints
        .iter()
        .find(|e| e.name == endpoint.endpoint_name)
        .ok_or(Error::Generic("endpoint is not part of its OIS"))?;
    Ok((ois, ois_endpoint))
}

async fn call_one(
    config: &Config,
    endpoint: &Endpoint,
    parameters: Vec<(String, String)>,
    client: &dyn ApiClient,
) -> Result<I256> {
    let (ois, ois_endpoint) = find_ois_endpoint(config, endpoint)?;
    let reserved = adapter::reserved_parameters(ois_endpoint, &parameters)?;
    let request = adapter::build_request(
        ois,
        ois_endpoint,
        &parameters,
        config.credentials_for(&ois.title),
    )?;
    let response = retry::with_defaults(|| async {
        client.execute(&request).await
    })
    .await?;
    adapter::extract_and_encode(&response, &reserved)
}

/// Calls the API behind each template group and fans the value out to
/// every subscription of the group.
pub async fn call_apis(
    config: &Config,
    groups: &[GroupedSubscriptions],
    client: &dyn ApiClient,
) -> HashMap<H256, I256> {
    let tasks = groups.iter().map(|group| async {
        let parameters: Vec<(String, String)> =
            abi::decode(&group.template.template_parameters)?
                .into_iter()
                .map(|p| (p.name, p.value.to_string()))
                .collect();
        call_one(config, &group.endpoint, parameters, client).await
    });
    let results = futures::future::join_all(tasks).await;

    let mut values = HashMap::new();
    for (group, result) in groups.iter().zip(results) {
        match result {
            Ok(value) => {
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::ApiCall,
                    template_id = %group.template_id,
                    value = %value,
                );
                for (subscription_id, _) in &group.subscriptions {
                    values.insert(*subscription_id, value);
                }
            }
            Err(e) => {
                tracing::warn!(
                    template_id = %group.template_id,
                    error = %e,
                    "API call failed, dropping the template work unit",
                );
            }
        }
    }
    values
}

/// Calls the API behind each RRP beacon job. Values are keyed by beacon
/// id.
pub async fn call_rrp_apis(
    config: &Config,
    jobs: &[ResolvedBeaconJob],
    client: &dyn ApiClient,
) -> HashMap<H256, I256> {
    let tasks = jobs.iter().map(|job| async {
        let parameters: Vec<(String, String)> = job
            .job
            .template_parameters
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect();
        call_one(config, &job.endpoint, parameters, client).await
    });
    let results = futures::future::join_all(tasks).await;

    let mut values = HashMap::new();
    for (job, result) in jobs.iter().zip(results) {
        match result {
            Ok(value) => {
                tracing::event!(
                    target: probe::TARGET,
                    tracing::Level::DEBUG,
                    kind = %probe::Kind::ApiCall,
                    beacon_id = %job.beacon_id,
                    value = %value,
                );
                values.insert(job.beacon_id, value);
            }
            Err(e) => {
                tracing::warn!(
                    beacon_id = %job.beacon_id,
                    error = %e,
                    "API call failed, dropping the beacon job",
                );
            }
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ApiRequest;
    use crate::test_utils;
    use crate::triggers;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves ETH and BTC conversion rates off the `from` query parameter,
    /// optionally failing the first N requests.
    struct StubApi {
        failures: AtomicUsize,
        calls: AtomicUsize,
    }

    impl StubApi {
        fn new(failures: usize) -> Self {
            Self {
                failures: AtomicUsize::new(failures),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl ApiClient for StubApi {
        async fn execute(&self, request: &ApiRequest) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let failures = self.failures.load(Ordering::SeqCst);
            if failures > 0 {
                self.failures.store(failures - 1, Ordering::SeqCst);
                return Err(Error::Generic("Api call failed"));
            }
            let from = request
                .query
                .iter()
                .find(|(name, _)| name == "from")
                .map(|(_, value)| value.as_str())
                .unwrap_or_default();
            let rate = match from {
                "ETH" => json!({ "result": 723.39202 }),
                "BTC" => json!({ "result": 41091.12345 }),
                _ => json!({ "result": null }),
            };
            Ok(rate)
        }
    }

    #[tokio::test]
    async fn fans_one_value_out_to_every_subscription_of_a_template() {
        let mut fixture = test_utils::fixture();
        let extra =
            test_utils::add_subscription_sharing_eth_template(&mut fixture);
        let groups = triggers::resolve_psp_triggers(&fixture.config);
        let stub = StubApi::new(0);
        let values = call_apis(&fixture.config, &groups, &stub).await;

        assert_eq!(values.len(), 3);
        assert_eq!(
            values[&fixture.eth_subscription_id],
            I256::from(723_392_020i64)
        );
        assert_eq!(values[&extra], I256::from(723_392_020i64));
        assert_eq!(
            values[&fixture.btc_subscription_id],
            I256::from(41_091_123_450i64)
        );
        // two templates, one call each
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn one_transient_failure_is_retried() {
        let fixture = test_utils::fixture();
        let groups = triggers::resolve_psp_triggers(&fixture.config);
        let stub = StubApi::new(1);
        let values = call_apis(&fixture.config, &groups, &stub).await;
        assert_eq!(values.len(), 2);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn a_persistently_failing_work_unit_is_dropped() {
        let fixture = test_utils::fixture();
        let groups = triggers::resolve_psp_triggers(&fixture.config);
        // three of the four attempts fail, so exactly one work unit survives
        let stub = StubApi::new(3);
        let values = call_apis(&fixture.config, &groups, &stub).await;
        // one template dropped, the other survives
        assert_eq!(values.len(), 1);
    }
}
