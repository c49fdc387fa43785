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

//! Trigger resolution.
//!
//! Configured ids are never trusted: every subscription, template and
//! endpoint id is recomputed from its fields and mismatches are dropped
//! with a warning. Surviving subscriptions are grouped by template so each
//! template costs exactly one API call per cycle, no matter how many
//! subscriptions share it. Every drop here is non-fatal; the cycle runs on
//! whatever survives.

use airkeeper_config::{
    Config, Endpoint, RrpBeaconServerKeeperJob, Subscription, Template,
};
use airkeeper_protocol::abi::{self, TypedParameter};
use airkeeper_protocol::{deviation, ids};
use ethers::types::{Address, Bytes, H256, U256};

/// Subscriptions sharing one template, and thus one API call.
#[derive(Debug, Clone)]
pub struct GroupedSubscriptions {
    /// The shared template id.
    pub template_id: H256,
    /// The template itself.
    pub template: Template,
    /// The endpoint behind the template.
    pub endpoint: Endpoint,
    /// The subscriptions, in trigger order.
    pub subscriptions: Vec<(H256, Subscription)>,
}

/// An RRP beacon update job with its derived identifiers.
#[derive(Debug, Clone)]
pub struct ResolvedBeaconJob {
    /// The configured job.
    pub job: RrpBeaconServerKeeperJob,
    /// The endpoint behind the job's template.
    pub endpoint: Endpoint,
    /// The job's template parameters, airnode-ABI encoded.
    pub encoded_parameters: Bytes,
    /// The beacon this job maintains.
    pub beacon_id: H256,
}

fn verify_subscription_id(
    subscription_id: H256,
    subscription: &Subscription,
) -> Option<[u8; 4]> {
    let chain_id = match U256::from_dec_str(&subscription.chain_id) {
        Ok(chain_id) => chain_id,
        Err(_) => {
            tracing::warn!(
                %subscription_id,
                chain_id = %subscription.chain_id,
                "subscription has a malformed chain id, skipping",
            );
            return None;
        }
    };
    if subscription.fulfill_function_id.len() != 4 {
        tracing::warn!(
            %subscription_id,
            "subscription fulfillFunctionId is not 4 bytes, skipping",
        );
        return None;
    }
    let mut fulfill_function_id = [0u8; 4];
    fulfill_function_id.copy_from_slice(&subscription.fulfill_function_id);
    let derived = ids::derive_subscription_id(
        chain_id,
        subscription.airnode_address,
        subscription.template_id,
        &subscription.parameters,
        &subscription.conditions,
        subscription.relayer,
        subscription.sponsor,
        subscription.requester,
        fulfill_function_id,
    );
    if derived != subscription_id {
        tracing::warn!(
            configured = %subscription_id,
            %derived,
            "subscription id does not match its fields, skipping",
        );
        return None;
    }
    Some(fulfill_function_id)
}

fn verify_template<'a>(
    config: &'a Config,
    template_id: H256,
) -> Option<(&'a Template, &'a Endpoint)> {
    let template = match config.templates.get(&template_id) {
        Some(template) => template,
        None => {
            tracing::warn!(%template_id, "unknown template, skipping");
            return None;
        }
    };
    let derived = ids::derive_template_id(
        template.endpoint_id,
        &template.template_parameters,
    )
    .ok()?;
    if derived != template_id {
        tracing::warn!(
            configured = %template_id,
            %derived,
            "template id does not match its fields, skipping",
        );
        return None;
    }
    let endpoint = match config.endpoints.get(&template.endpoint_id) {
        Some(endpoint) => endpoint,
        None => {
            tracing::warn!(
                endpoint_id = %template.endpoint_id,
                "unknown endpoint, skipping",
            );
            return None;
        }
    };
    let derived_endpoint = ids::derive_endpoint_id(
        &endpoint.ois_title,
        &endpoint.endpoint_name,
    );
    if derived_endpoint != template.endpoint_id {
        tracing::warn!(
            configured = %template.endpoint_id,
            derived = %derived_endpoint,
            "endpoint id does not match its fields, skipping",
        );
        return None;
    }
    Some((template, endpoint))
}

/// Resolves the `protoPsp` trigger list into template-grouped work units.
pub fn resolve_psp_triggers(config: &Config) -> Vec<GroupedSubscriptions> {
    let mut groups: Vec<GroupedSubscriptions> = Vec::new();
    for subscription_id in &config.triggers.proto_psp {
        let subscription = match config.subscriptions.get(subscription_id) {
            Some(subscription) => subscription,
            None => {
                tracing::warn!(
                    %subscription_id,
                    "subscription is not part of the config, skipping",
                );
                continue;
            }
        };
        if verify_subscription_id(*subscription_id, subscription).is_none() {
            continue;
        }
        if let Some(group) = groups
            .iter_mut()
            .find(|g| g.template_id == subscription.template_id)
        {
            group
                .subscriptions
                .push((*subscription_id, subscription.clone()));
            continue;
        }
        let (template, endpoint) =
            match verify_template(config, subscription.template_id) {
                Some(found) => found,
                None => continue,
            };
        groups.push(GroupedSubscriptions {
            template_id: subscription.template_id,
            template: template.clone(),
            endpoint: endpoint.clone(),
            subscriptions: vec![(*subscription_id, subscription.clone())],
        });
    }
    groups
}

/// Resolves the RRP keeper job list, deriving beacon ids and validating the
/// configured identifiers along the way.
pub fn resolve_rrp_triggers(
    config: &Config,
    airnode: Address,
) -> Vec<ResolvedBeaconJob> {
    let mut jobs = Vec::new();
    for job in &config.triggers.rrp_beacon_server_keeper_jobs {
        let endpoint = match config.endpoints.get(&job.endpoint_id) {
            Some(endpoint) => endpoint,
            None => {
                tracing::warn!(
                    endpoint_id = %job.endpoint_id,
                    "unknown endpoint in keeper job, skipping",
                );
                continue;
            }
        };
        let derived_endpoint = ids::derive_endpoint_id(
            &endpoint.ois_title,
            &endpoint.endpoint_name,
        );
        if derived_endpoint != job.endpoint_id {
            tracing::warn!(
                configured = %job.endpoint_id,
                derived = %derived_endpoint,
                "endpoint id does not match its fields, skipping job",
            );
            continue;
        }
        if !deviation::is_valid_deviation_percentage(job.deviation_percentage)
        {
            tracing::warn!(
                template_id = %job.template_id,
                deviation_percentage = job.deviation_percentage,
                "keeper job has an invalid deviation percentage, skipping",
            );
            continue;
        }
        let typed: Vec<TypedParameter<'_>> = job
            .template_parameters
            .iter()
            .map(|p| TypedParameter {
                r#type: &p.r#type,
                name: &p.name,
                value: &p.value,
            })
            .collect();
        let encoded_parameters = match abi::encode(&typed) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(
                    template_id = %job.template_id,
                    error = %e,
                    "keeper job parameters do not encode, skipping",
                );
                continue;
            }
        };
        let derived_template = match ids::derive_rrp_template_id(
            airnode,
            job.endpoint_id,
            &encoded_parameters,
        ) {
            Ok(derived) => derived,
            Err(_) => continue,
        };
        if derived_template != job.template_id {
            tracing::warn!(
                configured = %job.template_id,
                derived = %derived_template,
                "template id does not match the job fields, skipping",
            );
            continue;
        }
        let beacon_id = match ids::derive_beacon_id(
            job.template_id,
            &encoded_parameters,
        ) {
            Ok(beacon_id) => beacon_id,
            Err(_) => continue,
        };
        jobs.push(ResolvedBeaconJob {
            job: job.clone(),
            endpoint: endpoint.clone(),
            encoded_parameters,
            beacon_id,
        });
    }
    jobs
}
