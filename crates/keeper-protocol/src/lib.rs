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
//! # Airnode Protocol Primitives
//!
//! The pure, chain-independent pieces of the airnode protocol the keeper
//! relies on: entity id derivation, the airnode-ABI parameter codec,
//! deterministic sponsor wallet derivation, deviation arithmetic and
//! subscription condition decoding. Everything here is deterministic and
//! network-free, so the keeper's decision logic can be tested without a
//! node.

/// The airnode-ABI parameter codec (version 1).
pub mod abi;
/// Subscription conditions decoding.
pub mod conditions;
/// Beacon deviation fixed-point arithmetic.
pub mod deviation;
/// Entity id derivation (endpoints, templates, subscriptions, beacons).
pub mod ids;
/// Airnode and sponsor wallet derivation.
pub mod wallet;
