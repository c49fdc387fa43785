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

//! Bindings for the on-chain contracts the keeper talks to.

use ethers::prelude::abigen;

abigen!(
    DapiServer,
    r#"[
        function conditionPspBeaconUpdate(bytes32 subscriptionId, bytes data, bytes conditionParameters) view returns (bool)
        function fulfillPspBeaconUpdate(bytes32 subscriptionId, address airnode, address relayer, address sponsor, uint256 timestamp, bytes data, bytes signature)
    ]"#
);

abigen!(
    RrpBeaconServer,
    r#"[
        function readBeacon(bytes32 beaconId) view returns (uint128 value, uint32 timestamp)
        function requestBeaconUpdate(bytes32 templateId, address requestSponsor, address requestSponsorWallet, bytes parameters)
        event RequestedBeaconUpdate(bytes32 indexed beaconId, address indexed sponsor, address indexed sponsorWallet, bytes32 requestId, bytes32 templateId, bytes parameters)
        event UpdatedBeacon(bytes32 indexed beaconId, bytes32 requestId, uint128 value, uint32 timestamp)
    ]"#
);

abigen!(
    AirnodeRrp,
    r#"[
        function requestIsAwaitingFulfillment(bytes32 requestId) view returns (bool)
    ]"#
);
