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

//! Domain types shared by the wallet activator crates.

/// Chains, chain-qualified addresses and the factory registry.
pub mod chain;
/// Solidity bindings of the account and its factory.
pub mod contracts;
/// Policies and their on-chain encoding.
pub mod policy;
/// A module for managing the private keys.
pub mod private_key;
/// A module for managing the RPC URLs.
pub mod rpc_url;

pub use chain::{Chain, FactoryRegistry, UAddress};
pub use policy::{Hook, Policy, PolicyError, PolicyKey};
