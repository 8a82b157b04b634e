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

//! # Account Activation 🚀
//!
//! Activating a smart account deploys it through the chain's account factory,
//! initialized with the policies it was created with, and charges the
//! activation fee once the deployment is confirmed.
//!
//! An activation is a two job flow: an `Activation` job sends the deployment
//! and its parent `Transaction` job waits for the receipt, charges the fee and
//! marks the account active.

mod orchestrator;
mod params;
mod processors;


pub use orchestrator::ActivationOrchestrator;
pub use params::ActivationParams;
pub use processors::{ActivationJobProcessor, TransactionJobProcessor};
