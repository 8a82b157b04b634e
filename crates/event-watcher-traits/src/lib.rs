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
//! # Wallet Logs Watcher Module 🕸️
//!
//! A module that listens for contract logs on a given chain.
//!
//! ## Overview
//!
//! Handlers subscribe to event signatures on an [`EventRegistry`]. The
//! [`EventWatcher`] polls `eth_getLogs` for every signature the registry
//! knows about, keeps its position in a [`HistoryStore`] and hands each log
//! to the registry, which runs the handlers subscribed to the log's first
//! topic.
//!
//! [`HistoryStore`]: wallet_activator_store::HistoryStore

mod registry;
mod watcher;

pub use registry::{ChainLog, EventRegistry, HandlerId, LogHandler};
pub use watcher::{next_range, EventWatcher};
