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

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Config, File};
use wallet_activator_types::Chain;
use wallet_activator_utils::{Error, Result};

use crate::ActivatorConfig;

/// A helper function that will search for all config files in the given directory and return them as a vec
/// of the paths.
///
/// Supported file extensions are:
/// - `.toml`.
/// - `.json`.
pub fn search_config_files<P: AsRef<Path>>(
    base_dir: P,
) -> Result<Vec<PathBuf>> {
    // A pattern that covers all toml or json files in the config directory
    // and subdirectories.
    let toml_pattern = format!("{}/**/*.toml", base_dir.as_ref().display());
    let json_pattern = format!("{}/**/*.json", base_dir.as_ref().display());
    tracing::trace!(
        "Loading config files from {} and {}",
        toml_pattern,
        json_pattern
    );
    let toml_files = glob::glob(&toml_pattern)?;
    let json_files = glob::glob(&json_pattern)?;
    toml_files
        .chain(json_files)
        .map(|v| v.map_err(Error::from))
        .collect()
}

/// Try to parse the [`ActivatorConfig`] from the given config file(s).
pub fn parse_from_files(files: &[PathBuf]) -> Result<ActivatorConfig> {
    let mut builder = Config::builder();
    for config_file in files {
        tracing::trace!("Loading config file: {}", config_file.display());
        let ext = config_file
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let format = match ext {
            "toml" => config::FileFormat::Toml,
            "json" => config::FileFormat::Json,
            _ => {
                tracing::warn!("Unknown file extension: {}", ext);
                continue;
            }
        };
        builder = builder
            .add_source(File::from(config_file.as_path()).format(format));
    }

    // also merge in the environment (with a prefix of WALLET).
    let builder = builder
        .add_source(config::Environment::with_prefix("WALLET").separator("_"));
    let cfg = builder.build()?;
    // and finally deserialize the config and post-process it
    let config: std::result::Result<
        ActivatorConfig,
        serde_path_to_error::Error<config::ConfigError>,
    > = serde_path_to_error::deserialize(cfg);
    match config {
        Ok(c) => postloading_process(c),
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}

/// Load the configuration files found under `path`.
///
/// it is the same as using the [`search_config_files`] and [`parse_from_files`] functions combined.
pub fn load<P: AsRef<Path>>(path: P) -> Result<ActivatorConfig> {
    parse_from_files(&search_config_files(path)?)
}

/// The postloading_process exists to validate configuration and standardize
/// the format of the configuration
pub fn postloading_process(
    mut config: ActivatorConfig,
) -> Result<ActivatorConfig> {
    tracing::trace!("Checking configration sanity ...");
    // 1. drain everything, and take enabled chains.
    let enabled = config
        .chains
        .drain()
        .filter(|(_, chain)| chain.enabled)
        .collect::<HashMap<_, _>>();
    // 2. insert them again, keyed by their lowercased name.
    for (_, mut chain) in enabled {
        chain.name = chain.name.to_lowercase();
        // fails on names that can not be used in an account address.
        let _: Chain = chain.name.parse()?;
        if chain.private_key.is_none() {
            tracing::error!("Chain {} has no private-key", chain.name);
            return Err(Error::MissingSecrets);
        }
        config.chains.insert(chain.name.clone(), chain);
    }
    tracing::trace!(
        chains = ?config.chains.keys().collect::<Vec<_>>(),
        "Config is sane",
    );
    Ok(config)
}
