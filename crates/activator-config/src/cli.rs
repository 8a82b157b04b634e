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

use std::path::{Path, PathBuf};

use anyhow::Context;
use directories_next::ProjectDirs;
use structopt::StructOpt;
use wallet_activator_types::UAddress;

use crate::ActivatorConfig;

/// Package identifier, where the default configuration & database are defined.
/// If the user does not start the activator with the `--config-dir`
/// it will default to read from the default location depending on the OS.
pub const PACKAGE_ID: [&str; 3] = ["app", "smart-wallet", "wallet-activator"];

/// The Wallet Activator Command-line tool
///
/// Start the activator from a config directory:
///
/// $ wallet-activator -vvv -c <CONFIG_DIR_PATH>
#[derive(StructOpt)]
#[structopt(name = "Wallet Activator")]
pub struct Opts {
    /// A level of verbosity, and can be used multiple times
    #[structopt(short, long, parse(from_occurrences))]
    pub verbose: i32,
    /// Directory that contains configration files.
    #[structopt(
        short = "c",
        long = "config-dir",
        value_name = "PATH",
        parse(from_os_str)
    )]
    pub config_dir: Option<PathBuf>,
    /// Create the Database Store in a temporary directory.
    /// and will be deleted when the process exits.
    #[structopt(long)]
    pub tmp: bool,
    /// Enqueue the activation of an account (`<chain>:0x<address>`) on
    /// startup, can be used multiple times.
    #[structopt(long = "activate", value_name = "UADDRESS")]
    pub activate: Vec<UAddress>,
}

/// Loads the configuration from the given directory, or from the OS
/// specific default one.
pub fn load_config<P>(config_dir: Option<P>) -> anyhow::Result<ActivatorConfig>
where
    P: AsRef<Path>,
{
    tracing::debug!("Getting default dirs for wallet activator");
    let dirs = ProjectDirs::from(PACKAGE_ID[0], PACKAGE_ID[1], PACKAGE_ID[2])
        .context("failed to get config")?;
    let path = match config_dir {
        Some(p) => p.as_ref().to_path_buf(),
        None => dirs.config_dir().to_path_buf(),
    };
    // return an error if the path is not a directory.
    if !path.is_dir() {
        return Err(anyhow::anyhow!("{} is not a directory", path.display()));
    }
    tracing::trace!("Loading Config from {} ..", path.display());
    let v = crate::utils::load(path)?;
    tracing::trace!("Config loaded..");
    Ok(v)
}

/// Sets up the logger for the activator, based on the verbosity level passed in.
///
/// `RUST_LOG` directives are honoured on top of the verbosity.
pub fn setup_logger(verbosity: i32) -> anyhow::Result<()> {
    use tracing::Level;
    let log_level = match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env();
    for target in [
        "wallet_activator",
        "wallet_activation",
        "wallet_job_queue",
        "wallet_chain_gateway",
        "wallet_ew_policy",
        "wallet_event_watcher_traits",
        "wallet_probe",
    ] {
        env_filter = env_filter
            .add_directive(format!("{target}={log_level}").parse()?);
    }
    let logger = tracing_subscriber::fmt()
        .with_target(true)
        .with_max_level(log_level)
        .with_env_filter(env_filter);
    // if we are not compiling for integration tests, we should use pretty logs
    #[cfg(not(feature = "integration-tests"))]
    let logger = logger.pretty();
    // otherwise, we should use json, which is easy to parse.
    #[cfg(feature = "integration-tests")]
    let logger = logger.json().flatten_event(true).with_current_span(false);

    logger.init();
    Ok(())
}

/// Creates the sled database store, in a temporary directory with `--tmp`,
/// next to the config directory when one is given, or in the OS specific
/// data directory otherwise.
pub fn create_store(
    opts: &Opts,
) -> anyhow::Result<wallet_activator_store::SledStore> {
    if opts.tmp {
        tracing::debug!("Using temp dir for store");
        let store = wallet_activator_store::SledStore::temporary()?;
        return Ok(store);
    }
    let dirs = ProjectDirs::from(PACKAGE_ID[0], PACKAGE_ID[1], PACKAGE_ID[2])
        .context("failed to get config")?;
    let p = match opts.config_dir.as_ref() {
        Some(p) => p.to_path_buf(),
        None => dirs.data_local_dir().to_path_buf(),
    };
    let db_path = match opts.config_dir.as_ref().zip(p.parent()) {
        Some((_, parent)) => parent.join("store"),
        None => p.join("store"),
    };

    let store = wallet_activator_store::SledStore::open(db_path)?;
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_activation_targets() {
        let opts = Opts::from_iter_safe([
            "wallet-activator",
            "-vv",
            "--tmp",
            "--activate",
            "zksync:0x00000000000000000000000000000000000000aa",
            "--activate",
            "zksync-sepolia:0x00000000000000000000000000000000000000bb",
        ])
        .unwrap();
        assert_eq!(opts.verbose, 2);
        assert!(opts.tmp);
        assert_eq!(opts.activate.len(), 2);
        assert_eq!(opts.activate[1].chain().as_str(), "zksync-sepolia");
    }

    #[test]
    fn rejects_bad_addresses() {
        let bad = ["wallet-activator", "--activate", "nope"];
        assert!(Opts::from_iter_safe(bad).is_err());
    }

    #[test]
    fn temporary_store() {
        let opts = Opts::from_iter_safe(["wallet-activator", "--tmp"]).unwrap();
        assert!(create_store(&opts).is_ok());
    }
}
