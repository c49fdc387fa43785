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
use structopt::StructOpt;

use crate::Config;

/// The Airkeeper Command-line tool
///
/// Run one update cycle from a config directory:
///
/// $ airkeeper -vvv -c <CONFIG_DIR_PATH> --once
#[derive(StructOpt)]
#[structopt(name = "Airkeeper")]
pub struct Opts {
    /// A level of verbosity, and can be used multiple times
    #[structopt(short, long, parse(from_occurrences))]
    pub verbose: i32,
    /// Directory that contains the configuration files
    /// (`config.json` and `airkeeper.json`).
    #[structopt(
        short = "c",
        long = "config-dir",
        value_name = "PATH",
        parse(from_os_str)
    )]
    pub config_dir: PathBuf,
    /// Run a single update cycle and exit, instead of ticking every
    /// minute.
    #[structopt(long)]
    pub once: bool,
}

/// Labels read from the hosting environment, used only in logs.
#[derive(Debug, Clone)]
pub struct ServerlessEnvironment {
    /// The `CLOUD_PROVIDER` environment variable, if any.
    pub cloud_provider: Option<String>,
    /// The `STAGE` environment variable, if any.
    pub stage: Option<String>,
}

impl ServerlessEnvironment {
    /// Reads the labels from the process environment.
    pub fn from_env() -> Self {
        Self {
            cloud_provider: std::env::var("CLOUD_PROVIDER").ok(),
            stage: std::env::var("STAGE").ok(),
        }
    }
}

/// Loads the merged configuration from the given directory.
pub fn load_config<P>(config_dir: P) -> Result<Config, anyhow::Error>
where
    P: AsRef<Path>,
{
    let path = config_dir.as_ref();
    if !path.is_dir() {
        return Err(anyhow::anyhow!("{} is not a directory", path.display()));
    }
    tracing::trace!("Loading Config from {} ..", path.display());
    let config = crate::utils::load(path)
        .context("failed to load the keeper configuration")?;
    tracing::trace!("Config loaded..");
    Ok(config)
}

/// Sets up the logger for the keeper, based on the verbosity level passed
/// in.
pub fn setup_logger(verbosity: i32, filter: &str) -> anyhow::Result<()> {
    use tracing::Level;
    let log_level = match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let directive = format!("{filter}={log_level}")
        .parse()
        .expect("valid log level");
    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(directive);
    tracing_subscriber::fmt()
        .with_target(true)
        .with_max_level(log_level)
        .with_env_filter(env_filter)
        .init();
    Ok(())
}
