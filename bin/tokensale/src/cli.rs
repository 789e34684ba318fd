use std::path::PathBuf;

use alloy_core::primitives::Address;
use clap::{Args, Parser, Subcommand};
use tokensale_deploy::{CONFIG_FILENAME, ResumeFrom};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "tokensale")]
#[command(
    author,
    version,
    about = "Deploy a token and its crowdsale to an Ethereum network"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "TOKENSALE_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the configuration file, or to a directory containing `Tokensale.toml`.
    #[arg(short, long, alias = "conf", env = "TOKENSALE_CONFIG", default_value = CONFIG_FILENAME)]
    pub config: PathBuf,

    /// JSON file with `mnemonic` and `providerUrl` keys.
    ///
    /// Takes precedence over the `[credentials]` table of the configuration file.
    #[arg(long, env = "TOKENSALE_CREDENTIALS_FILE")]
    pub credentials: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deploy the token, then the crowdsale bound to it.
    Deploy {
        /// Name of the network profile, e.g. `ropsten` or `development`.
        network: String,
    },

    /// Finish a partially complete deployment.
    Resume {
        /// Name of the network profile.
        network: String,

        #[command(flatten)]
        token: ResumeToken,
    },

    /// List the available network profiles.
    Networks,

    /// Write a configuration template.
    Init {
        /// Where to write the template.
        #[arg(long, default_value = CONFIG_FILENAME)]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

/// Which token a resumed run binds the crowdsale to. One of the two is required.
#[derive(Debug, Clone, Args)]
#[group(required = true, multiple = false)]
pub struct ResumeToken {
    /// Address of the token deployed by the previous run.
    #[arg(long)]
    pub token: Option<Address>,

    /// Deploy a new token instead of reusing one.
    #[arg(long)]
    pub fresh_token: bool,
}

impl ResumeToken {
    pub fn resume_from(&self) -> ResumeFrom {
        match self.token {
            Some(address) => ResumeFrom::ExistingToken(address),
            None => ResumeFrom::FreshToken,
        }
    }
}
