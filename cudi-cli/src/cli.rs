use clap::{Parser, Subcommand};
use std::path::PathBuf;

use cudi_identity::{Config, StoreBackend};

const PASSWORD_ENV: &str = "CUDI_BACKUP_PASSWORD";

/// Manage the identity used by the Cudi peer-to-peer messenger.
#[derive(Debug, Parser)]
#[command(name = "cudi", version)]
pub struct Cli {
    /// Directory holding the identity database and logs (overrides CUDI_DATA_DIR)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Identity store backend: sqlite, keyring or memory (overrides CUDI_STORE)
    #[arg(long, global = true, value_parser = parse_store)]
    pub store: Option<StoreBackend>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the current peer id and public key
    Show {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate a new identity
    Create {
        /// Replace an existing identity
        #[arg(long)]
        force: bool,
    },
    /// Write a password-encrypted backup of the current identity
    Export {
        /// Output file (default: cudi_identity_<date>.json)
        #[arg(short, long)]
        out: Option<PathBuf>,
        #[arg(long, env = PASSWORD_ENV, hide_env_values = true)]
        password: String,
        /// Repeat the password; export is refused if they differ. Taken
        /// from the same variable as the password when that is set
        #[arg(long, env = PASSWORD_ENV, hide_env_values = true)]
        confirm: String,
    },
    /// Restore an identity from an encrypted backup file
    Restore {
        file: PathBuf,
        #[arg(long, env = PASSWORD_ENV, hide_env_values = true)]
        password: String,
        /// Replace an existing identity
        #[arg(long)]
        force: bool,
    },
    /// Delete the identity and its stored copy
    Reset {
        /// Confirm; this cannot be undone without a backup
        #[arg(long)]
        yes: bool,
    },
}

fn parse_store(value: &str) -> Result<StoreBackend, String> {
    value.parse().map_err(|e: cudi_identity::IdentityError| e.to_string())
}

impl Cli {
    /// Apply command-line overrides on top of the environment config.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(store) = self.store {
            config.store = store;
        }
        config
    }
}
