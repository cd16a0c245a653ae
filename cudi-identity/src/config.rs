//! Runtime configuration, read from the environment.
//!
//! | Variable              | Default                         |
//! |-----------------------|---------------------------------|
//! | `CUDI_DATA_DIR`       | platform data dir + `cudi`      |
//! | `CUDI_STORE`          | `sqlite`                        |
//! | `CUDI_KDF_ITERATIONS` | `100000`                        |

use std::path::PathBuf;
use std::str::FromStr;

use crate::crypto::vault::{DEFAULT_ITERATIONS, MAX_ITERATIONS};
use crate::error::{IdentityError, Result};
use crate::storage::{IdentityStore, KeyringStore, MemoryStore, SqliteStore, KEYRING_SERVICE};

pub const DATA_DIR_ENV: &str = "CUDI_DATA_DIR";
pub const STORE_ENV: &str = "CUDI_STORE";
pub const KDF_ITERATIONS_ENV: &str = "CUDI_KDF_ITERATIONS";

const DATABASE_FILE: &str = "cudi.db";

/// Where the plaintext identity is kept between sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Keyring,
    /// Nothing survives the process.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "keyring" => Ok(Self::Keyring),
            "memory" => Ok(Self::Memory),
            other => Err(IdentityError::Config(format!(
                "unknown store backend {other:?} (expected sqlite, keyring or memory)"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub store: StoreBackend,
    /// PBKDF2 iterations used for new backups. Restores always use the
    /// count stored in the backup.
    pub kdf_iterations: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            store: StoreBackend::default(),
            kdf_iterations: DEFAULT_ITERATIONS,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("cudi"))
        .unwrap_or_else(|| PathBuf::from(".cudi"))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from any variable source; unset or blank variables
    /// fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(dir) = var(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(store) = var(STORE_ENV) {
            config.store = store.parse()?;
        }
        if let Some(iterations) = var(KDF_ITERATIONS_ENV) {
            config.kdf_iterations = match iterations.trim().parse::<u32>() {
                Ok(n) if (1..=MAX_ITERATIONS).contains(&n) => n,
                _ => {
                    return Err(IdentityError::Config(format!(
                        "{KDF_ITERATIONS_ENV} must be an integer in 1..={MAX_ITERATIONS}, got {iterations:?}"
                    )))
                }
            };
        }

        Ok(config)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    /// Open the configured identity store.
    pub fn open_store(&self) -> Result<IdentityStore> {
        Ok(match self.store {
            StoreBackend::Sqlite => IdentityStore::new(SqliteStore::open(self.database_path())?),
            StoreBackend::Keyring => IdentityStore::new(KeyringStore::open(KEYRING_SERVICE)?),
            StoreBackend::Memory => IdentityStore::new(MemoryStore::new()),
        })
    }
}
