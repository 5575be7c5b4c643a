//! Connection and cache settings, read once from the environment at startup.
//!
//! Every setting has a fixed fallback, so loading never fails on missing or
//! odd values; the only fallible step is creating the cache directory.

use keiba_error::Result;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

pub const ENV_DB_HOST: &str = "DB_HOST";
pub const ENV_DB_PORT: &str = "DB_PORT";
pub const ENV_DB_NAME: &str = "DB_NAME";
pub const ENV_DB_USER: &str = "DB_USER";
pub const ENV_DB_PASS: &str = "DB_PASS";
pub const ENV_CACHE_DIR: &str = "CACHE_DIR";

pub const DEFAULT_DB_HOST: &str = "127.0.0.1";
pub const DEFAULT_DB_PORT: &str = "5432";
pub const DEFAULT_DB_NAME: &str = "pckeiba";
pub const DEFAULT_DB_USER: &str = "postgres";
pub const DEFAULT_DB_PASS: &str = "postgres";
pub const DEFAULT_CACHE_DIR: &str = "./data/cache";

const REDACTED: &str = "****";

fn serialize_secret<S>(_secret: &SecretString, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(REDACTED)
}

/// Database connection parameters.
///
/// `port` is kept exactly as configured and only parsed when a connection
/// is built.
#[derive(Debug, Serialize)]
pub struct DbConfig {
    pub host: String,
    pub port: String,
    pub name: String,
    pub user: String,
    #[serde(serialize_with = "serialize_secret")]
    pub password: SecretString,
}

impl DbConfig {
    pub fn new(
        host: impl Into<String>,
        port: impl Into<String>,
        name: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
            name: name.into(),
            user: user.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// `postgresql://<user>:<pass>@<host>:<port>/<dbname>`
    pub fn connection_string(&self) -> String {
        self.format_url(self.password.expose_secret())
    }

    /// Same as [`connection_string`](Self::connection_string) with the password masked.
    pub fn redacted_connection_string(&self) -> String {
        self.format_url(REDACTED)
    }

    fn format_url(&self, password: &str) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.user, password, self.host, self.port, self.name
        )
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_DB_HOST,
            DEFAULT_DB_PORT,
            DEFAULT_DB_NAME,
            DEFAULT_DB_USER,
            DEFAULT_DB_PASS,
        )
    }
}

impl Clone for DbConfig {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            port: self.port.clone(),
            name: self.name.clone(),
            user: self.user.clone(),
            password: SecretString::from(self.password.expose_secret().to_owned()),
        }
    }
}

impl fmt::Display for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted_connection_string())
    }
}

/// Location of the on-disk query result cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheConfig {
    pub directory: PathBuf,
}

impl CacheConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Create the cache directory if it does not exist yet. Idempotent.
    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.directory)?;
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_DIR)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AppConfig {
    pub database: DbConfig,
    pub cache: CacheConfig,
}

impl AppConfig {
    /// Build the configuration from an arbitrary variable lookup.
    ///
    /// Only variables the lookup reports as unset fall back to their
    /// defaults; an empty value is taken as-is.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Self {
            database: DbConfig::new(
                get(ENV_DB_HOST, DEFAULT_DB_HOST),
                get(ENV_DB_PORT, DEFAULT_DB_PORT),
                get(ENV_DB_NAME, DEFAULT_DB_NAME),
                get(ENV_DB_USER, DEFAULT_DB_USER),
                get(ENV_DB_PASS, DEFAULT_DB_PASS),
            ),
            cache: CacheConfig::new(get(ENV_CACHE_DIR, DEFAULT_CACHE_DIR)),
        }
    }

    /// Read `.env` (if present) and the process environment.
    ///
    /// Variables already set in the environment win over `.env` entries.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// [`from_env`](Self::from_env) followed by creating the cache directory.
    pub fn load() -> Result<Self> {
        let config = Self::from_env();
        config.cache.ensure_dir()?;
        tracing::debug!(
            database = %config.database,
            cache_dir = %config.cache.directory.display(),
            "Loaded configuration"
        );
        Ok(config)
    }
}
