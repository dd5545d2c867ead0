use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use jsonwebtoken::jwk::JwkSet;
use log::*;
use r2d2::Pool;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::auth::{KeySet, Verifier};
use infra::pg::DrinkConnectionManager;

const ENV_PREFIX: &str = "COFFEESHOP_";

#[derive(Deserialize, Debug)]
pub struct Config {
    pub postgres: PostgresConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub bootstrap: Bootstrap,
}

#[derive(Deserialize, Debug)]
pub struct PostgresConfig {
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

/// Where bearer tokens come from and what they must say about themselves.
#[derive(Deserialize, Debug)]
pub struct AuthConfig {
    pub issuer: String,
    pub audience: String,
    #[serde(default)]
    pub jwks_url: Option<Url>,
    #[serde(default)]
    pub jwks_path: Option<PathBuf>,
}

/// What happens to the drink table on start up. Dropping the table is a
/// development convenience and has to be asked for.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Bootstrap {
    #[serde(default)]
    pub reset: bool,
    #[serde(default = "default_seed")]
    pub seed: bool,
}

/// Settings taken from `COFFEESHOP_*` environment variables, which win over
/// the config file.
#[derive(Deserialize, Debug, Default)]
pub struct Overrides {
    pub postgres_url: Option<String>,
    pub listen_addr: Option<SocketAddr>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Deserialize, Debug, Default)]
pub struct EnvLogger {
    #[serde(default)]
    level: Option<LogLevel>,
    #[serde(default)]
    modules: HashMap<String, LogLevel>,
    #[serde(default)]
    timestamp_nanos: bool,
}

fn default_pool_size() -> u32 {
    4
}

fn default_seed() -> bool {
    true
}

/// Reads and parses a TOML config file.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let buf = fs::read_to_string(path).with_context(|| format!("read {:?}", path))?;
    let config = toml::from_str(&buf).with_context(|| format!("parse {:?}", path))?;
    Ok(config)
}

impl PostgresConfig {
    pub(crate) fn build(&self) -> Result<Pool<DrinkConnectionManager>> {
        debug!("Build pool of {} connections", self.pool_size);

        let manager = DrinkConnectionManager::new(&self.url)?;

        let builder = r2d2::Pool::builder().max_size(self.pool_size);

        debug!("Pool builder: {:?}", builder);
        let pool = builder.build(manager).context("build pool")?;

        Ok(pool)
    }
}

impl AuthConfig {
    /// Loads the signing keys tokens are checked against. Blocks on network
    /// access when a `jwks_url` is configured, so call it before the HTTP
    /// runtime starts.
    pub fn key_set(&self) -> Result<KeySet> {
        let jwks: JwkSet = match (&self.jwks_path, &self.jwks_url) {
            (Some(path), None) => {
                info!("Loading signing keys from {:?}", path);
                let buf = fs::read(path).with_context(|| format!("read {:?}", path))?;
                serde_json::from_slice(&buf).with_context(|| format!("parse {:?}", path))?
            }
            (None, Some(url)) => {
                info!("Fetching signing keys from {}", url);
                reqwest::blocking::get(url.as_str())
                    .and_then(|resp| resp.error_for_status())
                    .and_then(|resp| resp.json())
                    .with_context(|| format!("fetch {}", url))?
            }
            (Some(_), Some(_)) => bail!("set only one of auth.jwks_path and auth.jwks_url"),
            (None, None) => bail!("one of auth.jwks_path or auth.jwks_url is required"),
        };
        let keys = KeySet::from_jwks(&jwks)?;
        info!("Loaded {} signing keys", keys.len());
        Ok(keys)
    }

    pub fn verifier(&self, keys: KeySet) -> Verifier {
        Verifier::new(keys, &self.issuer, &self.audience)
    }
}

impl Default for Bootstrap {
    fn default() -> Self {
        Bootstrap {
            reset: false,
            seed: default_seed(),
        }
    }
}

impl Overrides {
    pub fn from_env() -> Result<Self> {
        let overrides = envy::prefixed(ENV_PREFIX)
            .from_env::<Overrides>()
            .context("read environment overrides")?;
        Ok(overrides)
    }

    pub fn apply(&self, config: &mut Config) {
        if let Some(url) = self.postgres_url.as_ref() {
            debug!("Postgres url overridden from environment");
            config.postgres.url = url.clone();
        }
    }
}

impl LogLevel {
    fn to_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl EnvLogger {
    pub fn builder(&self) -> env_logger::Builder {
        let mut b = env_logger::Builder::from_default_env();
        if let Some(level) = self.level {
            b.filter_level(level.to_filter());
        }

        for (module, level) in self.modules.iter() {
            b.filter_module(module, level.to_filter());
        }

        if self.timestamp_nanos {
            b.format_timestamp_nanos();
        }

        b
    }
}
