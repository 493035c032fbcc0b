//! Environment-driven configuration.

use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::keys::{Network, OracleKey, RawAddress};
use crate::oracle::OracleSettings;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Clone)]
pub struct Config {
    pub api_host: SocketAddr,
    pub database_url: String,
    pub database_max_connections: u32,
    pub oracle_key: OracleKey,
    pub contract_address: Option<RawAddress>,
    pub transfer_expiration: Duration,
    pub identity_expiration: Duration,
    pub network: Network,
    pub is_test: bool,
    pub node_rpc_url: String,
    pub node_rpc_user: Option<String>,
    pub node_rpc_password: Option<String>,
    pub header_offset: usize,
    pub feed_poll_interval: Duration,
    /// First height the follower scans when there is no snapshot to resume.
    pub feed_start_height: Option<u32>,
    pub feed_max_batch: u32,
    pub header_snapshot_file: PathBuf,
    pub approver_url: Option<String>,
    pub cors_allowed_origins: Vec<String>,
    pub shutdown_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source; empty values count as
    /// unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let required = |name: &'static str| var(name).ok_or(ConfigError::Missing(name));

        let network: Network = parse_or(&var, "BITCOIN_CHAIN", Network::Mainnet)?;
        let oracle_key =
            OracleKey::from_hex(&required("ORACLE_KEY")?).map_err(|err| ConfigError::Invalid {
                name: "ORACLE_KEY",
                reason: err.to_string(),
            })?;
        let contract_address = var("ORACLE_CONTRACT_ADDRESS")
            .map(|value| RawAddress::decode(&value, network))
            .transpose()
            .map_err(|err| ConfigError::Invalid {
                name: "ORACLE_CONTRACT_ADDRESS",
                reason: err.to_string(),
            })?;

        let header_offset: usize = parse_or(&var, "HEADER_OFFSET", crate::tracker::DEFAULT_OFFSET)?;
        if header_offset == 0 {
            return Err(ConfigError::Invalid {
                name: "HEADER_OFFSET",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            api_host: parse_or(&var, "API_HOST", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            database_url: required("DATABASE_URL")?,
            database_max_connections: parse_or(&var, "DATABASE_MAX_CONNECTIONS", 10)?,
            oracle_key,
            contract_address,
            transfer_expiration: seconds_or(&var, "TRANSFER_EXPIRATION_DURATION_SECONDS", 21_600)?,
            identity_expiration: seconds_or(&var, "IDENTITY_EXPIRATION_DURATION_SECONDS", 21_600)?,
            network,
            is_test: parse_or(&var, "IS_TEST", true)?,
            node_rpc_url: required("NODE_RPC_URL")?,
            node_rpc_user: var("NODE_RPC_USER"),
            node_rpc_password: var("NODE_RPC_PASSWORD"),
            header_offset,
            feed_poll_interval: seconds_or(&var, "FEED_POLL_INTERVAL_SECONDS", 10)?,
            feed_start_height: var("FEED_START_HEIGHT")
                .map(|value| parse("FEED_START_HEIGHT", &value))
                .transpose()?,
            feed_max_batch: parse_or(&var, "FEED_MAX_BATCH", crate::feed::DEFAULT_MAX_BATCH)?,
            header_snapshot_file: var("HEADER_SNAPSHOT_FILE")
                .unwrap_or_else(|| "./data/headers.bin".to_string())
                .into(),
            approver_url: var("APPROVER_URL"),
            cors_allowed_origins: var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|| "http://localhost:3000".to_string())
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
            shutdown_timeout: seconds_or(&var, "SHUTDOWN_TIMEOUT_SECONDS", 5)?,
        })
    }

    pub fn oracle_settings(&self) -> OracleSettings {
        OracleSettings {
            network: self.network,
            transfer_expiration: self.transfer_expiration,
            identity_expiration: self.identity_expiration,
        }
    }
}

fn parse<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
        name,
        reason: err.to_string(),
    })
}

fn parse_or<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match var(name) {
        Some(value) => parse(name, &value),
        None => Ok(default),
    }
}

fn seconds_or(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    parse_or(var, name, default).map(Duration::from_secs)
}

fn redact(value: &Option<String>) -> &'static str {
    match value {
        Some(_) => "<redacted>",
        None => "<unset>",
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_host", &self.api_host)
            .field("database_url", &"<redacted>")
            .field("database_max_connections", &self.database_max_connections)
            .field("oracle_key", &self.oracle_key)
            .field("contract_address", &self.contract_address)
            .field("transfer_expiration", &self.transfer_expiration)
            .field("identity_expiration", &self.identity_expiration)
            .field("network", &self.network)
            .field("is_test", &self.is_test)
            .field("node_rpc_url", &self.node_rpc_url)
            .field("node_rpc_user", &self.node_rpc_user)
            .field("node_rpc_password", &redact(&self.node_rpc_password))
            .field("header_offset", &self.header_offset)
            .field("feed_poll_interval", &self.feed_poll_interval)
            .field("feed_start_height", &self.feed_start_height)
            .field("feed_max_batch", &self.feed_max_batch)
            .field("header_snapshot_file", &self.header_snapshot_file)
            .field("approver_url", &self.approver_url)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}
