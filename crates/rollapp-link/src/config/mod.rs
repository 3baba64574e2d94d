// Orchestrator configuration: one TOML document with env overrides

pub mod store;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::chains::cosmos::QueryRoutes;
use crate::chains::ChainEndpoint;
use crate::relay::path::{ChannelState, LinkPath, PathEnd};

/// Environment variables named `ROLLAPP_LINK__<SECTION>__<KEY>` override the file.
pub const ENV_PREFIX: &str = "ROLLAPP_LINK";
pub const ENV_SEPARATOR: &str = "__";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot access configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse configuration: {0}")]
    Parse(String),

    #[error("missing configuration key '{0}'")]
    MissingKey(String),

    #[error("invalid value for '{key}': {reason}")]
    Invalid { key: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub global: GlobalConfig,
    pub chains: BTreeMap<String, ChainConfig>,
    pub paths: BTreeMap<String, PathConfig>,
    pub relayer: RelayerSection,
    pub whitelist: WhitelistSection,
    pub monitor: MonitorSection,
    pub broadcaster: BroadcasterSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default tracing filter when RUST_LOG is unset
    pub log_level: String,
    /// File receiving the latest operator-facing status line
    pub status_file: Option<String>,
    /// Per-request timeout for REST and RPC queries, in seconds
    pub request_timeout_secs: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            status_file: None,
            request_timeout_secs: 30,
        }
    }
}

/// `[chains.<name>]`. Every field except `ws_endpoint` is required when the chain is used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub chain_id: String,
    pub rpc_endpoint: String,
    pub api_endpoint: String,
    pub ws_endpoint: Option<String>,
    pub denom: String,
    pub address_prefix: String,
    pub gas_price: String,
}

/// `[paths.<name>]`: which configured chains the path joins and what was last observed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub src_chain: String,
    pub dst_chain: String,
    pub state: ChannelState,
    pub src: PathEnd,
    pub dst: PathEnd,
}

impl PathConfig {
    pub fn link_path(&self) -> LinkPath {
        LinkPath {
            state: self.state,
            side_a: self.src.clone(),
            side_b: self.dst.clone(),
        }
    }

    /// Overwrite the observed identifiers, keeping which chains the path joins.
    pub fn apply(&mut self, path: &LinkPath) {
        self.state = path.state;
        self.src = path.side_a.clone();
        self.dst = path.side_b.clone();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayerSection {
    pub binary: String,
    pub home: String,
    pub override_existing: bool,
    pub connection_timeout_secs: u64,
    pub channel_timeout_secs: u64,
    pub channel_max_retries: u32,
}

impl Default for RelayerSection {
    fn default() -> Self {
        Self {
            binary: "rly".to_string(),
            home: "~/.roller/relayer".to_string(),
            override_existing: false,
            connection_timeout_secs: 300,
            channel_timeout_secs: 300,
            channel_max_retries: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhitelistSection {
    pub poll_interval_secs: u64,
    pub hub_route: String,
    pub rollapp_route: String,
}

impl Default for WhitelistSection {
    fn default() -> Self {
        let routes = QueryRoutes::default();
        Self {
            poll_interval_secs: 5,
            hub_route: routes.hub_whitelist,
            rollapp_route: routes.rollapp_whitelist,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSection {
    pub deadline_secs: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self { deadline_secs: 300 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcasterSection {
    pub binary: String,
    pub home: String,
    pub key_name: String,
    pub keyring_backend: String,
    pub gas_adjustment: f64,
}

impl Default for BroadcasterSection {
    fn default() -> Self {
        Self {
            binary: "dymd".to_string(),
            home: "~/.roller/hub-keys".to_string(),
            key_name: "hub_sequencer".to_string(),
            keyring_backend: "test".to_string(),
            gas_adjustment: 1.3,
        }
    }
}

/// Expand `~` and `$VAR` references in a configured filesystem path.
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
    }
}

impl OrchestratorConfig {
    /// `~/.roller/rollapp-link.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or_else(|| ConfigError::Invalid {
            key: "config".to_string(),
            reason: "cannot determine the home directory".to_string(),
        })?;
        Ok(home.join(".roller").join("rollapp-link.toml"))
    }

    /// Load configuration from a TOML file, layered under environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )));
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        let loaded: OrchestratorConfig = settings
            .try_deserialize()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Parse a TOML document without environment overrides.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let parsed: OrchestratorConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.whitelist.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "whitelist.poll_interval_secs".to_string(),
                reason: "must be at least 1 second".to_string(),
            });
        }
        if self.monitor.deadline_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "monitor.deadline_secs".to_string(),
                reason: "must be at least 1 second".to_string(),
            });
        }
        for (name, path) in &self.paths {
            if path.src_chain.is_empty() {
                return Err(ConfigError::MissingKey(format!("paths.{}.src_chain", name)));
            }
            if path.dst_chain.is_empty() {
                return Err(ConfigError::MissingKey(format!("paths.{}.dst_chain", name)));
            }
        }
        Ok(())
    }

    /// Typed endpoint accessor. Unknown chains and empty required fields are errors.
    pub fn chain_endpoint(&self, name: &str) -> Result<ChainEndpoint, ConfigError> {
        let chain = self
            .chains
            .get(name)
            .ok_or_else(|| ConfigError::MissingKey(format!("chains.{}", name)))?;

        let required = |field: &str, value: &str| -> Result<String, ConfigError> {
            let value = value.trim();
            if value.is_empty() {
                Err(ConfigError::MissingKey(format!("chains.{}.{}", name, field)))
            } else {
                Ok(value.to_string())
            }
        };

        Ok(ChainEndpoint {
            chain_id: required("chain_id", &chain.chain_id)?,
            rpc_url: required("rpc_endpoint", &chain.rpc_endpoint)?,
            api_url: required("api_endpoint", &chain.api_endpoint)?,
            ws_url: chain
                .ws_endpoint
                .as_deref()
                .map(str::trim)
                .filter(|ws| !ws.is_empty())
                .map(str::to_string),
            denom: required("denom", &chain.denom)?,
            address_prefix: required("address_prefix", &chain.address_prefix)?,
            gas_price: required("gas_price", &chain.gas_price)?,
        })
    }

    pub fn path(&self, name: &str) -> Result<&PathConfig, ConfigError> {
        self.paths
            .get(name)
            .ok_or_else(|| ConfigError::MissingKey(format!("paths.{}", name)))
    }

    /// Endpoints of both sides of a configured path, side A first.
    pub fn path_endpoints(&self, name: &str) -> Result<(ChainEndpoint, ChainEndpoint), ConfigError> {
        let path = self.path(name)?;
        Ok((self.chain_endpoint(&path.src_chain)?, self.chain_endpoint(&path.dst_chain)?))
    }

    pub fn query_routes(&self) -> QueryRoutes {
        QueryRoutes {
            hub_whitelist: self.whitelist.hub_route.clone(),
            rollapp_whitelist: self.whitelist.rollapp_route.clone(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.global.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.whitelist.poll_interval_secs)
    }

    pub fn monitor_deadline(&self) -> Duration {
        Duration::from_secs(self.monitor.deadline_secs)
    }
}
