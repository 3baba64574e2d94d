// Caller-level flows over the link components
//
// The components themselves hold no locks. This facade serialises operations per
// path name and keeps the LinkStateStore in step with what the chains report.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::chains::{
    ChainCommand, ChainEndpoint, ChainQuery, CosmosQuery, KeyringBroadcaster, RelayerCli, TxBroadcaster,
};
use crate::config::store::{LinkStateStore, TomlLinkStore};
use crate::config::{expand_path, OrchestratorConfig};
use crate::error::LinkError;
use crate::metrics::OrchestratorMetrics;
use crate::monitor::{EndpointResolver, NoAlternateEndpoint, TendermintSubscriber, TxMonitor, TxOutcome, TxSubscriber};
use crate::progress::{FanoutProgress, ProgressSink, StatusFileProgress, TracingProgress};
use crate::relay::{
    Discovery, HandshakeOptions, LinkDiscovery, LinkEstablisher, LinkPath, WhitelistRequest, WhitelistState,
    WhitelistSynchronizer,
};

/// External collaborators the orchestrator is wired to.
pub struct Collaborators {
    pub query: Arc<dyn ChainQuery>,
    pub command: Arc<dyn ChainCommand>,
    pub broadcaster: Arc<dyn TxBroadcaster>,
    pub subscriber: Arc<dyn TxSubscriber>,
    pub resolver: Arc<dyn EndpointResolver>,
    pub store: Arc<dyn LinkStateStore>,
    pub progress: Arc<dyn ProgressSink>,
    pub metrics: Option<Arc<OrchestratorMetrics>>,
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    store: Arc<dyn LinkStateStore>,
    progress: Arc<dyn ProgressSink>,
    establisher: LinkEstablisher,
    discovery: LinkDiscovery,
    whitelist: WhitelistSynchronizer,
    monitor: Arc<TxMonitor>,
    path_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, parts: Collaborators) -> Self {
        let mut monitor = TxMonitor::new(parts.query.clone(), parts.subscriber)
            .with_resolver(parts.resolver)
            .with_progress(parts.progress.clone());
        let mut discovery = LinkDiscovery::new(parts.query.clone());
        let options = HandshakeOptions {
            override_existing: config.relayer.override_existing,
            connection_timeout: Duration::from_secs(config.relayer.connection_timeout_secs),
            channel_timeout: Duration::from_secs(config.relayer.channel_timeout_secs),
        };
        let mut establisher = LinkEstablisher::new(parts.command, parts.query.clone())
            .with_options(options)
            .with_store(parts.store.clone())
            .with_progress(parts.progress.clone());

        if let Some(metrics) = &parts.metrics {
            monitor = monitor.with_metrics(metrics.clone());
            discovery = discovery.with_metrics(metrics.clone());
            establisher = establisher.with_metrics(metrics.clone());
        }
        let monitor = Arc::new(monitor);

        let mut whitelist = WhitelistSynchronizer::new(parts.query, parts.broadcaster, monitor.clone())
            .with_poll_interval(config.poll_interval())
            .with_tx_deadline(config.monitor_deadline())
            .with_progress(parts.progress.clone());
        if let Some(metrics) = parts.metrics {
            whitelist = whitelist.with_metrics(metrics);
        }

        Self {
            config,
            store: parts.store,
            progress: parts.progress,
            establisher,
            discovery,
            whitelist,
            monitor,
            path_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Production wiring: REST queries, the relayer binary, the daemon keyring, the
    /// websocket subscriber and the config file itself as the link store.
    pub fn from_config(
        config: OrchestratorConfig,
        config_file: &Path,
        resolver: Arc<dyn EndpointResolver>,
        metrics: Option<Arc<OrchestratorMetrics>>,
    ) -> Result<Self, LinkError> {
        let query = Arc::new(CosmosQuery::new(config.query_routes(), config.request_timeout())?);
        let command = Arc::new(RelayerCli::new(
            expand_path(&config.relayer.binary),
            expand_path(&config.relayer.home),
            config.relayer.channel_max_retries,
        ));
        let broadcaster = Arc::new(KeyringBroadcaster::new(
            expand_path(&config.broadcaster.binary),
            expand_path(&config.broadcaster.home),
            config.broadcaster.key_name.clone(),
            config.broadcaster.keyring_backend.clone(),
            config.broadcaster.gas_adjustment,
        ));

        let mut progress = FanoutProgress::new().with(Arc::new(TracingProgress));
        if let Some(status_file) = &config.global.status_file {
            progress = progress.with(Arc::new(StatusFileProgress::new(expand_path(status_file))));
        }

        let parts = Collaborators {
            query,
            command,
            broadcaster,
            subscriber: Arc::new(TendermintSubscriber),
            resolver,
            store: Arc::new(TomlLinkStore::new(config_file)),
            progress: Arc::new(progress),
            metrics,
        };
        Ok(Self::new(config, parts))
    }

    /// Wiring without an operator prompt or metrics.
    pub fn from_config_defaults(config: OrchestratorConfig, config_file: &Path) -> Result<Self, LinkError> {
        Self::from_config(config, config_file, Arc::new(NoAlternateEndpoint), None)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn establisher(&self) -> &LinkEstablisher {
        &self.establisher
    }

    pub fn discovery(&self) -> &LinkDiscovery {
        &self.discovery
    }

    pub fn whitelist(&self) -> &WhitelistSynchronizer {
        &self.whitelist
    }

    pub fn monitor(&self) -> &TxMonitor {
        &self.monitor
    }

    /// Serialise on a configured path. Unknown names fail before a lock is created.
    async fn lock_path(&self, path_name: &str) -> Result<OwnedMutexGuard<()>, LinkError> {
        self.config.path(path_name)?;
        let lock = {
            let mut locks = self.path_locks.lock().await;
            locks
                .entry(path_name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        Ok(lock.lock_owned().await)
    }

    /// Path names that have been operated on so far.
    pub async fn tracked_paths(&self) -> Vec<String> {
        let mut names: Vec<String> = self.path_locks.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    fn endpoints(&self, path_name: &str) -> Result<(ChainEndpoint, ChainEndpoint), LinkError> {
        Ok(self.config.path_endpoints(path_name)?)
    }

    /// Re-derive the path from the chains. A found link overwrites the stored one;
    /// a missing link leaves the store untouched.
    pub async fn refresh_link(&self, path_name: &str) -> Result<Discovery, LinkError> {
        let _guard = self.lock_path(path_name).await?;
        self.refresh_locked(path_name).await
    }

    async fn refresh_locked(&self, path_name: &str) -> Result<Discovery, LinkError> {
        let (side_a, side_b) = self.endpoints(path_name)?;
        let discovery = self.discovery.discover_open_link(&side_a, &side_b).await?;
        if let Discovery::Found(path) = &discovery {
            self.store.put_link_path(path_name, path).await?;
            self.progress.report(&path.status_line());
        }
        Ok(discovery)
    }

    /// Run the full handshake for a configured path.
    pub async fn establish_link(&self, path_name: &str) -> Result<LinkPath, LinkError> {
        let _guard = self.lock_path(path_name).await?;
        let (side_a, side_b) = self.endpoints(path_name)?;
        self.establisher.establish_link(path_name, &side_a, &side_b).await
    }

    /// Reuse an open link if the chains already have one, otherwise establish it.
    pub async fn ensure_link(&self, path_name: &str) -> Result<LinkPath, LinkError> {
        let _guard = self.lock_path(path_name).await?;

        match self.refresh_locked(path_name).await? {
            Discovery::Found(path) => {
                info!("Reusing open link for {}", path_name);
                Ok(path)
            }
            Discovery::NotFound(reason) => {
                info!("No usable link for {} ({}), establishing one", path_name, reason);
                let (side_a, side_b) = self.endpoints(path_name)?;
                self.establisher.establish_link(path_name, &side_a, &side_b).await
            }
        }
    }

    /// Human-readable readiness of the stored path.
    pub async fn link_status(&self, path_name: &str) -> Result<String, LinkError> {
        let stored = self.store.get_link_path(path_name).await?;
        Ok(stored
            .map(|path| path.status_line())
            .unwrap_or_else(|| "Starting...".to_string()))
    }

    /// Whitelist a relayer between two configured chains (Hub first).
    pub async fn ensure_whitelisted(
        &self,
        request: &WhitelistRequest,
        hub_chain: &str,
        rollapp_chain: &str,
        cancel: &CancellationToken,
    ) -> Result<WhitelistState, LinkError> {
        let hub = self.config.chain_endpoint(hub_chain)?;
        let rollapp = self.config.chain_endpoint(rollapp_chain)?;
        self.whitelist.ensure_whitelisted(request, &hub, &rollapp, cancel).await
    }

    /// Watch a transaction on a configured chain; `deadline` defaults to `[monitor]`.
    pub async fn await_committed(
        &self,
        chain: &str,
        tx_hash: &str,
        deadline: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<TxOutcome, LinkError> {
        let endpoint = self.config.chain_endpoint(chain)?;
        let deadline = deadline.unwrap_or_else(|| self.config.monitor_deadline());
        self.monitor.await_committed(&endpoint, tx_hash, deadline, cancel).await
    }
}
