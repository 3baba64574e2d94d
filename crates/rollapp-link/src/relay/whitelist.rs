// Relayer authorization: whitelist a relayer on the Hub and wait for it to
// propagate to the RollApp.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chains::{ChainEndpoint, ChainQuery, TxBroadcaster, UnsignedTx};
use crate::error::LinkError;
use crate::metrics::OrchestratorMetrics;
use crate::monitor::{TxMonitor, TxOutcome, DEFAULT_DEADLINE};
use crate::progress::{NoProgress, ProgressSink};
use crate::utils::address_prefix;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Who authorizes whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelistRequest {
    /// Sequencer account on the Hub owning the whitelist
    pub sequencer_address: String,
    /// Sequencer operator address the RollApp mirrors the whitelist under
    pub operator_address: String,
    pub relayer_address: String,
}

/// Recomputed on every synchronization request; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelistState {
    pub sequencer_address: String,
    pub relayer_address: String,
    pub whitelisted_on_hub: bool,
    pub propagated_to_rollapp: bool,
}

/// Propagation is complete only when the mirrored list is non-empty and names the relayer.
pub fn is_propagated(relayers: &[String], relayer_address: &str) -> bool {
    !relayers.is_empty() && relayers.iter().any(|r| r == relayer_address)
}

pub struct WhitelistSynchronizer {
    query: Arc<dyn ChainQuery>,
    broadcaster: Arc<dyn TxBroadcaster>,
    monitor: Arc<TxMonitor>,
    progress: Arc<dyn ProgressSink>,
    metrics: Option<Arc<OrchestratorMetrics>>,
    poll_interval: Duration,
    tx_deadline: Duration,
}

impl WhitelistSynchronizer {
    pub fn new(query: Arc<dyn ChainQuery>, broadcaster: Arc<dyn TxBroadcaster>, monitor: Arc<TxMonitor>) -> Self {
        Self {
            query,
            broadcaster,
            monitor,
            progress: Arc::new(NoProgress),
            metrics: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            tx_deadline: DEFAULT_DEADLINE,
        }
    }

    /// Spacing between RollApp polls. Zero is bumped to one millisecond so the loop always sleeps.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_tx_deadline(mut self, deadline: Duration) -> Self {
        self.tx_deadline = deadline;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<OrchestratorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Make sure the relayer is whitelisted on the Hub, then block until the RollApp
    /// sees it. Polls without bound; only `cancel` ends an unfinished wait.
    pub async fn ensure_whitelisted(
        &self,
        request: &WhitelistRequest,
        hub: &ChainEndpoint,
        rollapp: &ChainEndpoint,
        cancel: &CancellationToken,
    ) -> Result<WhitelistState, LinkError> {
        self.validate(request, hub)?;

        let mut state = WhitelistState {
            sequencer_address: request.sequencer_address.clone(),
            relayer_address: request.relayer_address.clone(),
            whitelisted_on_hub: false,
            propagated_to_rollapp: false,
        };

        let current = self.query.query_hub_whitelist(hub, &request.sequencer_address).await?;
        if current.iter().any(|r| r == &request.relayer_address) {
            info!("Relayer {} already whitelisted on {}", request.relayer_address, hub.chain_id);
        } else {
            warn!(
                "Relayer key ({}) is not whitelisted, updating whitelisted relayers",
                request.relayer_address
            );
            self.authorize(request, hub, current, cancel).await?;
        }
        state.whitelisted_on_hub = true;

        self.wait_for_propagation(request, rollapp, cancel).await?;
        state.propagated_to_rollapp = true;
        Ok(state)
    }

    fn validate(&self, request: &WhitelistRequest, hub: &ChainEndpoint) -> Result<(), LinkError> {
        if request.sequencer_address.is_empty() || request.operator_address.is_empty() {
            return Err(LinkError::InvalidInput(
                "sequencer and operator addresses are required".to_string(),
            ));
        }
        let prefix = address_prefix(&request.relayer_address)?;
        if prefix != hub.address_prefix {
            return Err(LinkError::InvalidInput(format!(
                "relayer address {} has prefix '{}', {} expects '{}'",
                request.relayer_address, prefix, hub.chain_id, hub.address_prefix
            )));
        }
        Ok(())
    }

    /// Submit the whitelist update (existing relayers plus the new one) and wait for commit.
    async fn authorize(
        &self,
        request: &WhitelistRequest,
        hub: &ChainEndpoint,
        mut relayers: Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<(), LinkError> {
        relayers.push(request.relayer_address.clone());
        self.progress.report("Updating whitelisted relayers on the Hub...");

        let tx_hash = self
            .broadcaster
            .sign_and_broadcast(
                hub,
                UnsignedTx::UpdateWhitelistedRelayers {
                    sequencer_address: request.sequencer_address.clone(),
                    relayers,
                },
            )
            .await?;
        info!("Whitelist update submitted to {}: {}", hub.chain_id, tx_hash);

        match self
            .monitor
            .await_committed(hub, &tx_hash, self.tx_deadline, cancel)
            .await?
        {
            TxOutcome::Success { .. } => Ok(()),
            TxOutcome::Failure { code, log } => Err(LinkError::Rejected { tx_hash, code, log }),
            TxOutcome::Timeout => Err(LinkError::Timeout {
                what: format!("whitelist update {}", tx_hash),
                after: self.tx_deadline,
            }),
            TxOutcome::Cancelled => Err(LinkError::Cancelled),
        }
    }

    async fn wait_for_propagation(
        &self,
        request: &WhitelistRequest,
        rollapp: &ChainEndpoint,
        cancel: &CancellationToken,
    ) -> Result<(), LinkError> {
        let mut attempt: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(LinkError::Cancelled);
            }

            attempt += 1;
            if let Some(metrics) = &self.metrics {
                metrics.record_whitelist_poll();
            }
            self.progress.report(&format!(
                "Waiting for the whitelisted relayer to propagate to the RollApp (attempt {})...",
                attempt
            ));

            let relayers = self
                .query
                .query_rollapp_whitelist(rollapp, &request.operator_address)
                .await?;
            if is_propagated(&relayers, &request.relayer_address) {
                info!(
                    "Relayer {} propagated to {} after {} poll(s)",
                    request.relayer_address, rollapp.chain_id, attempt
                );
                self.progress.report("Relayer whitelisted and propagated to the RollApp");
                return Ok(());
            }
            debug!(
                "Attempt {}: {} relayer(s) whitelisted on {}, target not among them",
                attempt,
                relayers.len(),
                rollapp.chain_id
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(LinkError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
