// Transaction commitment monitor
//
// Waits on the matching tx event, a periodic lookup of the indexed result, an
// overall deadline and the caller's cancellation token. Whatever wins, the
// subscription is released before returning.

pub mod subscription;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chains::{ChainEndpoint, ChainQuery};
use crate::error::LinkError;
use crate::metrics::OrchestratorMetrics;
use crate::progress::{NoProgress, ProgressSink};
use crate::utils::normalize_tx_hash;

pub use subscription::{TendermintSubscriber, TxResultEvent, TxSubscriber, TxSubscription};

pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(300);

/// Spacing of the indexed-result lookups that run alongside the subscription.
pub const LOOKUP_INTERVAL: Duration = Duration::from_secs(2);

/// Terminal result of one watch. Exactly one is produced per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    Success { gas_wanted: i64, gas_used: i64 },
    Failure { code: u32, log: String },
    Timeout,
    Cancelled,
}

impl TxOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TxOutcome::Success { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            TxOutcome::Success { .. } => "success",
            TxOutcome::Failure { .. } => "failure",
            TxOutcome::Timeout => "timeout",
            TxOutcome::Cancelled => "cancelled",
        }
    }

    fn from_result(event: &TxResultEvent) -> Self {
        if event.code == 0 {
            TxOutcome::Success {
                gas_wanted: event.gas_wanted,
                gas_used: event.gas_used,
            }
        } else {
            TxOutcome::Failure {
                code: event.code,
                log: event.log.clone(),
            }
        }
    }
}

/// One in-flight watch of a submitted transaction.
#[derive(Debug, Clone)]
pub struct TxMonitorSession {
    pub chain: ChainEndpoint,
    /// Upper-case hex, as indexed by CometBFT
    pub tx_hash: String,
    pub deadline: Duration,
}

impl TxMonitorSession {
    pub fn new(chain: ChainEndpoint, tx_hash: &str, deadline: Duration) -> Result<Self, LinkError> {
        Ok(Self {
            chain,
            tx_hash: normalize_tx_hash(tx_hash)?,
            deadline,
        })
    }
}

/// Operator-facing fallback when a chain's RPC endpoint fails its liveness probe.
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    /// A replacement RPC URL for `chain`, or `None` to give up.
    async fn resolve_alternate_endpoint(&self, chain: &ChainEndpoint) -> Result<Option<String>, LinkError>;
}

/// Never offers a replacement; unreachable endpoints fail the watch.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAlternateEndpoint;

#[async_trait]
impl EndpointResolver for NoAlternateEndpoint {
    async fn resolve_alternate_endpoint(&self, _chain: &ChainEndpoint) -> Result<Option<String>, LinkError> {
        Ok(None)
    }
}

pub struct TxMonitor {
    query: Arc<dyn ChainQuery>,
    subscriber: Arc<dyn TxSubscriber>,
    resolver: Arc<dyn EndpointResolver>,
    progress: Arc<dyn ProgressSink>,
    metrics: Option<Arc<OrchestratorMetrics>>,
}

impl TxMonitor {
    pub fn new(query: Arc<dyn ChainQuery>, subscriber: Arc<dyn TxSubscriber>) -> Self {
        Self {
            query,
            subscriber,
            resolver: Arc::new(NoAlternateEndpoint),
            progress: Arc::new(NoProgress),
            metrics: None,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn EndpointResolver>) -> Self {
        self.resolver = resolver;
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

    /// Wait until `tx_hash` is committed on `chain`, the deadline passes, or `cancel` fires.
    ///
    /// `Err` is reserved for setup failures: a bad hash, an unreachable endpoint, or an
    /// event stream that dies before resolving.
    pub async fn await_committed(
        &self,
        chain: &ChainEndpoint,
        tx_hash: &str,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<TxOutcome, LinkError> {
        let session = TxMonitorSession::new(chain.clone(), tx_hash, deadline)?;
        self.watch(session, cancel).await
    }

    pub async fn watch(&self, session: TxMonitorSession, cancel: &CancellationToken) -> Result<TxOutcome, LinkError> {
        let tx_hash = session.tx_hash.as_str();
        let started = Instant::now();
        let deadline = tokio::time::sleep(session.deadline);
        tokio::pin!(deadline);

        // The probe, the operator prompt and the subscribe all count against the deadline
        let (chain, mut subscription) = tokio::select! {
            biased;

            _ = cancel.cancelled() => return Ok(self.conclude(&session, TxOutcome::Cancelled, started)),

            _ = &mut deadline => return Ok(self.conclude(&session, TxOutcome::Timeout, started)),

            opened = self.open(&session) => opened?,
        };

        self.progress.report(&format!(
            "Waiting for transaction {} to be committed on {}...",
            tx_hash, chain.chain_id
        ));
        info!("Watching tx {} on {} (deadline {:?})", tx_hash, chain.chain_id, session.deadline);

        // First tick fires at once, catching a tx committed before the subscription existed
        let mut lookups = tokio::time::interval(LOOKUP_INTERVAL);
        lookups.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break Ok(TxOutcome::Cancelled),

                _ = &mut deadline => break Ok(TxOutcome::Timeout),

                next = subscription.next_result() => match next {
                    Some(Ok(event)) if event.tx_hash.eq_ignore_ascii_case(tx_hash) => {
                        debug!("Tx {} committed at height {}", tx_hash, event.height);
                        break Ok(TxOutcome::from_result(&event));
                    }
                    Some(Ok(event)) => {
                        debug!("Ignoring event for unrelated tx {}", event.tx_hash);
                    }
                    Some(Err(e)) => break Err(e),
                    None => {
                        break Err(LinkError::unreachable(
                            &chain.chain_id,
                            "event subscription closed before the transaction resolved",
                        ))
                    }
                },

                _ = lookups.tick() => {
                    let found = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break Ok(TxOutcome::Cancelled),
                        _ = &mut deadline => break Ok(TxOutcome::Timeout),
                        found = subscription.lookup() => found,
                    };
                    match found {
                        Ok(Some(event)) => {
                            debug!("Tx {} found indexed at height {}", tx_hash, event.height);
                            break Ok(TxOutcome::from_result(&event));
                        }
                        Ok(None) => {}
                        Err(e) => debug!("Looking up tx {} on {}: {}", tx_hash, chain.chain_id, e),
                    }
                }
            }
        };

        if let Err(e) = subscription.unsubscribe().await {
            warn!("Unsubscribing from tx {} on {}: {}", tx_hash, chain.chain_id, e);
        }

        match result {
            Ok(outcome) => Ok(self.conclude(&session, outcome, started)),
            Err(e) => {
                error!("Watching tx {} failed: {}", tx_hash, e);
                Err(e)
            }
        }
    }

    async fn open(&self, session: &TxMonitorSession) -> Result<(ChainEndpoint, Box<dyn TxSubscription>), LinkError> {
        let chain = self.live_endpoint(&session.chain).await?;
        let subscription = self.subscriber.subscribe(&chain, &session.tx_hash).await?;
        Ok((chain, subscription))
    }

    fn conclude(&self, session: &TxMonitorSession, outcome: TxOutcome, started: Instant) -> TxOutcome {
        self.report_outcome(&session.tx_hash, &outcome, session.deadline);
        if let Some(metrics) = &self.metrics {
            metrics.record_tx_outcome(outcome.label(), started.elapsed());
        }
        outcome
    }

    /// The session's endpoint if it answers the probe, otherwise an operator-supplied one.
    async fn live_endpoint(&self, chain: &ChainEndpoint) -> Result<ChainEndpoint, LinkError> {
        let probe_error = match self.query.probe(chain).await {
            Ok(()) => return Ok(chain.clone()),
            Err(e) => e,
        };
        warn!("RPC endpoint {} failed its liveness probe: {}", chain, probe_error);

        let replacement = match self.resolver.resolve_alternate_endpoint(chain).await? {
            Some(url) => chain.with_rpc_url(url),
            None => return Err(probe_error),
        };
        self.query.probe(&replacement).await?;
        info!("Using alternate endpoint {}", replacement);
        Ok(replacement)
    }

    fn report_outcome(&self, tx_hash: &str, outcome: &TxOutcome, deadline: Duration) {
        match outcome {
            TxOutcome::Success { gas_wanted, gas_used } => {
                info!("Tx {} succeeded (gas wanted {}, used {})", tx_hash, gas_wanted, gas_used);
                self.progress.report(&format!(
                    "Transaction succeeded. Gas wanted: {}, Gas used: {}",
                    gas_wanted, gas_used
                ));
            }
            TxOutcome::Failure { code, log } => {
                error!("Tx {} failed with code {}: {}", tx_hash, code, log);
                self.progress.report(&format!("Transaction failed with code {}: {}", code, log));
            }
            TxOutcome::Timeout => {
                warn!("Tx {} not committed within {:?}", tx_hash, deadline);
                self.progress.report(&format!(
                    "Timed out after {} waiting for transaction {}",
                    humantime::format_duration(deadline),
                    tx_hash
                ));
            }
            TxOutcome::Cancelled => {
                info!("Watch of tx {} cancelled", tx_hash);
                self.progress.report("Cancelled");
            }
        }
    }
}
