// Discovery of an already-open link between two chains
//
// Re-derives a LinkPath from chain state alone, for handshakes performed
// out-of-band or local state that was lost. Query failures are returned as-is;
// retry policy belongs to the caller.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chains::{ChainEndpoint, ChainQuery, IbcState};
use crate::error::LinkError;
use crate::metrics::OrchestratorMetrics;
use crate::relay::path::{ChannelState, LinkPath, PathEnd};

/// Why no usable link was found. Every variant means "not ready yet", not failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFoundReason {
    /// Side A has no channel in `STATE_OPEN`
    NoOpenChannel,
    /// The open channel's connection hop is unknown to side A
    ConnectionMissing { connection_id: String },
    /// Side A's connection names no counterparty, or side B does not know it
    CounterpartyMissing { connection_id: String },
    /// Side B's connection exists but the handshake has not finished there
    CounterpartyNotOpen { connection_id: String, state: IbcState },
    /// The open channel does not name its counterparty channel yet
    CounterpartyChannelUnset,
}

impl fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundReason::NoOpenChannel => write!(f, "no open channel"),
            NotFoundReason::ConnectionMissing { connection_id } => {
                write!(f, "connection {} not found", connection_id)
            }
            NotFoundReason::CounterpartyMissing { connection_id } if connection_id.is_empty() => {
                write!(f, "connection has no counterparty")
            }
            NotFoundReason::CounterpartyMissing { connection_id } => {
                write!(f, "counterparty connection {} not found", connection_id)
            }
            NotFoundReason::CounterpartyNotOpen { connection_id, state } => {
                write!(f, "counterparty connection {} is {}", connection_id, state)
            }
            NotFoundReason::CounterpartyChannelUnset => write!(f, "counterparty channel not set"),
        }
    }
}

/// Result of a discovery that reached both chains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    Found(LinkPath),
    NotFound(NotFoundReason),
}

impl Discovery {
    pub fn is_found(&self) -> bool {
        matches!(self, Discovery::Found(_))
    }

    pub fn into_found(self) -> Option<LinkPath> {
        match self {
            Discovery::Found(path) => Some(path),
            Discovery::NotFound(_) => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Discovery::Found(_) => "found",
            Discovery::NotFound(_) => "not_found",
        }
    }
}

pub struct LinkDiscovery {
    query: Arc<dyn ChainQuery>,
    metrics: Option<Arc<OrchestratorMetrics>>,
}

impl LinkDiscovery {
    pub fn new(query: Arc<dyn ChainQuery>) -> Self {
        Self { query, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<OrchestratorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Find an open channel on side A whose connection is open on side B.
    pub async fn discover_open_link(
        &self,
        side_a: &ChainEndpoint,
        side_b: &ChainEndpoint,
    ) -> Result<Discovery, LinkError> {
        let result = self.discover(side_a, side_b).await;

        if let Some(metrics) = &self.metrics {
            metrics.record_discovery(match &result {
                Ok(discovery) => discovery.label(),
                Err(_) => "error",
            });
        }

        match &result {
            Ok(Discovery::Found(path)) => info!(
                "Found open link {} {} <-> {} {}",
                side_a.chain_id, path.side_a.channel_id, path.side_b.channel_id, side_b.chain_id
            ),
            Ok(Discovery::NotFound(reason)) => {
                info!("No open link between {} and {}: {}", side_a.chain_id, side_b.chain_id, reason)
            }
            Err(e) => warn!("Link discovery between {} and {} failed: {}", side_a.chain_id, side_b.chain_id, e),
        }
        result
    }

    async fn discover(&self, side_a: &ChainEndpoint, side_b: &ChainEndpoint) -> Result<Discovery, LinkError> {
        let channels = self.query.query_channels(side_a).await?;
        let mut open = channels.iter().filter(|channel| channel.state.is_open());

        let channel = match open.next() {
            Some(channel) => channel,
            None => return Ok(Discovery::NotFound(NotFoundReason::NoOpenChannel)),
        };
        let others = open.count();
        if others > 0 {
            // First match in query order wins; there is no evidence for a better tie-break
            warn!(
                "{} has {} open channels; using {} (first returned)",
                side_a.chain_id,
                others + 1,
                channel.channel_id
            );
        }

        let connection_id = channel.connection_hops.first().ok_or_else(|| {
            LinkError::malformed(
                &side_a.chain_id,
                format!("channel {} has no connection hops", channel.channel_id),
            )
        })?;
        debug!("Open channel {} uses {}", channel.channel_id, connection_id);

        let connection_a = match self.query.query_connection(side_a, connection_id).await? {
            Some(connection) => connection,
            None => {
                return Ok(Discovery::NotFound(NotFoundReason::ConnectionMissing {
                    connection_id: connection_id.clone(),
                }))
            }
        };

        let counterparty_id = connection_a.counterparty.connection_id.clone();
        if counterparty_id.is_empty() {
            return Ok(Discovery::NotFound(NotFoundReason::CounterpartyMissing {
                connection_id: String::new(),
            }));
        }

        let connection_b = match self.query.query_connection(side_b, &counterparty_id).await? {
            Some(connection) => connection,
            None => {
                return Ok(Discovery::NotFound(NotFoundReason::CounterpartyMissing {
                    connection_id: counterparty_id,
                }))
            }
        };
        if !connection_b.state.is_open() {
            return Ok(Discovery::NotFound(NotFoundReason::CounterpartyNotOpen {
                connection_id: counterparty_id,
                state: connection_b.state,
            }));
        }

        if channel.counterparty.channel_id.is_empty() {
            return Ok(Discovery::NotFound(NotFoundReason::CounterpartyChannelUnset));
        }

        Ok(Discovery::Found(LinkPath {
            state: ChannelState::Open,
            side_a: PathEnd {
                chain_id: side_a.chain_id.clone(),
                client_id: connection_a.client_id,
                connection_id: connection_id.clone(),
                channel_id: channel.channel_id.clone(),
                port_id: channel.port_id.clone(),
            },
            side_b: PathEnd {
                chain_id: side_b.chain_id.clone(),
                client_id: connection_b.client_id,
                connection_id: counterparty_id,
                channel_id: channel.counterparty.channel_id.clone(),
                port_id: channel.counterparty.port_id.clone(),
            },
        }))
    }
}
