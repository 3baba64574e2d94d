// Chain-facing types: endpoints, queried IBC records, and the query/command seams

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::LinkError;

pub mod broadcast;
pub mod cosmos;
pub mod relayer_cli;
pub mod types;

pub use broadcast::KeyringBroadcaster;
pub use cosmos::CosmosQuery;
pub use relayer_cli::RelayerCli;
pub use types::{ChannelRecord, ConnectionRecord, Counterparty, IbcState};

/// Immutable descriptor of a chain reachable for queries and commands.
///
/// Built once from configuration and shared read-only; switching to another RPC
/// node produces a new value (see [`ChainEndpoint::with_rpc_url`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEndpoint {
    pub chain_id: String,
    /// CometBFT RPC (status, websocket events)
    pub rpc_url: String,
    /// Cosmos SDK REST API (IBC and module queries)
    pub api_url: String,
    /// Explicit websocket URL; derived from `rpc_url` when absent
    pub ws_url: Option<String>,
    pub denom: String,
    pub address_prefix: String,
    pub gas_price: String,
}

impl ChainEndpoint {
    /// Copy of this endpoint pointing at a different RPC node.
    pub fn with_rpc_url(&self, rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            ws_url: None,
            ..self.clone()
        }
    }

    /// Websocket URL for event subscriptions.
    pub fn websocket_url(&self) -> String {
        if let Some(ws) = &self.ws_url {
            return ws.clone();
        }
        let base = self.rpc_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        if base.ends_with("/websocket") {
            base
        } else {
            format!("{}/websocket", base)
        }
    }
}

impl fmt::Display for ChainEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.chain_id, self.rpc_url)
    }
}

/// Read-only queries against a chain.
///
/// Implementations are stateless with respect to the endpoint: every call names the
/// chain it talks to, so one instance can serve both sides of a link concurrently.
#[async_trait]
pub trait ChainQuery: Send + Sync {
    /// All channels known to the chain, in the order the chain returns them.
    async fn query_channels(&self, chain: &ChainEndpoint) -> Result<Vec<ChannelRecord>, LinkError>;

    /// A single connection, `None` when the chain does not know the identifier.
    async fn query_connection(
        &self,
        chain: &ChainEndpoint,
        connection_id: &str,
    ) -> Result<Option<ConnectionRecord>, LinkError>;

    /// Relayers the sequencer has whitelisted on the Hub.
    async fn query_hub_whitelist(
        &self,
        hub: &ChainEndpoint,
        sequencer_address: &str,
    ) -> Result<Vec<String>, LinkError>;

    /// Relayers mirrored on the RollApp for the sequencer's operator address.
    async fn query_rollapp_whitelist(
        &self,
        rollapp: &ChainEndpoint,
        operator_address: &str,
    ) -> Result<Vec<String>, LinkError>;

    /// Liveness probe of the chain's RPC node.
    async fn probe(&self, chain: &ChainEndpoint) -> Result<(), LinkError>;
}

/// The two chains a handshake runs between, plus the relayer's path name.
#[derive(Debug, Clone)]
pub struct HandshakeTarget<'a> {
    pub path_name: &'a str,
    pub side_a: &'a ChainEndpoint,
    pub side_b: &'a ChainEndpoint,
}

/// Output of a state-changing command. Only success/failure is acted upon.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// State-changing operations on chains.
#[async_trait]
pub trait ChainCommand: Send + Sync {
    async fn create_clients(
        &self,
        target: &HandshakeTarget<'_>,
        override_existing: bool,
    ) -> Result<CommandOutput, LinkError>;

    async fn update_clients(&self, target: &HandshakeTarget<'_>) -> Result<CommandOutput, LinkError>;

    async fn create_connection(
        &self,
        target: &HandshakeTarget<'_>,
        timeout: Duration,
        override_existing: bool,
    ) -> Result<CommandOutput, LinkError>;

    async fn create_channel(
        &self,
        target: &HandshakeTarget<'_>,
        timeout: Duration,
        override_existing: bool,
    ) -> Result<CommandOutput, LinkError>;
}

/// Unsigned transaction handed to the local keystore for signing and broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsignedTx {
    /// Replace the sequencer's whitelisted relayer set on the Hub.
    UpdateWhitelistedRelayers {
        sequencer_address: String,
        relayers: Vec<String>,
    },
}

/// Sign & broadcast through the local keystore. Returns the transaction hash once the
/// node accepted it into the mempool; commitment is a separate question.
#[async_trait]
pub trait TxBroadcaster: Send + Sync {
    async fn sign_and_broadcast(&self, chain: &ChainEndpoint, tx: UnsignedTx) -> Result<String, LinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(rpc: &str) -> ChainEndpoint {
        ChainEndpoint {
            chain_id: "dymension_1100-1".to_string(),
            rpc_url: rpc.to_string(),
            api_url: "http://localhost:1317".to_string(),
            ws_url: None,
            denom: "adym".to_string(),
            address_prefix: "dym".to_string(),
            gas_price: "20000000000adym".to_string(),
        }
    }

    #[test]
    fn test_websocket_url_derivation() {
        assert_eq!(endpoint("http://localhost:26657").websocket_url(), "ws://localhost:26657/websocket");
        assert_eq!(endpoint("https://rpc.hub.io/").websocket_url(), "wss://rpc.hub.io/websocket");
        assert_eq!(endpoint("ws://node:26657/websocket").websocket_url(), "ws://node:26657/websocket");

        let mut explicit = endpoint("http://localhost:26657");
        explicit.ws_url = Some("wss://events.hub.io/websocket".to_string());
        assert_eq!(explicit.websocket_url(), "wss://events.hub.io/websocket");
    }

    #[test]
    fn test_with_rpc_url_keeps_identity() {
        let mut original = endpoint("http://dead:26657");
        original.ws_url = Some("ws://dead:26657/websocket".to_string());
        let replaced = original.with_rpc_url("http://alive:26657");

        assert_eq!(replaced.chain_id, original.chain_id);
        assert_eq!(replaced.rpc_url, "http://alive:26657");
        assert_eq!(replaced.websocket_url(), "ws://alive:26657/websocket");
        assert_eq!(original.rpc_url, "http://dead:26657");
    }
}
