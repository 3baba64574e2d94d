// Event subscription seam for the transaction monitor, plus the CometBFT
// websocket implementation.

use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use tendermint::hash::{Algorithm, Hash};
use tendermint_rpc::query::{EventType, Query};
use tendermint_rpc::{Client, SubscriptionClient, Url, WebSocketClient};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::chains::ChainEndpoint;
use crate::error::LinkError;

/// Execution result of a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxResultEvent {
    pub tx_hash: String,
    pub height: u64,
    pub code: u32,
    pub log: String,
    pub gas_wanted: i64,
    pub gas_used: i64,
}

/// Opens subscriptions filtered by `tm.event='Tx' AND tx.hash='<hash>'`.
#[async_trait]
pub trait TxSubscriber: Send + Sync {
    async fn subscribe(&self, chain: &ChainEndpoint, tx_hash: &str) -> Result<Box<dyn TxSubscription>, LinkError>;
}

/// One open subscription. Must be released with [`TxSubscription::unsubscribe`].
#[async_trait]
pub trait TxSubscription: Send {
    /// Next matching result; `None` once the event stream has ended.
    async fn next_result(&mut self) -> Option<Result<TxResultEvent, LinkError>>;

    /// The indexed result if the tx is already committed, `None` while it is not.
    async fn lookup(&mut self) -> Result<Option<TxResultEvent>, LinkError>;

    async fn unsubscribe(self: Box<Self>) -> Result<(), LinkError>;
}

/// The subscription query for a single transaction hash.
pub fn tx_query(tx_hash: &str) -> Query {
    Query::from(EventType::Tx).and_eq("tx.hash", tx_hash.to_string())
}

/// How often, and how far apart, the indexed result is looked up once the
/// commit event arrived. The event bus can run ahead of the tx indexer.
const RESULT_LOOKUP_ATTEMPTS: u32 = 10;
const RESULT_LOOKUP_SPACING: Duration = Duration::from_millis(500);

/// Subscribes over the node's `/websocket` endpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct TendermintSubscriber;

#[async_trait]
impl TxSubscriber for TendermintSubscriber {
    async fn subscribe(&self, chain: &ChainEndpoint, tx_hash: &str) -> Result<Box<dyn TxSubscription>, LinkError> {
        let ws_url = chain.websocket_url();
        let url: Url = ws_url
            .parse()
            .map_err(|e| LinkError::InvalidInput(format!("bad websocket url {}: {}", ws_url, e)))?;

        let (client, driver) = WebSocketClient::new(url)
            .await
            .map_err(|e| LinkError::unreachable(&chain.chain_id, e))?;
        let driver_handle = tokio::spawn(async move {
            if let Err(e) = driver.run().await {
                warn!("Websocket driver stopped: {}", e);
            }
        });

        let query = tx_query(tx_hash);
        let subscription = match client.subscribe(query.clone()).await {
            Ok(subscription) => subscription,
            Err(e) => {
                let _ = client.close();
                let _ = driver_handle.await;
                return Err(LinkError::unreachable(&chain.chain_id, format!("subscribe failed: {}", e)));
            }
        };
        debug!("Subscribed to {} on {}", query, ws_url);

        Ok(Box::new(TendermintSubscription {
            chain_id: chain.chain_id.clone(),
            tx_hash: tx_hash.to_string(),
            client,
            query,
            subscription,
            driver_handle,
        }))
    }
}

struct TendermintSubscription {
    chain_id: String,
    tx_hash: String,
    client: WebSocketClient,
    query: Query,
    subscription: tendermint_rpc::Subscription,
    driver_handle: JoinHandle<()>,
}

impl TendermintSubscription {
    async fn fetch(&self) -> Result<Option<TxResultEvent>, LinkError> {
        let hash = Hash::from_hex_upper(Algorithm::Sha256, &self.tx_hash)
            .map_err(|e| LinkError::InvalidInput(format!("tx hash {}: {}", self.tx_hash, e)))?;

        match self.client.tx(hash, false).await {
            Ok(response) => Ok(Some(TxResultEvent {
                tx_hash: self.tx_hash.clone(),
                height: response.height.value(),
                code: response.tx_result.code.value(),
                log: response.tx_result.log,
                gas_wanted: response.tx_result.gas_wanted,
                gas_used: response.tx_result.gas_used,
            })),
            // CometBFT answers "tx (<hash>) not found" until the indexer has the tx
            Err(e) if e.to_string().contains("not found") => Ok(None),
            Err(e) => Err(LinkError::unreachable(&self.chain_id, e)),
        }
    }

    async fn lookup_result(&self) -> Result<TxResultEvent, LinkError> {
        let mut last_error = String::from("not indexed");
        for attempt in 1..=RESULT_LOOKUP_ATTEMPTS {
            match self.fetch().await {
                Ok(Some(event)) => return Ok(event),
                Ok(None) => debug!("Result of {} not indexed yet (attempt {})", self.tx_hash, attempt),
                Err(e) => {
                    debug!("Looking up {} failed (attempt {}): {}", self.tx_hash, attempt, e);
                    last_error = e.to_string();
                }
            }
            tokio::time::sleep(RESULT_LOOKUP_SPACING).await;
        }
        Err(LinkError::unreachable(
            &self.chain_id,
            format!("committed tx {} could not be looked up: {}", self.tx_hash, last_error),
        ))
    }
}

#[async_trait]
impl TxSubscription for TendermintSubscription {
    async fn next_result(&mut self) -> Option<Result<TxResultEvent, LinkError>> {
        match self.subscription.next().await? {
            Ok(_event) => Some(self.lookup_result().await),
            Err(e) => Some(Err(LinkError::unreachable(&self.chain_id, e))),
        }
    }

    async fn lookup(&mut self) -> Result<Option<TxResultEvent>, LinkError> {
        self.fetch().await
    }

    async fn unsubscribe(self: Box<Self>) -> Result<(), LinkError> {
        let this = *self;
        let result = this
            .client
            .unsubscribe(this.query.clone())
            .await
            .map_err(|e| LinkError::unreachable(&this.chain_id, e));

        drop(this.subscription);
        if let Err(e) = this.client.close() {
            debug!("Closing websocket client: {}", e);
        }
        let _ = this.driver_handle.await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_query() {
        let rendered = tx_query("ABCDEF").to_string();
        assert!(rendered.contains("tm.event"));
        assert!(rendered.contains("'Tx'"));
        assert!(rendered.contains("tx.hash"));
        assert!(rendered.contains("'ABCDEF'"));
    }
}
