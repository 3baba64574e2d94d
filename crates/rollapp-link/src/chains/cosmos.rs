// Cosmos SDK REST implementation of ChainQuery
//
// Talks to the chain's REST API for IBC and whitelist state and to the CometBFT RPC
// for liveness. No retries here: the caller owns retry policy.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use super::types::{ChannelsResponse, ConnectionResponse, WhitelistResponse};
use super::{ChainEndpoint, ChainQuery, ChannelRecord, ConnectionRecord};
use crate::error::LinkError;

/// Upper bound the Hub happily serves; IBC lists are small in practice
const PAGE_LIMIT: u32 = 100_000;

/// Module routes for the whitelisted-relayer queries. `{address}` is substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRoutes {
    pub hub_whitelist: String,
    pub rollapp_whitelist: String,
}

impl Default for QueryRoutes {
    fn default() -> Self {
        Self {
            hub_whitelist: "/dymensionxyz/dymension/sequencer/whitelisted_relayers/{address}".to_string(),
            rollapp_whitelist: "/rollapp/sequencers/whitelisted_relayers/{address}".to_string(),
        }
    }
}

/// REST-backed chain queries
pub struct CosmosQuery {
    client: Client,
    routes: QueryRoutes,
}

impl CosmosQuery {
    pub fn new(routes: QueryRoutes, request_timeout: Duration) -> Result<Self, LinkError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LinkError::InvalidInput(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { client, routes })
    }

    fn api_url(chain: &ChainEndpoint, path: &str) -> String {
        format!("{}{}", chain.api_url.trim_end_matches('/'), path)
    }

    /// GET a JSON document. `Ok(None)` on 404, errors for transport or decode failures.
    async fn get_json<T: DeserializeOwned>(
        &self,
        chain: &ChainEndpoint,
        url: &str,
    ) -> Result<Option<T>, LinkError> {
        debug!("Querying {}: {}", chain.chain_id, url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LinkError::unreachable(&chain.chain_id, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(LinkError::unreachable(
                &chain.chain_id,
                format!("GET {} returned {}", url, response.status()),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| LinkError::unreachable(&chain.chain_id, e))?;
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| LinkError::malformed(&chain.chain_id, format!("{}: {}", url, e)))
    }

    async fn query_whitelist(
        &self,
        chain: &ChainEndpoint,
        route: &str,
        address: &str,
    ) -> Result<Option<Vec<String>>, LinkError> {
        let url = Self::api_url(chain, &route.replace("{address}", address));
        let response: Option<WhitelistResponse> = self.get_json(chain, &url).await?;
        Ok(response.map(|r| r.relayers))
    }
}

#[async_trait]
impl ChainQuery for CosmosQuery {
    async fn query_channels(&self, chain: &ChainEndpoint) -> Result<Vec<ChannelRecord>, LinkError> {
        let url = Self::api_url(
            chain,
            &format!("/ibc/core/channel/v1/channels?pagination.limit={}", PAGE_LIMIT),
        );
        let response: Option<ChannelsResponse> = self.get_json(chain, &url).await?;
        Ok(response.map(|r| r.channels).unwrap_or_default())
    }

    async fn query_connection(
        &self,
        chain: &ChainEndpoint,
        connection_id: &str,
    ) -> Result<Option<ConnectionRecord>, LinkError> {
        let url = Self::api_url(chain, &format!("/ibc/core/connection/v1/connections/{}", connection_id));
        let response: Option<ConnectionResponse> = self.get_json(chain, &url).await?;

        Ok(response.and_then(|r| r.connection).map(|mut connection| {
            if connection.id.is_empty() {
                connection.id = connection_id.to_string();
            }
            connection
        }))
    }

    async fn query_hub_whitelist(
        &self,
        hub: &ChainEndpoint,
        sequencer_address: &str,
    ) -> Result<Vec<String>, LinkError> {
        // The Hub only knows whitelists of registered sequencers
        self.query_whitelist(hub, &self.routes.hub_whitelist, sequencer_address)
            .await?
            .ok_or_else(|| {
                LinkError::InvalidInput(format!(
                    "sequencer {} is not registered on {}",
                    sequencer_address, hub.chain_id
                ))
            })
    }

    async fn query_rollapp_whitelist(
        &self,
        rollapp: &ChainEndpoint,
        operator_address: &str,
    ) -> Result<Vec<String>, LinkError> {
        // Not mirrored yet
        Ok(self
            .query_whitelist(rollapp, &self.routes.rollapp_whitelist, operator_address)
            .await?
            .unwrap_or_default())
    }

    async fn probe(&self, chain: &ChainEndpoint) -> Result<(), LinkError> {
        let url = format!("{}/status", chain.rpc_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LinkError::unreachable(&chain.chain_id, e))?;

        if !response.status().is_success() {
            warn!("RPC status probe for {} returned {}", chain.chain_id, response.status());
            return Err(LinkError::unreachable(
                &chain.chain_id,
                format!("status probe returned {}", response.status()),
            ));
        }
        Ok(())
    }
}
