// IBC connection/channel records as returned by the Cosmos SDK REST API

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handshake state of a connection or channel end.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IbcState {
    Uninitialized,
    Init,
    TryOpen,
    Open,
    Closed,
    /// Any state string this crate does not know about (e.g. flush states)
    Other(String),
}

impl IbcState {
    pub fn is_open(&self) -> bool {
        matches!(self, IbcState::Open)
    }

    pub fn as_str(&self) -> &str {
        match self {
            IbcState::Uninitialized => "STATE_UNINITIALIZED_UNSPECIFIED",
            IbcState::Init => "STATE_INIT",
            IbcState::TryOpen => "STATE_TRYOPEN",
            IbcState::Open => "STATE_OPEN",
            IbcState::Closed => "STATE_CLOSED",
            IbcState::Other(s) => s,
        }
    }
}

impl From<String> for IbcState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "STATE_UNINITIALIZED_UNSPECIFIED" => IbcState::Uninitialized,
            "STATE_INIT" => IbcState::Init,
            "STATE_TRYOPEN" => IbcState::TryOpen,
            "STATE_OPEN" => IbcState::Open,
            "STATE_CLOSED" => IbcState::Closed,
            _ => IbcState::Other(s),
        }
    }
}

impl From<IbcState> for String {
    fn from(state: IbcState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for IbcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counterparty end of a connection or channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparty {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub connection_id: String,
    #[serde(default)]
    pub port_id: String,
    #[serde(default)]
    pub channel_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionVersion {
    pub identifier: String,
    #[serde(default)]
    pub features: Vec<String>,
}

/// A connection end, queried ephemerally and used to update a `LinkPath`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Absent from single-connection responses; filled in from the request
    #[serde(default)]
    pub id: String,
    pub client_id: String,
    pub state: IbcState,
    pub counterparty: Counterparty,
    #[serde(default)]
    pub versions: Vec<ConnectionVersion>,
    #[serde(default)]
    pub delay_period: String,
}

/// A channel end, queried ephemerally and used to update a `LinkPath`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub channel_id: String,
    pub port_id: String,
    pub state: IbcState,
    #[serde(default)]
    pub ordering: String,
    pub counterparty: Counterparty,
    #[serde(default)]
    pub connection_hops: Vec<String>,
    #[serde(default)]
    pub version: String,
}

/// `GET /ibc/core/channel/v1/channels`
#[derive(Debug, Deserialize)]
pub(crate) struct ChannelsResponse {
    #[serde(default)]
    pub channels: Vec<ChannelRecord>,
}

/// `GET /ibc/core/connection/v1/connections/{id}`
#[derive(Debug, Deserialize)]
pub(crate) struct ConnectionResponse {
    pub connection: Option<ConnectionRecord>,
}

/// Whitelisted relayer queries on both the Hub and the RollApp
#[derive(Debug, Deserialize)]
pub(crate) struct WhitelistResponse {
    #[serde(default)]
    pub relayers: Vec<String>,
}
