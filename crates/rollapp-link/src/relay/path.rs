// LinkPath: persisted identifiers of one named relay path between two chains

use serde::{Deserialize, Serialize};
use std::fmt;

/// Last observed state of the path's channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    #[default]
    Unknown,
    Open,
    Closed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelState::Unknown => write!(f, "unknown"),
            ChannelState::Open => write!(f, "open"),
            ChannelState::Closed => write!(f, "closed"),
        }
    }
}

/// Identifiers held by one side of a path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathEnd {
    pub chain_id: String,
    pub client_id: String,
    pub connection_id: String,
    pub channel_id: String,
    pub port_id: String,
}

impl PathEnd {
    pub fn new(chain_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            ..Default::default()
        }
    }
}

/// One named relay path between exactly two chains.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPath {
    #[serde(default)]
    pub state: ChannelState,
    pub side_a: PathEnd,
    pub side_b: PathEnd,
}

impl LinkPath {
    /// A freshly configured path: chain ids only, nothing observed yet.
    pub fn new(chain_a: impl Into<String>, chain_b: impl Into<String>) -> Self {
        Self {
            side_a: PathEnd::new(chain_a),
            side_b: PathEnd::new(chain_b),
            state: ChannelState::Unknown,
        }
    }

    /// Both channel identifiers are known and the channel was last seen open.
    pub fn is_ready(&self) -> bool {
        !self.side_a.channel_id.is_empty()
            && !self.side_b.channel_id.is_empty()
            && self.state == ChannelState::Open
    }

    /// Operator-facing status line.
    pub fn status_line(&self) -> String {
        if self.is_ready() {
            format!("Active {} <-> {}", self.side_a.channel_id, self.side_b.channel_id)
        } else {
            "Starting...".to_string()
        }
    }
}
