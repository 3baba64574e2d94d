// Error taxonomy shared by the chain adapters and the link components

use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;
use crate::config::store::StoreError;
use crate::relay::handshake::HandshakeStep;

/// Errors surfaced by link establishment, discovery, whitelisting and tx monitoring.
///
/// An absent link is not an error; discovery reports it as `Discovery::NotFound`.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("chain {chain_id} unreachable: {reason}")]
    Unreachable { chain_id: String, reason: String },

    #[error("malformed response from {chain_id}: {reason}")]
    Malformed { chain_id: String, reason: String },

    #[error("`{program}` failed: {reason}")]
    Command { program: String, reason: String },

    #[error("handshake step '{step}' failed: {source}")]
    HandshakeStep {
        step: HandshakeStep,
        #[source]
        source: Box<LinkError>,
    },

    #[error("handshake incomplete: {reason}")]
    Incomplete { reason: String },

    #[error("transaction {tx_hash} rejected with code {code}: {log}")]
    Rejected { tx_hash: String, code: u32, log: String },

    #[error("timed out after {} waiting for {what}", humantime::format_duration(*.after))]
    Timeout { what: String, after: Duration },

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("link store error: {0}")]
    Store(#[from] StoreError),
}

impl LinkError {
    pub fn unreachable(chain_id: impl Into<String>, reason: impl ToString) -> Self {
        LinkError::Unreachable {
            chain_id: chain_id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(chain_id: impl Into<String>, reason: impl ToString) -> Self {
        LinkError::Malformed {
            chain_id: chain_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the caller may reasonably retry the same call later.
    ///
    /// Network failures and deadlines are transient; a rejected transaction or a
    /// failed handshake command needs a human (or different input) first.
    pub fn is_retryable(&self) -> bool {
        match self {
            LinkError::Unreachable { .. } | LinkError::Timeout { .. } => true,
            LinkError::HandshakeStep { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}
