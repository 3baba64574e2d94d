// RollApp link orchestration library
// Establishes, discovers and authorizes relay paths between a RollApp and its Hub,
// and watches the transactions that change them.

pub mod chains;
pub mod config;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod orchestrator;
pub mod progress;
pub mod relay;
pub mod utils;

// Re-export commonly used types for convenience
pub use chains::{ChainCommand, ChainEndpoint, ChainQuery, TxBroadcaster, UnsignedTx};
pub use config::store::{LinkStateStore, MemoryLinkStore, TomlLinkStore};
pub use config::{ConfigError, OrchestratorConfig};
pub use error::LinkError;
pub use metrics::OrchestratorMetrics;
pub use monitor::{EndpointResolver, TxMonitor, TxOutcome};
pub use orchestrator::{Collaborators, Orchestrator};
pub use progress::ProgressSink;
pub use relay::{
    Discovery, LinkDiscovery, LinkEstablisher, LinkPath, NotFoundReason, WhitelistRequest, WhitelistSynchronizer,
};
