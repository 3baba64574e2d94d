// Link establishment: the client -> connection -> channel handshake
//
// Four strictly ordered, fail-fast steps driven through ChainCommand. Command
// output is not inspected beyond success/failure and no compensation is attempted
// on failure; discovery recovers whatever state the chains ended up in.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::chains::{ChainCommand, ChainEndpoint, ChainQuery, CommandOutput, HandshakeTarget};
use crate::config::store::LinkStateStore;
use crate::error::LinkError;
use crate::metrics::OrchestratorMetrics;
use crate::progress::{NoProgress, ProgressSink};
use crate::relay::discovery::{Discovery, LinkDiscovery};
use crate::relay::path::LinkPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeStep {
    CreateClients,
    UpdateClients,
    CreateConnection,
    CreateChannel,
}

impl HandshakeStep {
    pub const ALL: [HandshakeStep; 4] = [
        HandshakeStep::CreateClients,
        HandshakeStep::UpdateClients,
        HandshakeStep::CreateConnection,
        HandshakeStep::CreateChannel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HandshakeStep::CreateClients => "create-clients",
            HandshakeStep::UpdateClients => "update-clients",
            HandshakeStep::CreateConnection => "create-connection",
            HandshakeStep::CreateChannel => "create-channel",
        }
    }

    fn progress_message(&self) -> &'static str {
        match self {
            HandshakeStep::CreateClients => "Creating clients...",
            HandshakeStep::UpdateClients => "Updating clients...",
            HandshakeStep::CreateConnection => "Creating connection...",
            HandshakeStep::CreateChannel => "Creating channel...",
        }
    }
}

impl fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HandshakeOptions {
    /// Pass `--override` so unusable existing clients/connections/channels are replaced
    pub override_existing: bool,
    pub connection_timeout: Duration,
    pub channel_timeout: Duration,
}

impl Default for HandshakeOptions {
    fn default() -> Self {
        Self {
            override_existing: false,
            connection_timeout: Duration::from_secs(300),
            channel_timeout: Duration::from_secs(300),
        }
    }
}

/// Runs the handshake for a path and records the resulting identifiers.
pub struct LinkEstablisher {
    command: Arc<dyn ChainCommand>,
    discovery: LinkDiscovery,
    store: Option<Arc<dyn LinkStateStore>>,
    progress: Arc<dyn ProgressSink>,
    metrics: Option<Arc<OrchestratorMetrics>>,
    options: HandshakeOptions,
}

impl LinkEstablisher {
    pub fn new(command: Arc<dyn ChainCommand>, query: Arc<dyn ChainQuery>) -> Self {
        Self {
            command,
            discovery: LinkDiscovery::new(query),
            store: None,
            progress: Arc::new(NoProgress),
            metrics: None,
            options: HandshakeOptions::default(),
        }
    }

    pub fn with_options(mut self, options: HandshakeOptions) -> Self {
        self.options = options;
        self
    }

    /// Persist the established path under its name once all steps succeed.
    pub fn with_store(mut self, store: Arc<dyn LinkStateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<OrchestratorMetrics>) -> Self {
        self.discovery = self.discovery.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    pub fn options(&self) -> &HandshakeOptions {
        &self.options
    }

    /// Create clients, update them, then open a connection and a channel.
    ///
    /// The first failing step aborts the call with [`LinkError::HandshakeStep`]. After
    /// the last step the resulting channel identifiers are read back from the chains;
    /// if no open channel is observable the call fails with [`LinkError::Incomplete`].
    pub async fn establish_link(
        &self,
        path_name: &str,
        side_a: &ChainEndpoint,
        side_b: &ChainEndpoint,
    ) -> Result<LinkPath, LinkError> {
        let target = HandshakeTarget {
            path_name,
            side_a,
            side_b,
        };
        let options = &self.options;
        info!(
            "Establishing link {} between {} and {}",
            path_name, side_a.chain_id, side_b.chain_id
        );

        self.run_step(
            HandshakeStep::CreateClients,
            self.command.create_clients(&target, options.override_existing),
        )
        .await?;
        self.run_step(HandshakeStep::UpdateClients, self.command.update_clients(&target))
            .await?;
        self.run_step(
            HandshakeStep::CreateConnection,
            self.command
                .create_connection(&target, options.connection_timeout, options.override_existing),
        )
        .await?;
        self.run_step(
            HandshakeStep::CreateChannel,
            self.command
                .create_channel(&target, options.channel_timeout, options.override_existing),
        )
        .await?;

        let path = match self.discovery.discover_open_link(side_a, side_b).await? {
            Discovery::Found(path) => path,
            Discovery::NotFound(reason) => {
                return Err(LinkError::Incomplete {
                    reason: format!("handshake for {} finished but {}", path_name, reason),
                })
            }
        };

        if let Some(store) = &self.store {
            store.put_link_path(path_name, &path).await?;
        }

        self.progress.report(&path.status_line());
        info!(
            "Link {} established: {} {} <-> {} {}",
            path_name, side_a.chain_id, path.side_a.channel_id, path.side_b.channel_id, side_b.chain_id
        );
        Ok(path)
    }

    async fn run_step<F>(&self, step: HandshakeStep, command: F) -> Result<(), LinkError>
    where
        F: Future<Output = Result<CommandOutput, LinkError>>,
    {
        self.progress.report(step.progress_message());
        info!("Handshake step {}", step);

        let result = command.await;
        if let Some(metrics) = &self.metrics {
            metrics.record_handshake_step(step.as_str(), result.is_ok());
        }

        match result {
            Ok(output) => {
                debug!("{} output: {}", step, output.stdout.trim());
                Ok(())
            }
            Err(e) => {
                error!("Handshake step {} failed: {}", step, e);
                Err(LinkError::HandshakeStep {
                    step,
                    source: Box::new(e),
                })
            }
        }
    }
}
