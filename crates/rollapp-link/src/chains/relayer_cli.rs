// ChainCommand implementation that drives the relayer binary (`rly`)

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use super::{ChainCommand, CommandOutput, HandshakeTarget};
use crate::error::LinkError;

/// Runs handshake transactions through the relayer binary against its own home
/// directory, where the path's chains and keys are configured.
pub struct RelayerCli {
    binary: PathBuf,
    home: PathBuf,
    channel_max_retries: u32,
}

impl RelayerCli {
    pub fn new(binary: impl Into<PathBuf>, home: impl Into<PathBuf>, channel_max_retries: u32) -> Self {
        Self {
            binary: binary.into(),
            home: home.into(),
            channel_max_retries,
        }
    }

    fn with_defaults(&self, mut args: Vec<String>, override_existing: bool) -> Vec<String> {
        if override_existing {
            args.push("--override".to_string());
        }
        args.push("--home".to_string());
        args.push(self.home.to_string_lossy().into_owned());
        args
    }

    pub(crate) fn create_clients_args(&self, path_name: &str, override_existing: bool) -> Vec<String> {
        self.with_defaults(vec!["tx".into(), "clients".into(), path_name.into()], override_existing)
    }

    pub(crate) fn update_clients_args(&self, path_name: &str) -> Vec<String> {
        self.with_defaults(vec!["tx".into(), "update-clients".into(), path_name.into()], false)
    }

    pub(crate) fn create_connection_args(
        &self,
        path_name: &str,
        timeout: Duration,
        override_existing: bool,
    ) -> Vec<String> {
        self.with_defaults(
            vec![
                "tx".into(),
                "connection".into(),
                path_name.into(),
                "-t".into(),
                format!("{}s", timeout.as_secs()),
                "-d".into(),
            ],
            override_existing,
        )
    }

    pub(crate) fn create_channel_args(
        &self,
        path_name: &str,
        timeout: Duration,
        override_existing: bool,
    ) -> Vec<String> {
        self.with_defaults(
            vec![
                "tx".into(),
                "channel".into(),
                path_name.into(),
                "-t".into(),
                format!("{}s", timeout.as_secs()),
                "-r".into(),
                self.channel_max_retries.to_string(),
                "-d".into(),
            ],
            override_existing,
        )
    }

    async fn run(&self, args: Vec<String>) -> Result<CommandOutput, LinkError> {
        let program = self.binary.to_string_lossy().into_owned();
        debug!("Running {} {}", program, args.join(" "));

        let output = Command::new(&self.binary)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| LinkError::Command {
                program: program.clone(),
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            let reason = if stderr.trim().is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr.trim().to_string()
            };
            return Err(LinkError::Command {
                program: format!("{} {}", program, args.join(" ")),
                reason,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

#[async_trait]
impl ChainCommand for RelayerCli {
    async fn create_clients(
        &self,
        target: &HandshakeTarget<'_>,
        override_existing: bool,
    ) -> Result<CommandOutput, LinkError> {
        info!(
            "Creating clients for {} ({} <-> {})",
            target.path_name, target.side_a.chain_id, target.side_b.chain_id
        );
        self.run(self.create_clients_args(target.path_name, override_existing)).await
    }

    async fn update_clients(&self, target: &HandshakeTarget<'_>) -> Result<CommandOutput, LinkError> {
        info!("Updating clients for {}", target.path_name);
        self.run(self.update_clients_args(target.path_name)).await
    }

    async fn create_connection(
        &self,
        target: &HandshakeTarget<'_>,
        timeout: Duration,
        override_existing: bool,
    ) -> Result<CommandOutput, LinkError> {
        info!("Creating connection for {}", target.path_name);
        self.run(self.create_connection_args(target.path_name, timeout, override_existing))
            .await
    }

    async fn create_channel(
        &self,
        target: &HandshakeTarget<'_>,
        timeout: Duration,
        override_existing: bool,
    ) -> Result<CommandOutput, LinkError> {
        info!("Creating channel for {}", target.path_name);
        self.run(self.create_channel_args(target.path_name, timeout, override_existing))
            .await
    }
}
