// TxBroadcaster backed by the chain daemon's CLI and its local keyring

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info};

use super::{ChainEndpoint, TxBroadcaster, UnsignedTx};
use crate::error::LinkError;

/// Broadcast response printed by `<daemon> tx ... -o json`
#[derive(Debug, Deserialize)]
struct BroadcastResponse {
    txhash: String,
    #[serde(default)]
    code: u32,
    #[serde(default)]
    raw_log: String,
}

/// Signs with a key from the daemon's keyring and broadcasts in sync mode.
pub struct KeyringBroadcaster {
    binary: PathBuf,
    home: PathBuf,
    key_name: String,
    keyring_backend: String,
    gas_adjustment: f64,
}

impl KeyringBroadcaster {
    pub fn new(
        binary: impl Into<PathBuf>,
        home: impl Into<PathBuf>,
        key_name: impl Into<String>,
        keyring_backend: impl Into<String>,
        gas_adjustment: f64,
    ) -> Self {
        Self {
            binary: binary.into(),
            home: home.into(),
            key_name: key_name.into(),
            keyring_backend: keyring_backend.into(),
            gas_adjustment,
        }
    }

    pub(crate) fn key_args(&self) -> Vec<String> {
        vec![
            "keys".to_string(),
            "show".to_string(),
            self.key_name.clone(),
            "-a".to_string(),
            "--keyring-backend".to_string(),
            self.keyring_backend.clone(),
            "--home".to_string(),
            self.home.to_string_lossy().into_owned(),
        ]
    }

    /// Run the daemon binary and return its stdout; a non-zero exit becomes `Command`.
    async fn run(&self, args: &[String]) -> Result<String, LinkError> {
        let program = self.binary.to_string_lossy().into_owned();
        debug!("Running {} {}", program, args.join(" "));

        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| LinkError::Command {
                program: program.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LinkError::Command {
                program,
                reason: if stderr.trim().is_empty() {
                    format!("exited with {}", output.status)
                } else {
                    stderr.trim().to_string()
                },
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub(crate) fn tx_args(&self, chain: &ChainEndpoint, tx: &UnsignedTx) -> Vec<String> {
        let mut args: Vec<String> = match tx {
            UnsignedTx::UpdateWhitelistedRelayers { relayers, .. } => vec![
                "tx".into(),
                "sequencer".into(),
                "update-whitelisted-relayers".into(),
                relayers.join(","),
            ],
        };

        args.extend([
            "--from".to_string(),
            self.key_name.clone(),
            "--keyring-backend".to_string(),
            self.keyring_backend.clone(),
            "--home".to_string(),
            self.home.to_string_lossy().into_owned(),
            "--node".to_string(),
            chain.rpc_url.clone(),
            "--chain-id".to_string(),
            chain.chain_id.clone(),
            "--gas".to_string(),
            "auto".to_string(),
            "--gas-adjustment".to_string(),
            self.gas_adjustment.to_string(),
            "--gas-prices".to_string(),
            chain.gas_price.clone(),
            "--broadcast-mode".to_string(),
            "sync".to_string(),
            "-o".to_string(),
            "json".to_string(),
            "-y".to_string(),
        ]);
        args
    }
}

/// Extract the hash from the broadcast output. A non-zero code means the node refused
/// the transaction at CheckTx, before it ever reached a block.
pub(crate) fn parse_broadcast_output(chain_id: &str, stdout: &str) -> Result<String, LinkError> {
    // Some daemons print "gas estimate: N" to stdout ahead of the JSON document
    let json_start = stdout
        .find('{')
        .ok_or_else(|| LinkError::malformed(chain_id, "broadcast output carries no JSON"))?;
    let response: BroadcastResponse = serde_json::from_str(stdout[json_start..].trim())
        .map_err(|e| LinkError::malformed(chain_id, format!("broadcast output: {}", e)))?;

    if response.code != 0 {
        return Err(LinkError::Rejected {
            tx_hash: response.txhash,
            code: response.code,
            log: response.raw_log,
        });
    }
    if response.txhash.is_empty() {
        return Err(LinkError::malformed(chain_id, "broadcast output has an empty txhash"));
    }
    Ok(response.txhash)
}

/// The whitelist belongs to the sequencer; any other signer would be refused on chain.
pub(crate) fn check_signer(key_name: &str, shown: &str, sequencer_address: &str) -> Result<(), LinkError> {
    let signer = shown.trim();
    if signer != sequencer_address {
        return Err(LinkError::InvalidInput(format!(
            "key '{}' signs as {}, but the whitelist belongs to sequencer {}",
            key_name, signer, sequencer_address
        )));
    }
    Ok(())
}

#[async_trait]
impl TxBroadcaster for KeyringBroadcaster {
    async fn sign_and_broadcast(&self, chain: &ChainEndpoint, tx: UnsignedTx) -> Result<String, LinkError> {
        match &tx {
            UnsignedTx::UpdateWhitelistedRelayers { sequencer_address, .. } => {
                let shown = self.run(&self.key_args()).await?;
                check_signer(&self.key_name, &shown, sequencer_address)?;
            }
        }

        let stdout = self.run(&self.tx_args(chain, &tx)).await?;
        let tx_hash = parse_broadcast_output(&chain.chain_id, &stdout)?;
        info!("Broadcast accepted by {}: {}", chain.chain_id, tx_hash);
        Ok(tx_hash)
    }
}
