// Shared test doubles for the link components
#![allow(dead_code)]

use async_trait::async_trait;
use bech32::ToBase32;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use rollapp_link::chains::types::ConnectionVersion;
use rollapp_link::chains::{
    ChainCommand, ChainEndpoint, ChainQuery, ChannelRecord, CommandOutput, ConnectionRecord, Counterparty,
    HandshakeTarget, IbcState, TxBroadcaster, UnsignedTx,
};
use rollapp_link::monitor::{EndpointResolver, TxResultEvent, TxSubscriber, TxSubscription};
use rollapp_link::progress::ProgressSink;
use rollapp_link::LinkError;

pub const ROLLAPP_ID: &str = "rollapp_1234-1";
pub const HUB_ID: &str = "dymension_1100-1";
pub const TX_HASH: &str = "6D0E3F1B2A9C8D7E6F5A4B3C2D1E0F9A8B7C6D5E4F3A2B1C0D9E8F7A6B5C4D3E";

pub fn rollapp() -> ChainEndpoint {
    ChainEndpoint {
        chain_id: ROLLAPP_ID.to_string(),
        rpc_url: "http://rollapp:26657".to_string(),
        api_url: "http://rollapp:1317".to_string(),
        ws_url: None,
        denom: "urax".to_string(),
        address_prefix: "ethm".to_string(),
        gas_price: "2000000000urax".to_string(),
    }
}

pub fn hub() -> ChainEndpoint {
    ChainEndpoint {
        chain_id: HUB_ID.to_string(),
        rpc_url: "http://hub:36657".to_string(),
        api_url: "http://hub:1318".to_string(),
        ws_url: None,
        denom: "adym".to_string(),
        address_prefix: "dym".to_string(),
        gas_price: "20000000000adym".to_string(),
    }
}

pub fn dym_address(seed: u8) -> String {
    bech32::encode("dym", [seed; 20].to_base32(), bech32::Variant::Bech32).unwrap()
}

pub fn channel(id: &str, state: IbcState, connection: &str, counterparty_channel: &str) -> ChannelRecord {
    ChannelRecord {
        channel_id: id.to_string(),
        port_id: "transfer".to_string(),
        state,
        ordering: "ORDER_UNORDERED".to_string(),
        counterparty: Counterparty {
            port_id: "transfer".to_string(),
            channel_id: counterparty_channel.to_string(),
            ..Default::default()
        },
        connection_hops: vec![connection.to_string()],
        version: "ics20-1".to_string(),
    }
}

pub fn connection(id: &str, client: &str, state: IbcState, counterparty_connection: &str) -> ConnectionRecord {
    ConnectionRecord {
        id: id.to_string(),
        client_id: client.to_string(),
        state,
        counterparty: Counterparty {
            client_id: "07-tendermint-9".to_string(),
            connection_id: counterparty_connection.to_string(),
            ..Default::default()
        },
        versions: vec![ConnectionVersion {
            identifier: "1".to_string(),
            features: vec!["ORDER_UNORDERED".to_string()],
        }],
        delay_period: "0".to_string(),
    }
}

/// Scriptable chain state for both sides of a link.
#[derive(Default)]
pub struct MockChain {
    channels: Mutex<HashMap<String, Vec<ChannelRecord>>>,
    connections: Mutex<HashMap<(String, String), ConnectionRecord>>,
    unreachable: Mutex<HashSet<String>>,
    dead_rpcs: Mutex<HashSet<String>>,
    hub_whitelist: Mutex<Vec<String>>,
    rollapp_script: Mutex<VecDeque<Vec<String>>>,
    rollapp_fallback: Mutex<Vec<String>>,
    rollapp_polls: Mutex<Vec<Instant>>,
    pub channel_queries: AtomicUsize,
    pub probes: Mutex<Vec<String>>,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_channel(&self, chain_id: &str, record: ChannelRecord) {
        self.channels
            .lock()
            .unwrap()
            .entry(chain_id.to_string())
            .or_default()
            .push(record);
    }

    pub fn add_connection(&self, chain_id: &str, record: ConnectionRecord) {
        self.connections
            .lock()
            .unwrap()
            .insert((chain_id.to_string(), record.id.clone()), record);
    }

    /// RollApp channel-0 over connection-7, Hub side connection-0 and channel-3, all open.
    pub fn install_open_link(&self) {
        self.add_channel(ROLLAPP_ID, channel("channel-0", IbcState::Open, "connection-7", "channel-3"));
        self.add_connection(
            ROLLAPP_ID,
            connection("connection-7", "07-tendermint-0", IbcState::Open, "connection-0"),
        );
        self.add_connection(
            HUB_ID,
            connection("connection-0", "07-tendermint-5", IbcState::Open, "connection-7"),
        );
    }

    pub fn set_unreachable(&self, chain_id: &str) {
        self.unreachable.lock().unwrap().insert(chain_id.to_string());
    }

    pub fn set_dead_rpc(&self, rpc_url: &str) {
        self.dead_rpcs.lock().unwrap().insert(rpc_url.to_string());
    }

    pub fn set_hub_whitelist(&self, relayers: Vec<String>) {
        *self.hub_whitelist.lock().unwrap() = relayers;
    }

    /// Responses for successive RollApp polls; `fallback` once the script runs out.
    pub fn script_rollapp_whitelist(&self, responses: Vec<Vec<String>>, fallback: Vec<String>) {
        *self.rollapp_script.lock().unwrap() = responses.into();
        *self.rollapp_fallback.lock().unwrap() = fallback;
    }

    pub fn rollapp_poll_times(&self) -> Vec<Instant> {
        self.rollapp_polls.lock().unwrap().clone()
    }

    fn check(&self, chain: &ChainEndpoint) -> Result<(), LinkError> {
        if self.unreachable.lock().unwrap().contains(&chain.chain_id) {
            return Err(LinkError::unreachable(&chain.chain_id, "connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainQuery for MockChain {
    async fn query_channels(&self, chain: &ChainEndpoint) -> Result<Vec<ChannelRecord>, LinkError> {
        self.check(chain)?;
        self.channel_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .channels
            .lock()
            .unwrap()
            .get(&chain.chain_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn query_connection(
        &self,
        chain: &ChainEndpoint,
        connection_id: &str,
    ) -> Result<Option<ConnectionRecord>, LinkError> {
        self.check(chain)?;
        Ok(self
            .connections
            .lock()
            .unwrap()
            .get(&(chain.chain_id.clone(), connection_id.to_string()))
            .cloned())
    }

    async fn query_hub_whitelist(&self, hub: &ChainEndpoint, _sequencer: &str) -> Result<Vec<String>, LinkError> {
        self.check(hub)?;
        Ok(self.hub_whitelist.lock().unwrap().clone())
    }

    async fn query_rollapp_whitelist(
        &self,
        rollapp: &ChainEndpoint,
        _operator: &str,
    ) -> Result<Vec<String>, LinkError> {
        self.rollapp_polls.lock().unwrap().push(Instant::now());
        self.check(rollapp)?;
        let scripted = self.rollapp_script.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or_else(|| self.rollapp_fallback.lock().unwrap().clone()))
    }

    async fn probe(&self, chain: &ChainEndpoint) -> Result<(), LinkError> {
        self.probes.lock().unwrap().push(chain.rpc_url.clone());
        if self.dead_rpcs.lock().unwrap().contains(&chain.rpc_url) {
            return Err(LinkError::unreachable(&chain.chain_id, "status probe failed"));
        }
        Ok(())
    }
}

/// Records handshake steps; can fail at a chosen step or open the link on success.
#[derive(Default)]
pub struct MockCommand {
    pub calls: Mutex<Vec<String>>,
    pub timeouts: Mutex<Vec<Duration>>,
    pub overrides: Mutex<Vec<bool>>,
    fail_at: Option<&'static str>,
    opens_link_on: Option<Arc<MockChain>>,
}

impl MockCommand {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn failing_at(step: &'static str) -> Self {
        Self {
            fail_at: Some(step),
            ..Default::default()
        }
    }

    pub fn opening_link_on(chain: Arc<MockChain>) -> Self {
        Self {
            opens_link_on: Some(chain),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, step: &str) -> Result<CommandOutput, LinkError> {
        self.calls.lock().unwrap().push(step.to_string());
        if self.fail_at == Some(step) {
            return Err(LinkError::Command {
                program: format!("rly tx {}", step),
                reason: "Error: failed to update client: connection refused".to_string(),
            });
        }
        Ok(CommandOutput {
            stdout: format!("{} done", step),
            stderr: String::new(),
        })
    }
}

#[async_trait]
impl ChainCommand for MockCommand {
    async fn create_clients(
        &self,
        _target: &HandshakeTarget<'_>,
        override_existing: bool,
    ) -> Result<CommandOutput, LinkError> {
        self.overrides.lock().unwrap().push(override_existing);
        self.record("create-clients")
    }

    async fn update_clients(&self, _target: &HandshakeTarget<'_>) -> Result<CommandOutput, LinkError> {
        self.record("update-clients")
    }

    async fn create_connection(
        &self,
        _target: &HandshakeTarget<'_>,
        timeout: Duration,
        override_existing: bool,
    ) -> Result<CommandOutput, LinkError> {
        self.timeouts.lock().unwrap().push(timeout);
        self.overrides.lock().unwrap().push(override_existing);
        self.record("create-connection")
    }

    async fn create_channel(
        &self,
        _target: &HandshakeTarget<'_>,
        timeout: Duration,
        override_existing: bool,
    ) -> Result<CommandOutput, LinkError> {
        self.timeouts.lock().unwrap().push(timeout);
        self.overrides.lock().unwrap().push(override_existing);
        let output = self.record("create-channel")?;
        if let Some(chain) = &self.opens_link_on {
            chain.install_open_link();
        }
        Ok(output)
    }
}

/// Accepts every transaction and returns a fixed hash, or rejects at CheckTx.
pub struct MockBroadcaster {
    pub submitted: Mutex<Vec<UnsignedTx>>,
    reject: bool,
}

impl MockBroadcaster {
    pub fn accepting() -> Self {
        Self {
            submitted: Mutex::new(Vec::new()),
            reject: false,
        }
    }

    pub fn rejecting() -> Self {
        Self {
            submitted: Mutex::new(Vec::new()),
            reject: true,
        }
    }

    pub fn submitted(&self) -> Vec<UnsignedTx> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl TxBroadcaster for MockBroadcaster {
    async fn sign_and_broadcast(&self, _chain: &ChainEndpoint, tx: UnsignedTx) -> Result<String, LinkError> {
        self.submitted.lock().unwrap().push(tx);
        if self.reject {
            return Err(LinkError::Rejected {
                tx_hash: TX_HASH.to_string(),
                code: 13,
                log: "insufficient fee".to_string(),
            });
        }
        Ok(TX_HASH.to_string())
    }
}

/// What a mock subscription does once opened.
#[derive(Clone)]
pub enum Script {
    /// Deliver a result after the given delay, then stay silent
    Event { after: Duration, event: TxResultEvent },
    /// Never deliver anything
    Silent,
    /// End the stream after the given delay
    Closed { after: Duration },
    /// No event ever arrives, but lookups find the result once `after` has passed
    /// since subscribing
    Indexed { after: Duration, event: TxResultEvent },
}

pub fn committed(code: u32, gas_wanted: i64, gas_used: i64) -> TxResultEvent {
    TxResultEvent {
        tx_hash: TX_HASH.to_string(),
        height: 4242,
        code,
        log: if code == 0 {
            String::new()
        } else {
            "insufficient funds".to_string()
        },
        gas_wanted,
        gas_used,
    }
}

pub struct MockSubscriber {
    script: Script,
    pub subscribed: Arc<AtomicUsize>,
    pub unsubscribed: Arc<AtomicUsize>,
    pub lookups: Arc<AtomicUsize>,
    pub endpoints: Mutex<Vec<String>>,
}

impl MockSubscriber {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            subscribed: Arc::new(AtomicUsize::new(0)),
            unsubscribed: Arc::new(AtomicUsize::new(0)),
            lookups: Arc::new(AtomicUsize::new(0)),
            endpoints: Mutex::new(Vec::new()),
        }
    }

    pub fn open_subscriptions(&self) -> usize {
        self.subscribed.load(Ordering::SeqCst) - self.unsubscribed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TxSubscriber for MockSubscriber {
    async fn subscribe(&self, chain: &ChainEndpoint, _tx_hash: &str) -> Result<Box<dyn TxSubscription>, LinkError> {
        self.endpoints.lock().unwrap().push(chain.rpc_url.clone());
        self.subscribed.fetch_add(1, Ordering::SeqCst);
        let (script, indexed) = match self.script.clone() {
            Script::Indexed { after, event } => (Script::Silent, Some((after, event))),
            other => (other, None),
        };
        Ok(Box::new(MockSubscription {
            script: Some(script),
            indexed,
            opened_at: Instant::now(),
            unsubscribed: self.unsubscribed.clone(),
            lookups: self.lookups.clone(),
        }))
    }
}

struct MockSubscription {
    script: Option<Script>,
    indexed: Option<(Duration, TxResultEvent)>,
    opened_at: Instant,
    unsubscribed: Arc<AtomicUsize>,
    lookups: Arc<AtomicUsize>,
}

#[async_trait]
impl TxSubscription for MockSubscription {
    async fn next_result(&mut self) -> Option<Result<TxResultEvent, LinkError>> {
        match self.script.take() {
            Some(Script::Event { after, event }) => {
                tokio::time::sleep(after).await;
                Some(Ok(event))
            }
            Some(Script::Closed { after }) => {
                tokio::time::sleep(after).await;
                None
            }
            Some(Script::Silent) | Some(Script::Indexed { .. }) | None => std::future::pending().await,
        }
    }

    async fn lookup(&mut self) -> Result<Option<TxResultEvent>, LinkError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(match &self.indexed {
            Some((after, event)) if self.opened_at.elapsed() >= *after => Some(event.clone()),
            _ => None,
        })
    }

    async fn unsubscribe(self: Box<Self>) -> Result<(), LinkError> {
        self.unsubscribed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out a fixed replacement endpoint and counts how often it was asked.
pub struct FixedResolver {
    pub replacement: Option<String>,
    pub asked: AtomicUsize,
}

impl FixedResolver {
    pub fn new(replacement: Option<&str>) -> Self {
        Self {
            replacement: replacement.map(str::to_string),
            asked: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EndpointResolver for FixedResolver {
    async fn resolve_alternate_endpoint(&self, _chain: &ChainEndpoint) -> Result<Option<String>, LinkError> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.replacement.clone())
    }
}

/// An operator prompt nobody ever answers.
pub struct UnansweredPrompt {
    pub asked: AtomicUsize,
}

impl UnansweredPrompt {
    pub fn new() -> Self {
        Self {
            asked: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EndpointResolver for UnansweredPrompt {
    async fn resolve_alternate_endpoint(&self, _chain: &ChainEndpoint) -> Result<Option<String>, LinkError> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }
}

/// Hands out a replacement endpoint after the operator took `delay` to answer.
pub struct SlowResolver {
    pub replacement: String,
    pub delay: Duration,
}

#[async_trait]
impl EndpointResolver for SlowResolver {
    async fn resolve_alternate_endpoint(&self, _chain: &ChainEndpoint) -> Result<Option<String>, LinkError> {
        tokio::time::sleep(self.delay).await;
        Ok(Some(self.replacement.clone()))
    }
}

/// Collects every progress message.
#[derive(Default)]
pub struct RecordingProgress {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingProgress {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}
