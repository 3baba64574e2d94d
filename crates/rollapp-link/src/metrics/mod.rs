// Metrics for link orchestration

#[cfg(feature = "metrics")]
mod registry {
    use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
    use std::sync::Arc;
    use std::time::Duration;

    /// Orchestrator metrics, registered in a private registry.
    pub struct OrchestratorMetrics {
        pub handshake_steps: IntCounterVec,
        pub discoveries: IntCounterVec,
        pub whitelist_polls: IntCounter,
        pub tx_outcomes: IntCounterVec,
        pub tx_wait: Histogram,

        registry: Arc<Registry>,
    }

    impl OrchestratorMetrics {
        pub fn new() -> prometheus::Result<Self> {
            let registry = Arc::new(Registry::new());

            let handshake_steps = IntCounterVec::new(
                Opts::new("link_handshake_steps_total", "Handshake steps run, by step and result"),
                &["step", "result"],
            )?;
            let discoveries = IntCounterVec::new(
                Opts::new("link_discovery_total", "Link discoveries, by result"),
                &["result"],
            )?;
            let whitelist_polls =
                IntCounter::new("link_whitelist_polls_total", "RollApp whitelist propagation polls")?;
            let tx_outcomes = IntCounterVec::new(
                Opts::new("link_tx_outcomes_total", "Monitored transactions, by outcome"),
                &["outcome"],
            )?;
            let tx_wait = Histogram::with_opts(
                HistogramOpts::new("link_tx_wait_seconds", "Time spent waiting for a transaction to resolve")
                    .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
            )?;

            registry.register(Box::new(handshake_steps.clone()))?;
            registry.register(Box::new(discoveries.clone()))?;
            registry.register(Box::new(whitelist_polls.clone()))?;
            registry.register(Box::new(tx_outcomes.clone()))?;
            registry.register(Box::new(tx_wait.clone()))?;

            Ok(Self {
                handshake_steps,
                discoveries,
                whitelist_polls,
                tx_outcomes,
                tx_wait,
                registry,
            })
        }

        pub fn registry(&self) -> Arc<Registry> {
            self.registry.clone()
        }

        pub fn record_handshake_step(&self, step: &str, succeeded: bool) {
            let result = if succeeded { "ok" } else { "error" };
            self.handshake_steps.with_label_values(&[step, result]).inc();
        }

        pub fn record_discovery(&self, result: &str) {
            self.discoveries.with_label_values(&[result]).inc();
        }

        pub fn record_whitelist_poll(&self) {
            self.whitelist_polls.inc();
        }

        pub fn record_tx_outcome(&self, outcome: &str, waited: Duration) {
            self.tx_outcomes.with_label_values(&[outcome]).inc();
            self.tx_wait.observe(waited.as_secs_f64());
        }

        /// Prometheus text exposition of every metric.
        pub fn render(&self) -> String {
            let mut buffer = Vec::new();
            if TextEncoder::new().encode(&self.registry.gather(), &mut buffer).is_err() {
                return String::new();
            }
            String::from_utf8(buffer).unwrap_or_default()
        }
    }
}

#[cfg(not(feature = "metrics"))]
mod registry {
    use std::convert::Infallible;
    use std::time::Duration;

    /// Metrics are compiled out; every recording call is a no-op.
    pub struct OrchestratorMetrics;

    impl OrchestratorMetrics {
        pub fn new() -> Result<Self, Infallible> {
            Ok(Self)
        }

        pub fn record_handshake_step(&self, _step: &str, _succeeded: bool) {}

        pub fn record_discovery(&self, _result: &str) {}

        pub fn record_whitelist_poll(&self) {}

        pub fn record_tx_outcome(&self, _outcome: &str, _waited: Duration) {}

        pub fn render(&self) -> String {
            String::new()
        }
    }
}

pub use registry::OrchestratorMetrics;
