use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

pub struct MetricsCollector {
    registry: Registry,

    // Requests
    pub requests_total: CounterVec,
    pub request_duration: HistogramVec,

    // Faults
    pub faults_injected: CounterVec,

    // Rebuilds
    pub rebuilds_total: CounterVec,
    pub rebuild_duration: HistogramVec,

    pub live_connections: IntGauge,
}

impl MetricsCollector {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let requests_total = CounterVec::new(
            Opts::new("forgery_requests_total", "Total number of entity requests"),
            &["entity", "status"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "forgery_request_duration_seconds",
                "Entity request duration in seconds, including injected delay",
            ),
            &["entity"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        let faults_injected = CounterVec::new(
            Opts::new("forgery_faults_injected_total", "Total injected faults"),
            &["kind"],
        )?;
        registry.register(Box::new(faults_injected.clone()))?;

        let rebuilds_total = CounterVec::new(
            Opts::new("forgery_rebuilds_total", "Total serving table rebuilds"),
            &["outcome"],
        )?;
        registry.register(Box::new(rebuilds_total.clone()))?;

        let rebuild_duration = HistogramVec::new(
            HistogramOpts::new("forgery_rebuild_duration_seconds", "Rebuild duration in seconds"),
            &["outcome"],
        )?;
        registry.register(Box::new(rebuild_duration.clone()))?;

        let live_connections = IntGauge::new(
            "forgery_live_connections",
            "Number of open live-update connections",
        )?;
        registry.register(Box::new(live_connections.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration,
            faults_injected,
            rebuilds_total,
            rebuild_duration,
            live_connections,
        })
    }

    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

pub struct MetricsHandler {
    collector: Arc<MetricsCollector>,
}

impl MetricsHandler {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self { collector }
    }

    pub async fn metrics(&self) -> String {
        self.collector.encode().unwrap_or_else(|e| {
            tracing::error!("Failed to encode metrics: {}", e);
            String::from("# Error encoding metrics\n")
        })
    }
}
