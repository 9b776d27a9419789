use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub claims_total: IntCounterVec,
    pub dispatch_latency_seconds: HistogramVec,
    pub orders_in_dispatch_queue: IntGauge,
    pub offers_expired_total: IntCounter,
    pub offers_declined_total: IntCounter,
    pub events_published_total: IntCounterVec,
    pub dispatch_failures_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let claims_total = IntCounterVec::new(
            Opts::new("claims_total", "Order claim attempts by outcome"),
            &["outcome"],
        )
        .expect("valid claims_total metric");

        let dispatch_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "dispatch_latency_seconds",
                "Latency of a dispatch cycle in seconds",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_latency_seconds metric");

        let orders_in_dispatch_queue = IntGauge::new(
            "orders_in_dispatch_queue",
            "Orders currently waiting for a dispatch cycle",
        )
        .expect("valid orders_in_dispatch_queue metric");

        let offers_expired_total = IntCounter::new(
            "offers_expired_total",
            "Assignment offers reverted by the expiry reaper",
        )
        .expect("valid offers_expired_total metric");

        let offers_declined_total = IntCounter::new(
            "offers_declined_total",
            "Assignment offers explicitly declined by agents",
        )
        .expect("valid offers_declined_total metric");

        let events_published_total = IntCounterVec::new(
            Opts::new("events_published_total", "Bus events published by topic"),
            &["topic"],
        )
        .expect("valid events_published_total metric");

        let dispatch_failures_total = IntCounter::new(
            "dispatch_failures_total",
            "Dispatch cycles abandoned after store retry exhaustion",
        )
        .expect("valid dispatch_failures_total metric");

        registry
            .register(Box::new(claims_total.clone()))
            .expect("register claims_total");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(orders_in_dispatch_queue.clone()))
            .expect("register orders_in_dispatch_queue");
        registry
            .register(Box::new(offers_expired_total.clone()))
            .expect("register offers_expired_total");
        registry
            .register(Box::new(offers_declined_total.clone()))
            .expect("register offers_declined_total");
        registry
            .register(Box::new(events_published_total.clone()))
            .expect("register events_published_total");
        registry
            .register(Box::new(dispatch_failures_total.clone()))
            .expect("register dispatch_failures_total");

        Self {
            registry,
            claims_total,
            dispatch_latency_seconds,
            orders_in_dispatch_queue,
            offers_expired_total,
            offers_declined_total,
            events_published_total,
            dispatch_failures_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
