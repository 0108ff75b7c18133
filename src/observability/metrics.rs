use prometheus::{
    Encoder, Gauge, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub correlated_requests_total: IntCounterVec,
    pub correlated_request_latency_seconds: HistogramVec,
    pub offers_total: IntCounterVec,
    pub socket_reconnects_total: IntCounter,
    pub orders_by_partition: IntGaugeVec,
    pub wallet_balance: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let correlated_requests_total = IntCounterVec::new(
            Opts::new(
                "correlated_requests_total",
                "Correlated socket requests by event and outcome",
            ),
            &["event", "outcome"],
        )
        .expect("valid correlated_requests_total metric");

        let correlated_request_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "correlated_request_latency_seconds",
                "Round trip of correlated socket requests in seconds",
            ),
            &["event"],
        )
        .expect("valid correlated_request_latency_seconds metric");

        let offers_total = IntCounterVec::new(
            Opts::new("offers_total", "Order offers by outcome"),
            &["outcome"],
        )
        .expect("valid offers_total metric");

        let socket_reconnects_total = IntCounter::new(
            "socket_reconnects_total",
            "Successful socket reconnects after link loss",
        )
        .expect("valid socket_reconnects_total metric");

        let orders_by_partition = IntGaugeVec::new(
            Opts::new("orders_by_partition", "Locally held orders per partition"),
            &["partition"],
        )
        .expect("valid orders_by_partition metric");

        let wallet_balance = Gauge::new("wallet_balance", "Last known wallet balance")
            .expect("valid wallet_balance metric");

        registry
            .register(Box::new(correlated_requests_total.clone()))
            .expect("register correlated_requests_total");
        registry
            .register(Box::new(correlated_request_latency_seconds.clone()))
            .expect("register correlated_request_latency_seconds");
        registry
            .register(Box::new(offers_total.clone()))
            .expect("register offers_total");
        registry
            .register(Box::new(socket_reconnects_total.clone()))
            .expect("register socket_reconnects_total");
        registry
            .register(Box::new(orders_by_partition.clone()))
            .expect("register orders_by_partition");
        registry
            .register(Box::new(wallet_balance.clone()))
            .expect("register wallet_balance");

        Self {
            registry,
            correlated_requests_total,
            correlated_request_latency_seconds,
            offers_total,
            socket_reconnects_total,
            orders_by_partition,
            wallet_balance,
        }
    }

    pub fn set_order_partitions(&self, active: usize, completed: usize) {
        self.orders_by_partition
            .with_label_values(&["active"])
            .set(active as i64);
        self.orders_by_partition
            .with_label_values(&["completed"])
            .set(completed as i64);
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
