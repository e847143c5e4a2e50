use prometheus::{Encoder, Histogram, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub orders_total: IntCounterVec,
    pub accept_attempts_total: IntCounterVec,
    pub couriers_on_duty: IntGauge,
    pub time_to_accept_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let orders_total = IntCounterVec::new(
            Opts::new("orders_total", "Order lifecycle transitions by event"),
            &["event"],
        )
        .expect("valid orders_total metric");

        let accept_attempts_total = IntCounterVec::new(
            Opts::new("accept_attempts_total", "Accept attempts by outcome"),
            &["outcome"],
        )
        .expect("valid accept_attempts_total metric");

        let couriers_on_duty = IntGauge::new(
            "couriers_on_duty",
            "Couriers with an open duty session today",
        )
        .expect("valid couriers_on_duty metric");

        let time_to_accept_seconds = Histogram::with_opts(prometheus::HistogramOpts::new(
            "time_to_accept_seconds",
            "Seconds between order creation and a winning accept",
        ))
        .expect("valid time_to_accept_seconds metric");

        registry
            .register(Box::new(orders_total.clone()))
            .expect("register orders_total");
        registry
            .register(Box::new(accept_attempts_total.clone()))
            .expect("register accept_attempts_total");
        registry
            .register(Box::new(couriers_on_duty.clone()))
            .expect("register couriers_on_duty");
        registry
            .register(Box::new(time_to_accept_seconds.clone()))
            .expect("register time_to_accept_seconds");

        Self {
            registry,
            orders_total,
            accept_attempts_total,
            couriers_on_duty,
            time_to_accept_seconds,
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
