use lazy_static::lazy_static;
use prometheus::IntCounterVec;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;

lazy_static! {
    pub static ref ACTIVE_WATCHERS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("statewatch_active_watchers", "Number of running watcher tasks"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref BATCHES_DELIVERED: IntCounterVec = IntCounterVec::new(
        Opts::new("statewatch_batches_delivered", "Batches handed to watcher consumers"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref WATCHER_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("statewatch_watcher_failures", "Watchers that terminated with an error"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref FEED_CHANGES: IntCounterVec = IntCounterVec::new(
        Opts::new("statewatch_feed_changes", "Changes published on the change feed"),
        &["collection"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        register_custom_metrics(&registry);
        registry
    };
}

fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(ACTIVE_WATCHERS.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(BATCHES_DELIVERED.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(WATCHER_FAILURES.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(FEED_CHANGES.clone()))
        .expect("collector can be registered");
}

/// Renders every registered collector in the Prometheus text format.
pub fn gather_text() -> String {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("could not encode metrics: {:?}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
