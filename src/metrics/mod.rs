use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounterVec;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;
use tracing::error;

lazy_static! {
    pub static ref SYNCER_EVENTS: IntCounterVec = IntCounterVec::new(
        Opts::new("region_syncer_events", "Region tree updates by outcome"),
        &["outcome"]
    )
    .expect("metric can not be created");

    pub static ref LOCAL_MAPPINGS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("local_region_mappings", "Regions served by this process"),
        &["group"]
    )
    .expect("metric can not be created");

    pub static ref MEMBERSHIP_EVENTS: IntCounterVec = IntCounterVec::new(
        Opts::new("membership_events", "Membership changes delivered to listeners"),
        &["kind"]
    )
    .expect("metric can not be created");

    pub static ref PARTITIONER_OPERATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("partitioner_operations", "Split and merge protocol steps"),
        &["operation", "phase"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

pub fn register_custom_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(SYNCER_EVENTS.clone()),
        Box::new(LOCAL_MAPPINGS.clone()),
        Box::new(MEMBERSHIP_EVENTS.clone()),
        Box::new(PARTITIONER_OPERATIONS.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            error!("collector can not be registered: {}", e);
        }
    }
}

/// Text exposition of every metric of this crate
pub fn gather_metrics() -> String {
    REGISTER.call_once(|| register_custom_metrics(&REGISTRY));

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {}", e);
            String::new()
        }
    }
}
