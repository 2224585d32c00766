use lazy_static::lazy_static;
use prometheus::{
    Counter, Histogram, IntCounterVec, IntGauge, register_counter, register_histogram,
    register_int_counter_vec, register_int_gauge,
};

lazy_static! {
    pub static ref DESCRIBE_REQUESTS: Counter =
        register_counter!("llava_describe_requests_total", "Total number of describe requests").unwrap();
    pub static ref DESCRIBE_ERRORS: IntCounterVec = register_int_counter_vec!(
        "llava_describe_errors_total",
        "Requests that ended with an error response",
        &["kind"]
    )
    .unwrap();
    pub static ref FRAGMENTS_FORWARDED: Counter =
        register_counter!("llava_fragments_forwarded_total", "Text fragments sent to clients").unwrap();
    pub static ref FRAMES_SKIPPED: Counter =
        register_counter!("llava_frames_skipped_total", "Upstream frames dropped as malformed").unwrap();
    pub static ref UPSTREAM_CONNECT_SECONDS: Histogram = register_histogram!(
        "llava_upstream_connect_seconds",
        "Time until the LLaVA server answered with headers"
    )
    .unwrap();
    pub static ref ACTIVE_STREAMS: IntGauge =
        register_int_gauge!("llava_active_streams", "Description streams currently open").unwrap();
}

// Register everything up front so /metrics lists it before the first request
pub fn init() {
    lazy_static::initialize(&DESCRIBE_REQUESTS);
    lazy_static::initialize(&DESCRIBE_ERRORS);
    lazy_static::initialize(&FRAGMENTS_FORWARDED);
    lazy_static::initialize(&FRAMES_SKIPPED);
    lazy_static::initialize(&UPSTREAM_CONNECT_SECONDS);
    lazy_static::initialize(&ACTIVE_STREAMS);
}
