use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, Encoder, HistogramVec, IntCounter, IntCounterVec, Registry, TextEncoder,
};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static REQUEST_COUNTER: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::with_opts(opts!(
        "melodia_requests_total",
        "Total number of requests received"
    ))
    .expect("request counter");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static RESPONSES: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        opts!("melodia_responses_total", "Responses by route and envelope code"),
        &["route", "code"],
    )
    .expect("response counter");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static AUTH_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        opts!(
            "melodia_auth_failures_total",
            "Rejected credentials by kind (missing, invalid, role)"
        ),
        &["kind"],
    )
    .expect("auth failure counter");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static REQUEST_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    let h = HistogramVec::new(
        histogram_opts!("melodia_request_duration_seconds", "Handler latencies"),
        &["route"],
    )
    .expect("latency histogram");
    REGISTRY.register(Box::new(h.clone())).ok();
    h
});

pub fn record_auth_failure(kind: &str) {
    AUTH_FAILURES.with_label_values(&[kind]).inc();
}

pub fn record_response(route: &str, code: u16, seconds: f64) {
    RESPONSES
        .with_label_values(&[route, &code.to_string()])
        .inc();
    REQUEST_LATENCY.with_label_values(&[route]).observe(seconds);
}

/// Return metrics in the Prometheus text format.
pub fn gather_metrics() -> String {
    // Touch the statics so every family is registered before the first scrape
    Lazy::force(&REQUEST_COUNTER);
    Lazy::force(&RESPONSES);
    Lazy::force(&AUTH_FAILURES);
    Lazy::force(&REQUEST_LATENCY);

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
