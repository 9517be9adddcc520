// Prometheus metrics definitions for the kumite backend.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Live WebSocket connections (scoreboard displays and control panels).
    pub static ref CONNECTED_WEBSOCKETS: IntGauge =
        IntGauge::new("kumite_connected_websockets", "Live WebSocket connections").unwrap();

    /// Clock ticker tasks currently running (0 or 1).
    pub static ref ACTIVE_TICKERS: IntGauge =
        IntGauge::new("kumite_active_tickers", "Clock ticker tasks currently running").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Bouts decided, by reason (gap, time, manual, kiken, shikkaku).
    pub static ref MATCHES_COMPLETED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("kumite_matches_completed_total", "Bouts decided"),
        &["reason"],
    )
    .unwrap();

    /// Commands refused by the core, by error kind.
    pub static ref COMMANDS_REJECTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("kumite_commands_rejected_total", "Commands refused by the core"),
        &["kind"],
    )
    .unwrap();

    /// Failed writes of the log archive to persistent storage.
    pub static ref STORAGE_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "kumite_storage_failures_total",
        "Failed writes of the log archive",
    )
    .unwrap();

    /// Total WebSocket messages sent to clients.
    pub static ref WEBSOCKET_MESSAGES_SENT_TOTAL: IntCounter = IntCounter::new(
        "kumite_websocket_messages_sent_total",
        "Total WebSocket messages sent",
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Wall-clock length of decided bouts in seconds, by reason.
    pub static ref MATCH_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("kumite_match_duration_seconds", "Wall-clock bout length in seconds")
            .buckets(vec![15.0, 30.0, 60.0, 120.0, 180.0, 300.0, 600.0, 900.0]),
        &["reason"],
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup;
/// repeated calls leave the registry unchanged.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(CONNECTED_WEBSOCKETS.clone()),
        Box::new(ACTIVE_TICKERS.clone()),
        Box::new(MATCHES_COMPLETED_TOTAL.clone()),
        Box::new(COMMANDS_REJECTED_TOTAL.clone()),
        Box::new(STORAGE_FAILURES_TOTAL.clone()),
        Box::new(WEBSOCKET_MESSAGES_SENT_TOTAL.clone()),
        Box::new(MATCH_DURATION_SECONDS.clone()),
    ];

    for c in collectors {
        if let Err(e) = REGISTRY.register(c) {
            tracing::debug!("Metric not registered: {e}");
        }
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
