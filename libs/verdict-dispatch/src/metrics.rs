// Prometheus metrics for dispatch, recovery and worker-pool load

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    pub static ref DISPATCH_TOTAL: IntCounterVec = register_int_counter_vec!(
        "verdict_dispatch_total",
        "Dispatch attempts by outcome",
        &["outcome"]
    )
    .expect("dispatch counter can be registered");
    pub static ref RECOVERED_TOTAL: IntCounter = register_int_counter!(
        "verdict_recovered_total",
        "Submissions moved to processing by the recovery sweep"
    )
    .expect("recovery counter can be registered");
    pub static ref STATUS_REPORTS_TOTAL: IntCounter = register_int_counter!(
        "verdict_status_reports_total",
        "Worker status reports ingested"
    )
    .expect("status report counter can be registered");
    pub static ref WORKERS_BUSY: IntGauge =
        register_int_gauge!("verdict_workers_busy", "Busy workers in the last status report")
            .expect("busy gauge can be registered");
    pub static ref WORKERS_TOTAL: IntGauge =
        register_int_gauge!("verdict_workers_total", "Workers in the last status report")
            .expect("total gauge can be registered");
    pub static ref BROKER_CONNECTED: IntGauge = register_int_gauge!(
        "verdict_broker_connected",
        "1 while a broker connection is installed"
    )
    .expect("connection gauge can be registered");
}

pub fn record_dispatch(outcome: &str) {
    DISPATCH_TOTAL.with_label_values(&[outcome]).inc();
}

/// Render every registered metric in the text exposition format
pub fn render() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_dispatch_counter() {
        record_dispatch("sent");
        let text = render();
        assert!(text.contains("verdict_dispatch_total"));
    }
}
