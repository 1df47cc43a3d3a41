use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

static METRICS_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the process-wide Prometheus recorder. Later calls are no-ops, so
/// several applications may be built in one test process.
pub fn init_metrics() {
    METRICS_HANDLE.get_or_init(|| match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus recorder not installed");
            None
        }
    });
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .and_then(|handle| handle.as_ref())
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

pub fn record_transaction(status: &str) {
    record_transactions(status, 1);
}

pub fn record_transactions(status: &str, count: usize) {
    counter!("scanpay_transactions_total", "status" => status.to_string()).increment(count as u64);
}

pub fn record_otp_issued(purpose: &str, channel: &str) {
    counter!(
        "scanpay_otp_issued_total",
        "purpose" => purpose.to_string(),
        "channel" => channel.to_string()
    )
    .increment(1);
}

pub fn record_otp_verification(verified: bool) {
    let result = if verified { "verified" } else { "rejected" };
    counter!("scanpay_otp_verifications_total", "result" => result).increment(1);
}

pub fn record_qr_issued() {
    counter!("scanpay_qr_issued_total").increment(1);
}

pub fn record_sweep(kind: &'static str, count: usize) {
    counter!("scanpay_sweep_total", "kind" => kind).increment(count as u64);
}
