//! Prometheus counters for operation-engine activity, gated behind the `metrics`
//! feature exactly as the teacher crate gates its own prometheus integration.

#![cfg(feature = "metrics")]

use lazy_static::lazy_static;
use prometheus::{IntCounterVec, Opts};

lazy_static! {
    /// Count of completed operations by operation name and outcome ("ok"/"error").
    pub static ref OPERATIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("xfer_connection_operations_total", "Number of connection operations completed"),
        &["operation", "outcome"]
    )
    .unwrap();
    /// Count of write attempts rejected by the quota evaluator.
    pub static ref QUOTA_REJECTIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("xfer_connection_quota_rejections_total", "Number of writes rejected for quota reasons"),
        &["scope"]
    )
    .unwrap();
    /// Count of operations rejected by the permission oracle.
    pub static ref PERMISSION_DENIALS: IntCounterVec = IntCounterVec::new(
        Opts::new("xfer_connection_permission_denials_total", "Number of operations denied by the permission oracle"),
        &["operation"]
    )
    .unwrap();
}

/// Registers every metric with `registry`. Must be called once at process startup;
/// registering twice returns an error from the `prometheus` crate.
pub fn register(registry: &prometheus::Registry) -> prometheus::Result<()> {
    registry.register(Box::new(OPERATIONS.clone()))?;
    registry.register(Box::new(QUOTA_REJECTIONS.clone()))?;
    registry.register(Box::new(PERMISSION_DENIALS.clone()))?;
    Ok(())
}

/// Records a completed operation.
pub fn record_operation(operation: &str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    OPERATIONS.with_label_values(&[operation, outcome]).inc();
}

/// Records a quota rejection for `scope` (e.g. `"user"` or `"folder"`).
pub fn record_quota_rejection(scope: &str) {
    QUOTA_REJECTIONS.with_label_values(&[scope]).inc();
}

/// Records a permission denial for `operation`.
pub fn record_permission_denial(operation: &str) {
    PERMISSION_DENIALS.with_label_values(&[operation]).inc();
}
