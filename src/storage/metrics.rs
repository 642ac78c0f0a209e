//! Storage and migration metrics.

use std::time::Instant;

/// Records a storage lifecycle operation (`open`, `close`).
///
/// Emits `storage_operations_total` and `storage_operation_duration_ms`,
/// labelled by operation and status (`success` or `error`).
pub fn record_operation_metrics(operation: &'static str, start: Instant, status: &'static str) {
    metrics::counter!(
        "storage_operations_total",
        "backend" => "sqlite",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "storage_operation_duration_ms",
        "backend" => "sqlite",
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

/// Records one migration step.
pub fn record_migration_step(start: Instant, status: &'static str) {
    metrics::counter!("migration_steps_total", "status" => status).increment(1);
    metrics::histogram!("migration_step_duration_ms", "status" => status)
        .record(start.elapsed().as_secs_f64() * 1000.0);
}
