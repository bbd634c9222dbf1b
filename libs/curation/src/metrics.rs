//! Prometheus metrics for the curation engine

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter_vec, register_int_gauge, Encoder, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    /// Lifecycle operations by operation and outcome
    pub static ref LIFECYCLE_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ayusync_lifecycle_operations_total",
        "Total number of lifecycle operations",
        &["operation", "outcome"]
    )
    .expect("Failed to register LIFECYCLE_OPERATIONS_TOTAL");

    /// Mapping rows moved into a status
    pub static ref MAPPING_TRANSITIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ayusync_mapping_transitions_total",
        "Total number of mapping status transitions",
        &["to_status"]
    )
    .expect("Failed to register MAPPING_TRANSITIONS_TOTAL");

    /// Elements written by the last release refresh
    pub static ref RELEASE_ELEMENTS: IntGauge = register_int_gauge!(
        "ayusync_release_elements",
        "Number of elements written by the most recent release refresh"
    )
    .expect("Failed to register RELEASE_ELEMENTS");

    /// Translation cache lookups by result (hit, miss, expired)
    pub static ref TRANSLATION_CACHE_LOOKUPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ayusync_translation_cache_lookups_total",
        "Total number of translation cache lookups",
        &["result"]
    )
    .expect("Failed to register TRANSLATION_CACHE_LOOKUPS_TOTAL");

    /// Calls to external collaborators by service and outcome
    pub static ref EXTERNAL_CALLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ayusync_external_calls_total",
        "Total number of calls to external collaborators",
        &["service", "outcome"]
    )
    .expect("Failed to register EXTERNAL_CALLS_TOTAL");

    /// Enrichment jobs waiting in the worker queue
    pub static ref ENRICHMENT_QUEUE_DEPTH: IntGauge = register_int_gauge!(
        "ayusync_enrichment_queue_depth",
        "Number of enrichment jobs waiting for a worker"
    )
    .expect("Failed to register ENRICHMENT_QUEUE_DEPTH");
}

/// Record the outcome of a lifecycle operation.
pub fn record_operation<T>(operation: &str, result: &crate::Result<T>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.code(),
    };
    LIFECYCLE_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

/// Render all registered metrics in the Prometheus text format
pub fn render() -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
