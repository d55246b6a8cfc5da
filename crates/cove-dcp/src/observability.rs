//! Metrics for the DCP client, using the `metrics` crate facade.
//!
//! All recorders compile to no-ops when the `metrics-prometheus` feature is
//! disabled.

/// Rollback mitigation metrics.
pub struct MitigationMetrics;

#[allow(unused_variables)]
impl MitigationMetrics {
    /// Total number of reconfigurations triggered by topology changes.
    pub fn increment_reconfigures() {
        #[cfg(feature = "metrics-prometheus")]
        metrics::counter!("cove_dcp_mitigation_reconfigures_total").increment(1);
    }

    /// Total number of transient observe failures.
    pub fn increment_observe_errors() {
        #[cfg(feature = "metrics-prometheus")]
        metrics::counter!("cove_dcp_mitigation_observe_errors_total").increment(1);
    }

    /// Total number of persisted-seqno events published on the bus.
    pub fn increment_persist_seqno_events() {
        #[cfg(feature = "metrics-prometheus")]
        metrics::counter!("cove_dcp_mitigation_persist_seqno_events_total").increment(1);
    }

    /// Generation currently driving the observe fan-out.
    pub fn set_active_generation(generation: u64) {
        #[cfg(feature = "metrics-prometheus")]
        metrics::gauge!("cove_dcp_mitigation_active_generation").set(generation as f64);
    }
}
