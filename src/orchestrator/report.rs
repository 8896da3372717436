use std::collections::BTreeMap;

use serde::Serialize;

use crate::aggregator::MetricsView;

/// Read-only metrics snapshot returned by `Orchestrator::get_metrics`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub total_operations: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub success_rate: f64,
    pub average_response_time_ms: f64,
    pub model_usage_stats: BTreeMap<String, u64>,
    pub task_type_counts: BTreeMap<String, u64>,
    pub active_operations: usize,
    pub session_count: usize,
    pub forensic_write_failures: u64,
}

impl MetricsReport {
    pub(crate) fn new(
        view: MetricsView,
        active_operations: usize,
        session_count: usize,
        forensic_write_failures: u64,
    ) -> Self {
        Self {
            success_rate: view.success_rate(),
            average_response_time_ms: view.average_latency_ms(),
            total_operations: view.total_operations,
            success_count: view.success_count,
            failure_count: view.failure_count,
            model_usage_stats: view.model_usage_counts,
            task_type_counts: view.task_type_counts,
            active_operations,
            session_count,
            forensic_write_failures,
        }
    }
}
