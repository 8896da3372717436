use std::{collections::BTreeMap, sync::Mutex, time::Duration};

use serde::Serialize;

use crate::types::TaskType;

/// Bucket for operations rejected before their task type was recognized.
pub const UNKNOWN_TASK_TYPE: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn from_success(success: bool) -> Self {
        if success { Self::Success } else { Self::Failure }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

#[derive(Debug, Default)]
struct MetricsState {
    total_operations: u64,
    success_count: u64,
    failure_count: u64,
    total_latency_ms: u64,
    model_usage_counts: BTreeMap<String, u64>,
    task_type_counts: BTreeMap<String, u64>,
}

/// Immutable copy of the counters. Rates and averages are derived here on
/// read; the aggregator stores only raw sums.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsView {
    pub total_operations: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub total_latency_ms: u64,
    pub model_usage_counts: BTreeMap<String, u64>,
    pub task_type_counts: BTreeMap<String, u64>,
}

impl MetricsView {
    pub fn success_rate(&self) -> f64 {
        if self.total_operations == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.total_operations as f64
    }

    pub fn average_latency_ms(&self) -> f64 {
        if self.total_operations == 0 {
            return 0.0;
        }
        self.total_latency_ms as f64 / self.total_operations as f64
    }
}

#[derive(Debug, Default)]
pub struct MetricsAggregator {
    state: Mutex<MetricsState>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called exactly once per terminal operation. `None` lands in the
    /// [`UNKNOWN_TASK_TYPE`] bucket.
    pub fn record(
        &self,
        task_type: Option<TaskType>,
        duration: Duration,
        outcome: Outcome,
        model_used: Option<&str>,
    ) {
        let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        let mut state = self.state.lock().expect("lock poisoned");

        state.total_operations = state.total_operations.saturating_add(1);
        match outcome {
            Outcome::Success => state.success_count = state.success_count.saturating_add(1),
            Outcome::Failure => state.failure_count = state.failure_count.saturating_add(1),
        }
        state.total_latency_ms = state.total_latency_ms.saturating_add(duration_ms);
        if let Some(model) = model_used.filter(|model| !model.trim().is_empty()) {
            *state.model_usage_counts.entry(model.to_string()).or_insert(0) += 1;
        }
        *state
            .task_type_counts
            .entry(task_type.map_or(UNKNOWN_TASK_TYPE, TaskType::as_str).to_string())
            .or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> MetricsView {
        let state = self.state.lock().expect("lock poisoned");
        MetricsView {
            total_operations: state.total_operations,
            success_count: state.success_count,
            failure_count: state.failure_count,
            total_latency_ms: state.total_latency_ms,
            model_usage_counts: state.model_usage_counts.clone(),
            task_type_counts: state.task_type_counts.clone(),
        }
    }
}
