use super::WorkerStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PerformanceCounter {
    /// percent of one core
    pub cpu: f32,
    /// bytes
    pub memory: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerReport {
    pub worker_id: String,
    pub status: WorkerStatus,
    pub performance_counter: Option<PerformanceCounter>,
}
