mod report;
mod worker;

pub use report::{PerformanceCounter, WorkerReport};
pub use worker::{WorkerState, WorkerStatus};
