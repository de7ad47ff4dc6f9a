mod batch;
mod config;
mod process;
mod process_helper;
mod supervisor;

pub use batch::{BatchConfig, BatchCoordinator};
pub use config::{ExitWatch, LaunchSpec, SupervisorConfig};
pub use supervisor::Supervisor;
