pub mod batch;
pub mod config;
pub mod log;
pub mod status;
