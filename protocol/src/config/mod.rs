mod account;
mod global;
mod server;

pub use account::{AccountType, WorkerConfig};
pub use global::{GlobalConfig, DEFAULT_WORKER_IDS};
pub use server::ServerConfig;
