mod config;
mod config_store;
pub mod file;
mod propagation;

pub use config::StorageConfig;
pub use config_store::ConfigStore;
