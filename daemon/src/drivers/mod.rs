pub mod console;
mod driver;
mod graceful_shutdown;

use crate::app::AppState;
use crate::drivers::console::ConsoleDriver;
pub use driver::Driver;
pub use graceful_shutdown::GracefulShutdown;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Drivers {
    Console,
}

impl Drivers {
    pub fn new_driver(&self, app_state: AppState) -> impl Driver {
        match self {
            Drivers::Console => ConsoleDriver::new(app_state),
        }
    }
}
