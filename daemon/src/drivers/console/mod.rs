mod command;
mod driver;

pub use driver::ConsoleDriver;
