pub mod command;
pub mod config;
pub mod error;
pub mod identity;
pub mod io;
pub mod orchestrator;
pub mod params;
pub mod runlog;
pub mod runner;
pub mod step;
pub mod steps;
pub mod switcher;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ProvisionError, Result};
