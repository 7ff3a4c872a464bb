//! Core simulation kernel for a cycle-accurate, many-tile multicore chip:
//! the banked L1/L2 memory subsystem, miss-handling/directory/routing logic,
//! and the arbitrated on-chip network fabric with credit-based flow control.

pub mod arbiter;
pub mod chip;
pub mod cmt;
pub mod config;
pub mod directory;
pub mod error;
pub mod flit;
pub mod flow;
pub mod icu;
pub mod ids;
pub mod loader;
pub mod main_memory;
pub mod memory;
pub mod network;
pub mod sim;
pub mod tile;

pub use chip::Chip;
pub use config::Config;
pub use error::{Error, Result};
pub use sim::Simulator;

/// Initialise the `env_logger` backend at the default filter level, mirroring
/// `gpucachesim::init_logging`'s one-line setup at process start.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
