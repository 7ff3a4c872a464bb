//! Error taxonomy for the simulation kernel (spec §7).
//!
//! Configuration and I/O errors are fatal at startup. Protocol violations are
//! bugs in the simulated hardware model itself (double claims, missing
//! end-of-packet, credit underflow, ...) and carry enough context to print the
//! diagnostic dump the spec requires before the process exits non-zero.
//! Operational warnings (unaligned access, write to read-only memory, ...) are
//! not represented here — they are logged via `log::warn!` and execution
//! continues, per §7.

use crate::ids::TileId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("protocol violation at cycle {cycle} in {component}: {detail}")]
    Protocol {
        cycle: u64,
        component: String,
        detail: String,
    },

    #[error("deadlock detected at cycle {cycle}: no progress for {stalled_for} cycles\n{}", report.join("\n"))]
    Deadlock {
        cycle: u64,
        stalled_for: u64,
        report: Vec<String>,
    },

    #[error("tile {0:?} is out of range for this chip")]
    NoSuchTile(TileId),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn protocol(cycle: u64, component: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::Protocol {
            cycle,
            component: component.into(),
            detail: detail.into(),
        }
    }
}
