//! Structural switching elements (spec §4.3): crossbars, the multicast bus,
//! and the XY-routed mesh router.

pub mod crossbar;
pub mod mesh_router;
pub mod multicast_bus;

pub use crossbar::Crossbar;
pub use mesh_router::{Direction, MeshRouter};
pub use multicast_bus::MulticastBus;
