//! The banked, associatively-addressed memory subsystem (spec §4.6-§4.8).

pub mod bank;
pub mod l2_filter;
pub mod mhl;
pub mod operation;

pub use bank::{BankState, MemoryBank};
pub use l2_filter::{BankAssociation, BankVerdict, L2RequestFilter};
pub use mhl::MissHandlingLogic;
pub use operation::{MemoryOperation, CACHE_LINE_WORDS};
