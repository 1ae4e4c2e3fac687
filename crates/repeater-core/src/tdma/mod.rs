//! The TDMA (two-slot time-division) protocol implementation (§4.2, §4.3).

pub mod control;
pub mod slot;

pub use control::Control;
pub use slot::{NetState, RfState, Slot};
