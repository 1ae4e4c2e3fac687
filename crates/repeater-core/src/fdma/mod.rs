//! The FDMA (continuous-phase frequency-division) protocol implementation
//! (§4.4).

pub mod control;

pub use control::{CcMode, Control, NetState, RfState};
