//! Real-time protocol core for a TDMA/FDMA trunked repeater host.
//!
//! This crate implements the leaf-to-root component stack: millisecond
//! timers and ring buffers at the bottom, CSBK/TSBK trunking codecs in
//! the middle, the TDMA and FDMA protocol state machines above that, and
//! the [`host::Host`] arbitrator tying modem and network adapters to
//! both protocols at the top.

pub mod config;
pub mod csbk;
pub mod fdma;
pub mod frame;
pub mod host;
pub mod lookup;
pub mod modem;
pub mod network;
pub mod ring;
pub mod signalling;
pub mod site;
pub mod tdma;
pub mod timer;

pub use config::{ConfigError, HostConfig};
pub use frame::{CallType, Frame, FrameKind, LinkControl, Protocol};
pub use host::{Host, HostError, HostState};
pub use site::{SiteData, SiteModel};
