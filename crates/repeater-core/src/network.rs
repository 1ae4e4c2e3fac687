//! The network adapter boundary (§2 "J Network adapter"). Opaque
//! collaborator: delivers network-originated frames to a protocol
//! `Control`'s `process_network` and receives outbound frames.
//!
//! This crate only stubs the basic send/receive surface — a full
//! wide-area peer federation protocol is explicitly out of scope (§1
//! Non-goals).

use std::io;
use std::net::{SocketAddr, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("network transport error: {0}")]
    Transport(#[from] io::Error),
}

/// Opaque network collaborator. Frames crossing this boundary pass
/// through unmodified; the core never interprets the peer wire protocol.
pub trait Network: Send {
    fn clock(&mut self, elapsed_ms: u64);
    fn is_connected(&self) -> bool;
    fn send(&mut self, bytes: &[u8]) -> Result<(), NetworkError>;
    /// Read the next available inbound frame into `out`; `0` if none
    /// ready.
    fn receive(&mut self, out: &mut [u8]) -> usize;
}

/// Minimal UDP network path: always reports connected, frames pass
/// through opaquely. Not a full FNE (wide-area peer) implementation.
pub struct UdpNetwork {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UdpNetwork {
    pub fn new(bind: SocketAddr, peer: SocketAddr) -> Result<Self, NetworkError> {
        let domain = if bind.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let raw = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        raw.set_reuse_address(true)?;
        raw.set_nonblocking(true)?;
        raw.bind(&bind.into())?;
        let socket: UdpSocket = raw.into();
        Ok(Self { socket, peer })
    }
}

impl Network for UdpNetwork {
    fn clock(&mut self, _elapsed_ms: u64) {}

    fn is_connected(&self) -> bool {
        true
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), NetworkError> {
        self.socket.send_to(bytes, self.peer)?;
        Ok(())
    }

    fn receive(&mut self, out: &mut [u8]) -> usize {
        match self.socket.recv(out) {
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => 0,
            Err(_) => 0,
        }
    }
}

/// In-memory loopback, used by tests and as a config-free default.
#[derive(Default)]
pub struct NullNetwork {
    inbound: Vec<Vec<u8>>,
}

impl NullNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject(&mut self, bytes: &[u8]) {
        self.inbound.push(bytes.to_vec());
    }
}

impl Network for NullNetwork {
    fn clock(&mut self, _elapsed_ms: u64) {}

    fn is_connected(&self) -> bool {
        true
    }

    fn send(&mut self, _bytes: &[u8]) -> Result<(), NetworkError> {
        Ok(())
    }

    fn receive(&mut self, out: &mut [u8]) -> usize {
        if self.inbound.is_empty() {
            return 0;
        }
        let frame = self.inbound.remove(0);
        let n = frame.len().min(out.len());
        out[..n].copy_from_slice(&frame[..n]);
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_network_loopback_round_trips_an_injected_frame() {
        let mut net = NullNetwork::new();
        net.inject(&[9, 9, 9]);
        let mut out = [0u8; 8];
        assert_eq!(net.receive(&mut out), 3);
        assert_eq!(&out[..3], &[9, 9, 9]);
    }

    #[test]
    fn null_network_always_reports_connected() {
        let net = NullNetwork::new();
        assert!(net.is_connected());
    }
}
