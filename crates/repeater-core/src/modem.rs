//! The modem wire-protocol boundary (§6 "Modem wire protocol (opaque
//! boundary)"). Frame bytes crossing this boundary are already the
//! FEC-processed payloads the physical layer produced; this crate never
//! touches bit-level correction.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ModemError {
    #[error("modem transport error: {0}")]
    Transport(#[from] io::Error),
    #[error("modem port not open")]
    NotOpen,
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

/// Non-blocking request/response byte protocol to the physical modem
/// (§6). Every method must be non-blocking — the Host polls it once per
/// tick and never waits inside a Modem call.
pub trait Modem: Send {
    fn open(&mut self) -> Result<(), ModemError>;
    fn close(&mut self);
    fn clock(&mut self, elapsed_ms: u64);

    fn has_lockout(&self) -> bool;
    fn has_error(&self) -> bool;
    fn has_tx(&self) -> bool;
    fn is_hotspot(&self) -> bool;
    fn get_version(&self) -> Option<String>;

    fn has_space_tdma(&self) -> bool;
    fn has_space_fdma(&self) -> bool;

    /// Read the next available TDMA frame into `out`; `0` if none ready.
    fn read_data_tdma(&mut self, out: &mut [u8]) -> usize;
    fn read_data_fdma(&mut self, out: &mut [u8]) -> usize;

    fn write_data_tdma(&mut self, bytes: &[u8]) -> Result<(), ModemError>;
    fn write_data_fdma(&mut self, bytes: &[u8]) -> Result<(), ModemError>;

    /// Key the duplex TDMA carrier (PTT) ahead of the first data write.
    fn write_start_tdma(&mut self) -> Result<(), ModemError>;
    fn write_start_fdma(&mut self) -> Result<(), ModemError>;

    fn send_cw_id(&mut self, callsign: &str) -> Result<(), ModemError>;
    fn clear_p25_data(&mut self);
}

/// In-memory loopback modem: the default for headless runs and tests.
/// Every write immediately becomes readable from the matching protocol
/// queue; never reports lockout, error, or an in-progress transmission.
#[derive(Debug, Default)]
pub struct NullModem {
    open: bool,
    tdma_rx: Vec<Vec<u8>>,
    fdma_rx: Vec<Vec<u8>>,
    tx_active: bool,
}

impl NullModem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a frame as if it had arrived from the air, for tests and
    /// simulation harnesses.
    pub fn inject_tdma(&mut self, bytes: &[u8]) {
        self.tdma_rx.push(bytes.to_vec());
    }

    pub fn inject_fdma(&mut self, bytes: &[u8]) {
        self.fdma_rx.push(bytes.to_vec());
    }
}

impl Modem for NullModem {
    fn open(&mut self) -> Result<(), ModemError> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn clock(&mut self, _elapsed_ms: u64) {
        self.tx_active = false;
    }

    fn has_lockout(&self) -> bool {
        false
    }

    fn has_error(&self) -> bool {
        false
    }

    fn has_tx(&self) -> bool {
        self.tx_active
    }

    fn is_hotspot(&self) -> bool {
        false
    }

    fn get_version(&self) -> Option<String> {
        Some("null-modem/1.0".to_string())
    }

    fn has_space_tdma(&self) -> bool {
        self.open
    }

    fn has_space_fdma(&self) -> bool {
        self.open
    }

    fn read_data_tdma(&mut self, out: &mut [u8]) -> usize {
        read_queue(&mut self.tdma_rx, out)
    }

    fn read_data_fdma(&mut self, out: &mut [u8]) -> usize {
        read_queue(&mut self.fdma_rx, out)
    }

    fn write_data_tdma(&mut self, _bytes: &[u8]) -> Result<(), ModemError> {
        if !self.open {
            return Err(ModemError::NotOpen);
        }
        Ok(())
    }

    fn write_data_fdma(&mut self, _bytes: &[u8]) -> Result<(), ModemError> {
        if !self.open {
            return Err(ModemError::NotOpen);
        }
        Ok(())
    }

    fn write_start_tdma(&mut self) -> Result<(), ModemError> {
        self.tx_active = true;
        Ok(())
    }

    fn write_start_fdma(&mut self) -> Result<(), ModemError> {
        self.tx_active = true;
        Ok(())
    }

    fn send_cw_id(&mut self, callsign: &str) -> Result<(), ModemError> {
        debug!(callsign, "null modem CW-ID (no-op)");
        Ok(())
    }

    fn clear_p25_data(&mut self) {}
}

fn read_queue(queue: &mut Vec<Vec<u8>>, out: &mut [u8]) -> usize {
    if queue.is_empty() {
        return 0;
    }
    let frame = queue.remove(0);
    let n = frame.len().min(out.len());
    out[..n].copy_from_slice(&frame[..n]);
    n
}

/// UDP-connected modem (typical of a hotspot/MMDVM-over-IP deployment).
/// The socket is set non-blocking at construction; reads that would
/// block simply return `0` for this tick.
pub struct UdpModem {
    socket: UdpSocket,
    peer: SocketAddr,
    open: bool,
}

impl UdpModem {
    pub fn new(bind: SocketAddr, peer: SocketAddr) -> Result<Self, ModemError> {
        let domain = if bind.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let raw = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        raw.set_reuse_address(true)?;
        raw.set_nonblocking(true)?;
        raw.bind(&bind.into())?;
        let socket: UdpSocket = raw.into();
        Ok(Self {
            socket,
            peer,
            open: false,
        })
    }

    fn read_nonblocking(&self, out: &mut [u8]) -> usize {
        match self.socket.recv(out) {
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => 0,
            Err(e) => {
                warn!(error = %e, "UDP modem read error");
                0
            }
        }
    }

    fn write(&self, bytes: &[u8]) -> Result<(), ModemError> {
        self.socket.send_to(bytes, self.peer)?;
        Ok(())
    }
}

impl Modem for UdpModem {
    fn open(&mut self) -> Result<(), ModemError> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn clock(&mut self, _elapsed_ms: u64) {}

    fn has_lockout(&self) -> bool {
        false
    }

    fn has_error(&self) -> bool {
        !self.open
    }

    fn has_tx(&self) -> bool {
        false
    }

    fn is_hotspot(&self) -> bool {
        true
    }

    fn get_version(&self) -> Option<String> {
        None
    }

    fn has_space_tdma(&self) -> bool {
        self.open
    }

    fn has_space_fdma(&self) -> bool {
        self.open
    }

    fn read_data_tdma(&mut self, out: &mut [u8]) -> usize {
        self.read_nonblocking(out)
    }

    fn read_data_fdma(&mut self, out: &mut [u8]) -> usize {
        self.read_nonblocking(out)
    }

    fn write_data_tdma(&mut self, bytes: &[u8]) -> Result<(), ModemError> {
        self.write(bytes)
    }

    fn write_data_fdma(&mut self, bytes: &[u8]) -> Result<(), ModemError> {
        self.write(bytes)
    }

    fn write_start_tdma(&mut self) -> Result<(), ModemError> {
        Ok(())
    }

    fn write_start_fdma(&mut self) -> Result<(), ModemError> {
        Ok(())
    }

    fn send_cw_id(&mut self, _callsign: &str) -> Result<(), ModemError> {
        Ok(())
    }

    fn clear_p25_data(&mut self) {}
}

/// UART-connected modem (a physical MMDVM board on a serial port).
pub struct SerialModem {
    port: Box<dyn serialport::SerialPort>,
    open: bool,
}

impl SerialModem {
    pub fn new(path: &str, baud_rate: u32) -> Result<Self, ModemError> {
        let port = serialport::new(path, baud_rate)
            .timeout(Duration::from_millis(0))
            .open()?;
        Ok(Self { port, open: false })
    }

    fn read_nonblocking(&mut self, out: &mut [u8]) -> usize {
        match self.port.read(out) {
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => 0,
            Err(e) => {
                warn!(error = %e, "serial modem read error");
                0
            }
        }
    }
}

impl Modem for SerialModem {
    fn open(&mut self) -> Result<(), ModemError> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn clock(&mut self, _elapsed_ms: u64) {}

    fn has_lockout(&self) -> bool {
        false
    }

    fn has_error(&self) -> bool {
        !self.open
    }

    fn has_tx(&self) -> bool {
        false
    }

    fn is_hotspot(&self) -> bool {
        false
    }

    fn get_version(&self) -> Option<String> {
        None
    }

    fn has_space_tdma(&self) -> bool {
        self.open
    }

    fn has_space_fdma(&self) -> bool {
        self.open
    }

    fn read_data_tdma(&mut self, out: &mut [u8]) -> usize {
        self.read_nonblocking(out)
    }

    fn read_data_fdma(&mut self, out: &mut [u8]) -> usize {
        self.read_nonblocking(out)
    }

    fn write_data_tdma(&mut self, bytes: &[u8]) -> Result<(), ModemError> {
        self.port.write_all(bytes)?;
        Ok(())
    }

    fn write_data_fdma(&mut self, bytes: &[u8]) -> Result<(), ModemError> {
        self.port.write_all(bytes)?;
        Ok(())
    }

    fn write_start_tdma(&mut self) -> Result<(), ModemError> {
        Ok(())
    }

    fn write_start_fdma(&mut self) -> Result<(), ModemError> {
        Ok(())
    }

    fn send_cw_id(&mut self, _callsign: &str) -> Result<(), ModemError> {
        Ok(())
    }

    fn clear_p25_data(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_modem_loopback_injected_frame_is_readable() {
        let mut modem = NullModem::new();
        modem.open().unwrap();
        modem.inject_tdma(&[1, 2, 3]);
        let mut out = [0u8; 8];
        assert_eq!(modem.read_data_tdma(&mut out), 3);
        assert_eq!(&out[..3], &[1, 2, 3]);
    }

    #[test]
    fn null_modem_write_start_sets_tx_until_clocked() {
        let mut modem = NullModem::new();
        modem.open().unwrap();
        modem.write_start_tdma().unwrap();
        assert!(modem.has_tx());
        modem.clock(10);
        assert!(!modem.has_tx());
    }

    #[test]
    fn null_modem_rejects_writes_before_open() {
        let mut modem = NullModem::new();
        assert!(modem.write_data_tdma(&[1]).is_err());
    }

    #[test]
    fn empty_queue_reads_zero() {
        let mut modem = NullModem::new();
        modem.open().unwrap();
        let mut out = [0u8; 8];
        assert_eq!(modem.read_data_fdma(&mut out), 0);
    }
}
