//! The Host arbitrator (§4.1): single-threaded cooperative scheduler
//! owning the physical channel, both protocol Controls, the modem, and
//! the network adapter.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, HostConfig};
use crate::fdma;
use crate::lookup::{IdenTable, IdenTableHandle, IdenTableReloader};
use crate::modem::{Modem, ModemError};
use crate::network::Network;
use crate::site::SiteData;
use crate::tdma;
use crate::timer::Timer;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("modem error: {0}")]
    Modem(#[from] ModemError),
}

/// Top-level mode state machine (§4.1's diagram).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostState {
    #[default]
    Idle,
    Tdma,
    Fdma,
    Lockout,
    Error,
    Quit,
}

/// A clone-able handle that lets an external signal source (SIGINT, the
/// REST/RCON surface) request shutdown without touching Host state
/// directly (§5 "Cancellation / termination").
#[derive(Clone)]
pub struct StopHandle {
    killed: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.killed.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}

/// Which protocol, if either, is running as a dedicated trunking control
/// channel (§9: "simultaneous dual-protocol dual-CC" is rejected at
/// config-validation time, so at most one of these is ever true).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DedicatedCc {
    None,
    Tdma,
    Fdma,
}

pub struct Host {
    state: HostState,
    killed: Arc<AtomicBool>,
    fixed_mode: bool,
    dedicated_cc: DedicatedCc,

    site: SiteData,
    tdma: Option<tdma::Control>,
    fdma: Option<fdma::Control>,
    modem: Box<dyn Modem>,
    network: Box<dyn Network>,

    mode_hang: Timer,
    rf_mode_hang_ms: u64,
    net_mode_hang_ms: u64,

    dmr_beacon_interval: Timer,
    dmr_beacon_duration: Timer,
    dmr_beacon_interrupted: bool,

    cw_id: Timer,
    cw_id_enable: bool,
    cw_id_callsign: String,
    cw_in_progress: bool,

    lock_file_path: Option<PathBuf>,

    iden_table: IdenTableHandle,
    // Kept alive only to hold the reload thread open; never read directly.
    _iden_table_reloader: Option<IdenTableReloader>,
}

impl Host {
    pub fn new(
        config: HostConfig,
        modem: Box<dyn Modem>,
        network: Box<dyn Network>,
    ) -> Result<Self, HostError> {
        config.validate()?;

        let site = SiteData::new(
            config.system.config.site_model,
            config.system.config.net_id,
            config.system.config.site_id,
            config.system.config.par_id,
            false,
        );

        let dedicated_cc = if config.protocols.dmr.control {
            DedicatedCc::Tdma
        } else if config.protocols.p25.control {
            DedicatedCc::Fdma
        } else {
            DedicatedCc::None
        };

        let tdma = if config.protocols.dmr.enable {
            let mut control = tdma::Control::new(config.system.config.color_code, config.protocols.dmr.queue_size);
            control.set_enable_tscc(matches!(dedicated_cc, DedicatedCc::Tdma) || config.protocols.dmr.beacons);
            control.set_call_hang_ms(config.protocols.dmr.call_hang * 1000);
            control.set_tg_hang_ms(config.system.rf_talkgroup_hang * 1000);
            Some(control)
        } else {
            None
        };

        let fdma = if config.protocols.p25.enable {
            let mut control = fdma::Control::new(config.protocols.p25.queue_size);
            control.set_tdu_preamble_count(config.protocols.p25.tdu_preamble_count);
            control.set_call_hang_ms(config.protocols.p25.call_hang * 1000);
            if matches!(dedicated_cc, DedicatedCc::Fdma) {
                control.set_cc_mode(fdma::CcMode::Dedicated);
                control.set_cc_running(true);
            }
            Some(control)
        } else {
            None
        };

        // The beacon-interval and CW-ID timers drive their first cycle off
        // elapsed time since construction, not since some earlier event, so
        // they must already be running the moment the host comes up.
        let mut dmr_beacon_interval = Timer::new(60_000);
        if !matches!(dedicated_cc, DedicatedCc::Tdma) {
            dmr_beacon_interval.start_default();
        }

        let mut cw_id = Timer::new(config.system.cw_id.time * 1000);
        if config.system.cw_id.enable && !matches!(dedicated_cc, DedicatedCc::Tdma | DedicatedCc::Fdma) {
            cw_id.start_default();
        }

        // §5 "Auxiliary threads": a background thread periodically
        // re-reads the channel-identity table and swaps it in; a missing
        // or empty path just means the table stays empty (§7's "keep
        // previous table in memory" policy applied to "no table yet").
        let iden_table_file = config.system.iden_table.file.trim();
        let initial_iden_table = if iden_table_file.is_empty() {
            IdenTable::empty()
        } else {
            IdenTable::load(iden_table_file).unwrap_or_else(|err| {
                warn!(%err, file = iden_table_file, "initial channel-identity table load failed; starting empty");
                IdenTable::empty()
            })
        };
        let iden_table = IdenTableHandle::new(initial_iden_table);
        let iden_table_reloader = if !iden_table_file.is_empty() && config.system.iden_table.time > 0 {
            Some(IdenTableReloader::spawn(
                PathBuf::from(iden_table_file),
                std::time::Duration::from_secs(config.system.iden_table.time),
                iden_table.clone(),
            ))
        } else {
            None
        };

        Ok(Self {
            state: HostState::Idle,
            killed: Arc::new(AtomicBool::new(false)),
            fixed_mode: config.system.fixed_mode,
            dedicated_cc,
            site,
            tdma,
            fdma,
            modem,
            network,
            mode_hang: Timer::new(config.system.net_mode_hang * 1000),
            rf_mode_hang_ms: config.system.rf_mode_hang * 1000,
            net_mode_hang_ms: config.system.net_mode_hang * 1000,
            dmr_beacon_interval,
            dmr_beacon_duration: Timer::new(3_000),
            dmr_beacon_interrupted: false,
            cw_id,
            cw_id_enable: config.system.cw_id.enable,
            cw_id_callsign: config.system.cw_id.callsign,
            cw_in_progress: false,
            lock_file_path: config.system.lock_file.map(PathBuf::from),
            iden_table,
            _iden_table_reloader: iden_table_reloader,
        })
    }

    pub fn state(&self) -> HostState {
        self.state
    }

    /// Read-only handle onto the channel-identity table (§5, §6
    /// `system.iden_table`), reflecting the most recent successful reload.
    pub fn iden_table(&self) -> &IdenTableHandle {
        &self.iden_table
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            killed: Arc::clone(&self.killed),
        }
    }

    pub fn tdma(&self) -> Option<&tdma::Control> {
        self.tdma.as_ref()
    }

    pub fn fdma(&self) -> Option<&fdma::Control> {
        self.fdma.as_ref()
    }

    /// Run until the stop handle is triggered and outstanding TX drains
    /// (§5 "Cancellation / termination").
    pub fn run(&mut self) -> Result<(), HostError> {
        self.modem.open()?;
        if matches!(self.dedicated_cc, DedicatedCc::Tdma) {
            if let Some(tdma) = self.tdma.as_mut() {
                tdma.set_cc_running(true);
            }
        }

        let mut last_tick = Instant::now();
        loop {
            let elapsed_ms = last_tick.elapsed().as_millis() as u64;
            last_tick = Instant::now();

            if self.killed.load(Ordering::SeqCst) && self.state != HostState::Quit {
                if !self.modem.has_tx() {
                    self.begin_quit();
                }
            }

            self.tick(elapsed_ms);

            if self.state == HostState::Quit && !self.modem.has_tx() {
                break;
            }

            let sleep_ms = if self.state == HostState::Idle { 5 } else { 1 };
            std::thread::sleep(std::time::Duration::from_millis(sleep_ms));
        }

        self.modem.close();
        self.clear_lock_file();
        Ok(())
    }

    /// Execute one scheduler tick. Exposed separately from [`Host::run`]
    /// so tests can drive the state machine deterministically (§8
    /// concrete end-to-end scenarios) without depending on wall-clock
    /// sleeps.
    pub fn tick(&mut self, elapsed_ms: u64) {
        self.sync_modem_fault_state();

        self.modem.clock(elapsed_ms);
        self.network.clock(elapsed_ms);

        if let Some(tdma) = self.tdma.as_mut() {
            tdma.clock(elapsed_ms, &self.site);
        }
        if let Some(fdma) = self.fdma.as_mut() {
            fdma.clock(elapsed_ms, &self.site);
        }

        self.drain_fdma_network_out();
        self.drain_outbound();
        self.drain_inbound();
        self.drain_network_inbound();

        self.clock_mode_hang(elapsed_ms);
        self.run_beacon_scheduler(elapsed_ms);
        self.run_cw_id(elapsed_ms);
    }

    fn sync_modem_fault_state(&mut self) {
        let prev = self.state;
        if self.modem.has_lockout() && self.state != HostState::Lockout {
            self.set_state(HostState::Lockout);
        } else if !self.modem.has_lockout() && self.state == HostState::Lockout {
            self.set_state(HostState::Idle);
        }

        if self.modem.has_error() && self.state != HostState::Error {
            self.set_state(HostState::Error);
        } else if !self.modem.has_error() && self.state == HostState::Error {
            self.set_state(HostState::Idle);
        }

        if prev != self.state {
            debug!(from = ?prev, to = ?self.state, "host fault-state transition");
        }
    }

    /// Forward any adjacent-site identity frames FDMA queued this tick
    /// (`Control::write_adj_ss_network`) to the network adapter, the same
    /// way RF-originated frames reach it in `drain_inbound`.
    fn drain_fdma_network_out(&mut self) {
        let Some(fdma) = self.fdma.as_mut() else {
            return;
        };
        while let Some(frame) = fdma.take_network_frame() {
            let _ = self.network.send(&frame);
        }
    }

    fn drain_outbound(&mut self) {
        let mut buf = [0u8; 256];

        if let Some(tdma) = self.tdma.as_mut() {
            while self.modem.has_space_tdma() {
                let n1 = tdma.get_frame1(&mut buf);
                let n2 = if n1 == 0 { tdma.get_frame2(&mut buf) } else { 0 };
                let n = n1.max(n2);
                if n == 0 {
                    break;
                }
                self.note_protocol_traffic(HostState::Tdma, self.net_mode_hang_ms);
                if self.state == HostState::Tdma {
                    let _ = self.modem.write_data_tdma(&buf[..n]);
                    self.pause_cc_for_traffic(HostState::Tdma);
                }
            }
        }

        if let Some(fdma) = self.fdma.as_mut() {
            while self.modem.has_space_fdma() {
                let n = fdma.get_frame(&mut buf);
                if n == 0 {
                    break;
                }
                self.note_protocol_traffic(HostState::Fdma, self.net_mode_hang_ms);
                if self.state == HostState::Fdma {
                    let _ = self.modem.write_data_fdma(&buf[..n]);
                }
            }
        }
    }

    fn drain_inbound(&mut self) {
        let mut buf = [0u8; 256];

        if self.tdma.is_some() {
            loop {
                let n = self.modem.read_data_tdma(&mut buf);
                if n == 0 {
                    break;
                }
                let Some(frame) = crate::frame::Frame::from_wire(crate::frame::Protocol::Tdma, &buf[..n]) else {
                    warn!("dropping unparseable TDMA wire frame");
                    continue;
                };
                let accepted = self
                    .tdma
                    .as_mut()
                    .map(|t| t.process_frame(&frame))
                    .unwrap_or(false);
                if accepted {
                    self.note_protocol_traffic(HostState::Tdma, self.rf_mode_hang_ms);
                    self.pause_cc_for_traffic(HostState::Tdma);
                    let _ = self.network.send(&frame.to_network_wire());
                }
            }
        }

        if self.fdma.is_some() {
            loop {
                let n = self.modem.read_data_fdma(&mut buf);
                if n == 0 {
                    break;
                }
                let Some(frame) = crate::frame::Frame::from_wire(crate::frame::Protocol::Fdma, &buf[..n]) else {
                    warn!("dropping unparseable FDMA wire frame");
                    continue;
                };
                let was_halted = self.fdma.as_ref().is_some_and(|f| f.is_cc_halted());
                let accepted = self
                    .fdma
                    .as_mut()
                    .map(|f| f.process_frame(&frame))
                    .unwrap_or(false);
                if accepted {
                    self.note_protocol_traffic(HostState::Fdma, self.rf_mode_hang_ms);
                    // Dedicated CC halting (§4.4: "RF voice frames set a halt
                    // flag...causes the modem to be drained of pending CC
                    // bytes") needs the modem's P25 buffer cleared exactly on
                    // that transition, not on every subsequent traffic frame.
                    if !was_halted && self.fdma.as_ref().is_some_and(|f| f.is_cc_halted()) {
                        self.modem.clear_p25_data();
                    }
                    let _ = self.network.send(&frame.to_network_wire());
                }
            }
        }
    }

    /// Deliver network-originated frames to the matching protocol
    /// Control's `process_network` (§2 row J: "delivers network-originated
    /// frames to Slot/Control processNetwork").
    fn drain_network_inbound(&mut self) {
        let mut buf = [0u8; 256];
        loop {
            let n = self.network.receive(&mut buf);
            if n == 0 {
                break;
            }
            let Some(frame) = crate::frame::Frame::from_network_wire(&buf[..n]) else {
                warn!("dropping unparseable network wire frame");
                continue;
            };
            let accepted = match frame.protocol {
                crate::frame::Protocol::Tdma => self
                    .tdma
                    .as_mut()
                    .map(|t| t.process_network(&frame))
                    .unwrap_or(false),
                crate::frame::Protocol::Fdma => self
                    .fdma
                    .as_mut()
                    .map(|f| f.process_network(&frame))
                    .unwrap_or(false),
            };
            if accepted {
                let proto_state = match frame.protocol {
                    crate::frame::Protocol::Tdma => HostState::Tdma,
                    crate::frame::Protocol::Fdma => HostState::Fdma,
                };
                self.note_protocol_traffic(proto_state, self.net_mode_hang_ms);
            }
        }
    }

    /// Record that `proto` just handled traffic, transitioning the host
    /// into that protocol's state from IDLE and (re)starting the mode-hang
    /// timer with `hang_ms` — `netModeHang` for network-originated traffic
    /// drained out to the modem, `rfModeHang` for traffic just received off
    /// the air (§4.1's per-tick algorithm distinguishes the two).
    fn note_protocol_traffic(&mut self, proto: HostState, hang_ms: u64) {
        let can_transition = self.fixed_mode || self.state == HostState::Idle || self.state == proto;
        if can_transition && self.state != HostState::Lockout && self.state != HostState::Error {
            if self.state == HostState::Idle {
                self.mode_hang.start(hang_ms);
            }
            self.set_state(proto);
        }
    }

    fn pause_cc_for_traffic(&mut self, proto: HostState) {
        if proto == HostState::Tdma {
            if !self.dmr_beacon_interrupted && self.dmr_beacon_duration.is_running() {
                self.dmr_beacon_duration.stop();
                if let Some(tdma) = self.tdma.as_mut() {
                    tdma.set_cc_running(false);
                }
                self.dmr_beacon_interrupted = true;
            }
        }
    }

    fn clock_mode_hang(&mut self, elapsed_ms: u64) {
        if self.fixed_mode {
            self.force_fixed_mode();
            return;
        }
        self.mode_hang.clock(elapsed_ms);
        if self.mode_hang.has_expired() && matches!(self.state, HostState::Tdma | HostState::Fdma) {
            self.mode_hang.stop();
            self.set_state(HostState::Idle);
        }
    }

    fn force_fixed_mode(&mut self) {
        if self.modem.has_tx() {
            return;
        }
        let forced = if self.tdma.is_some() {
            HostState::Tdma
        } else if self.fdma.is_some() {
            HostState::Fdma
        } else {
            return;
        };
        if self.state != HostState::Lockout && self.state != HostState::Error {
            self.set_state(forced);
        }
    }

    fn run_beacon_scheduler(&mut self, elapsed_ms: u64) {
        if matches!(self.dedicated_cc, DedicatedCc::Tdma) {
            // Dedicated CC runs perpetually; duration is never clocked.
            return;
        }
        if self.tdma.is_none() {
            return;
        }
        if !matches!(self.state, HostState::Idle | HostState::Tdma) {
            return;
        }

        if !self.dmr_beacon_duration.is_running() && !self.dmr_beacon_interrupted {
            self.dmr_beacon_interval.clock(elapsed_ms);
            if self.dmr_beacon_interval.has_expired() {
                self.dmr_beacon_interval.stop();
                self.dmr_beacon_duration.start_default();
                if let Some(tdma) = self.tdma.as_mut() {
                    tdma.set_cc_running(true);
                }
            }
        } else if self.dmr_beacon_duration.is_running() {
            self.dmr_beacon_duration.clock(elapsed_ms);
            if self.dmr_beacon_duration.has_expired() {
                self.dmr_beacon_duration.stop();
                if let Some(tdma) = self.tdma.as_mut() {
                    tdma.set_cc_running(false);
                }
                self.dmr_beacon_interval.start_default();
            }
        }

        if self.dmr_beacon_interrupted && self.state == HostState::Idle {
            self.dmr_beacon_interrupted = false;
            self.dmr_beacon_interval.start_default();
        }
    }

    fn run_cw_id(&mut self, elapsed_ms: u64) {
        if !self.cw_id_enable || matches!(self.dedicated_cc, DedicatedCc::Tdma | DedicatedCc::Fdma) {
            return;
        }

        if self.cw_in_progress {
            if !self.modem.has_tx() {
                self.cw_in_progress = false;
                self.cw_id.start_default();
            }
            return;
        }

        self.cw_id.clock(elapsed_ms);
        if self.cw_id.has_expired() && !self.modem.has_tx() {
            if self.modem.send_cw_id(&self.cw_id_callsign).is_ok() {
                self.cw_in_progress = true;
            } else {
                self.cw_id.start_default();
            }
        }
    }

    fn set_state(&mut self, state: HostState) {
        if self.state == state {
            return;
        }
        let legal = match state {
            HostState::Lockout | HostState::Error | HostState::Quit => true,
            HostState::Idle => true,
            HostState::Tdma | HostState::Fdma => {
                self.state == HostState::Idle || self.state == state
            }
        };
        if !legal {
            warn!(from = ?self.state, to = ?state, "illegal host state transition suppressed");
            return;
        }
        info!(from = ?self.state, to = ?state, "host state transition");
        self.state = state;
        self.write_lock_file();
    }

    fn begin_quit(&mut self) {
        if matches!(self.dedicated_cc, DedicatedCc::Fdma) {
            if let Some(fdma) = self.fdma.as_mut() {
                fdma.set_cc_running(false);
            }
        }
        self.set_state(HostState::Quit);
    }

    fn write_lock_file(&self) {
        let Some(path) = self.lock_file_path.as_ref() else {
            return;
        };
        let contents = match self.state {
            HostState::Tdma => Some("DMR"),
            HostState::Fdma => Some("P25"),
            _ => None,
        };
        match contents {
            Some(tag) => {
                if let Err(err) = std::fs::write(path, tag) {
                    warn!(%err, "failed to write lock file");
                }
            }
            None => self.clear_lock_file(),
        }
    }

    fn clear_lock_file(&self) {
        if let Some(path) = self.lock_file_path.as_ref() {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostConfig;
    use crate::modem::NullModem;
    use crate::network::NullNetwork;

    fn host_with(config_mutator: impl FnOnce(&mut HostConfig)) -> Host {
        let mut config = HostConfig::default();
        config.protocols.dmr.enable = true;
        config_mutator(&mut config);
        Host::new(config, Box::new(NullModem::new()), Box::new(NullNetwork::new())).unwrap()
    }

    #[test]
    fn starts_idle() {
        let host = host_with(|_| {});
        assert_eq!(host.state(), HostState::Idle);
    }

    #[test]
    fn protocol_call_hang_and_talkgroup_hang_config_reach_the_slots() {
        let host = host_with(|c| {
            c.protocols.dmr.call_hang = 9;
            c.system.rf_talkgroup_hang = 21;
        });
        assert_eq!(host.tdma.as_ref().unwrap().slot(1).call_hang_timeout_ms(), 9_000);
        assert_eq!(host.tdma.as_ref().unwrap().slot(1).tg_hang_timeout_ms(), 21_000);
    }

    #[test]
    fn iden_table_loads_from_configured_file_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iden_table.dat");
        std::fs::write(&path, "1,851000000,-45000000,12500\n").unwrap();
        let host = host_with(|c| {
            c.system.iden_table.file = path.to_string_lossy().into_owned();
            c.system.iden_table.time = 0;
        });
        assert_eq!(host.iden_table().len(), 1);
    }

    #[test]
    fn missing_iden_table_file_starts_empty_rather_than_failing_construction() {
        let host = host_with(|c| {
            c.system.iden_table.file = "/nonexistent/iden_table.dat".to_string();
        });
        assert!(host.iden_table().is_empty());
    }

    fn tdma_voice_header_wire() -> Vec<u8> {
        crate::frame::Frame::new(
            crate::frame::Protocol::Tdma,
            1,
            crate::frame::FrameKind::VoiceHeader,
            vec![0u8; 11],
        )
        .to_wire()
    }

    #[test]
    fn rf_traffic_transitions_idle_to_tdma_and_starts_mode_hang() {
        let mut host = host_with(|_| {});
        host.modem.open().unwrap();
        let mut modem = NullModem::new();
        modem.open().unwrap();
        modem.inject_tdma(&tdma_voice_header_wire());
        host.modem = Box::new(modem);
        host.tick(10);
        assert_eq!(host.state(), HostState::Tdma);
        assert!(host.mode_hang.is_running());
    }

    #[test]
    fn mode_hang_expiry_returns_to_idle() {
        // `rf_mode_hang` seconds becomes the mode-hang timeout in ms; picked
        // so the triggering tick's own elapsed time can't exhaust it (the
        // timer is armed and clocked within that same tick per §4.1's
        // pseudocode), only a later tick with no further traffic does.
        let mut host = host_with(|c| c.system.rf_mode_hang = 1);
        let mut modem = NullModem::new();
        modem.open().unwrap();
        modem.inject_tdma(&tdma_voice_header_wire());
        host.modem = Box::new(modem);
        host.tick(10);
        assert_eq!(host.state(), HostState::Tdma);
        host.tick(1_200);
        assert_eq!(host.state(), HostState::Idle);
    }

    #[test]
    fn fixed_mode_forces_single_protocol_state() {
        let mut host = host_with(|c| c.system.fixed_mode = true);
        let mut modem = NullModem::new();
        modem.open().unwrap();
        host.modem = Box::new(modem);
        host.tick(10);
        assert_eq!(host.state(), HostState::Tdma);
    }

    #[test]
    fn lockout_flag_forces_lockout_state() {
        struct LockoutModem(NullModem);
        impl Modem for LockoutModem {
            fn open(&mut self) -> Result<(), ModemError> {
                self.0.open()
            }
            fn close(&mut self) {
                self.0.close()
            }
            fn clock(&mut self, ms: u64) {
                self.0.clock(ms)
            }
            fn has_lockout(&self) -> bool {
                true
            }
            fn has_error(&self) -> bool {
                self.0.has_error()
            }
            fn has_tx(&self) -> bool {
                self.0.has_tx()
            }
            fn is_hotspot(&self) -> bool {
                false
            }
            fn get_version(&self) -> Option<String> {
                None
            }
            fn has_space_tdma(&self) -> bool {
                self.0.has_space_tdma()
            }
            fn has_space_fdma(&self) -> bool {
                self.0.has_space_fdma()
            }
            fn read_data_tdma(&mut self, out: &mut [u8]) -> usize {
                self.0.read_data_tdma(out)
            }
            fn read_data_fdma(&mut self, out: &mut [u8]) -> usize {
                self.0.read_data_fdma(out)
            }
            fn write_data_tdma(&mut self, bytes: &[u8]) -> Result<(), ModemError> {
                self.0.write_data_tdma(bytes)
            }
            fn write_data_fdma(&mut self, bytes: &[u8]) -> Result<(), ModemError> {
                self.0.write_data_fdma(bytes)
            }
            fn write_start_tdma(&mut self) -> Result<(), ModemError> {
                self.0.write_start_tdma()
            }
            fn write_start_fdma(&mut self) -> Result<(), ModemError> {
                self.0.write_start_fdma()
            }
            fn send_cw_id(&mut self, callsign: &str) -> Result<(), ModemError> {
                self.0.send_cw_id(callsign)
            }
            fn clear_p25_data(&mut self) {
                self.0.clear_p25_data()
            }
        }

        let mut host = host_with(|_| {});
        let mut inner = NullModem::new();
        inner.open().unwrap();
        host.modem = Box::new(LockoutModem(inner));
        host.tick(10);
        assert_eq!(host.state(), HostState::Lockout);
    }

    #[test]
    fn stop_handle_requests_quit_when_modem_idle() {
        let mut host = host_with(|_| {});
        let mut modem = NullModem::new();
        modem.open().unwrap();
        host.modem = Box::new(modem);
        let handle = host.stop_handle();
        handle.stop();
        host.begin_quit();
        assert_eq!(host.state(), HostState::Quit);
    }

    #[test]
    fn dedicated_fdma_cc_halt_clears_the_modem_p25_buffer_exactly_once() {
        struct CountingClearModem {
            inner: NullModem,
            clears: std::rc::Rc<std::cell::Cell<u32>>,
        }
        impl Modem for CountingClearModem {
            fn open(&mut self) -> Result<(), ModemError> {
                self.inner.open()
            }
            fn close(&mut self) {
                self.inner.close()
            }
            fn clock(&mut self, ms: u64) {
                self.inner.clock(ms)
            }
            fn has_lockout(&self) -> bool {
                self.inner.has_lockout()
            }
            fn has_error(&self) -> bool {
                self.inner.has_error()
            }
            fn has_tx(&self) -> bool {
                self.inner.has_tx()
            }
            fn is_hotspot(&self) -> bool {
                false
            }
            fn get_version(&self) -> Option<String> {
                None
            }
            fn has_space_tdma(&self) -> bool {
                self.inner.has_space_tdma()
            }
            fn has_space_fdma(&self) -> bool {
                self.inner.has_space_fdma()
            }
            fn read_data_tdma(&mut self, out: &mut [u8]) -> usize {
                self.inner.read_data_tdma(out)
            }
            fn read_data_fdma(&mut self, out: &mut [u8]) -> usize {
                self.inner.read_data_fdma(out)
            }
            fn write_data_tdma(&mut self, bytes: &[u8]) -> Result<(), ModemError> {
                self.inner.write_data_tdma(bytes)
            }
            fn write_data_fdma(&mut self, bytes: &[u8]) -> Result<(), ModemError> {
                self.inner.write_data_fdma(bytes)
            }
            fn write_start_tdma(&mut self) -> Result<(), ModemError> {
                self.inner.write_start_tdma()
            }
            fn write_start_fdma(&mut self) -> Result<(), ModemError> {
                self.inner.write_start_fdma()
            }
            fn send_cw_id(&mut self, callsign: &str) -> Result<(), ModemError> {
                self.inner.send_cw_id(callsign)
            }
            fn clear_p25_data(&mut self) {
                self.clears.set(self.clears.get() + 1);
            }
        }

        let mut host = host_with(|c| {
            c.protocols.dmr.enable = false;
            c.protocols.p25.enable = true;
            c.protocols.p25.control = true;
            c.system.duplex = true;
        });
        let clears = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut inner = NullModem::new();
        inner.open().unwrap();
        inner.inject_fdma(&crate::frame::Frame::new(
            crate::frame::Protocol::Fdma,
            0,
            crate::frame::FrameKind::VoiceHeader,
            vec![0u8; 18],
        ).to_wire());
        // A second traffic frame arriving while already halted must not
        // clear the modem buffer a second time.
        inner.inject_fdma(&crate::frame::Frame::new(
            crate::frame::Protocol::Fdma,
            0,
            crate::frame::FrameKind::VoiceSuperframe(0),
            vec![0u8; 18],
        ).to_wire());
        host.modem = Box::new(CountingClearModem {
            inner,
            clears: clears.clone(),
        });
        assert!(host.fdma.as_ref().unwrap().is_cc_running());

        host.tick(10);

        assert!(host.fdma.as_ref().unwrap().is_cc_halted());
        assert_eq!(clears.get(), 1);
    }

    #[test]
    fn network_originated_frame_reaches_tdma_control_and_transitions_host() {
        let mut host = host_with(|_| {});
        let mut modem = NullModem::new();
        modem.open().unwrap();
        host.modem = Box::new(modem);

        let frame = crate::frame::Frame::new(
            crate::frame::Protocol::Tdma,
            1,
            crate::frame::FrameKind::VoiceHeader,
            vec![0u8; 11],
        );
        let mut net = crate::network::NullNetwork::new();
        net.inject(&frame.to_network_wire());
        host.network = Box::new(net);

        host.tick(10);
        assert_eq!(host.state(), HostState::Tdma);
        assert_eq!(
            host.tdma.as_ref().unwrap().slot(1).net_state(),
            crate::tdma::NetState::Audio
        );
    }

    struct SpyNetwork {
        sent: std::sync::Arc<std::sync::Mutex<Vec<Vec<u8>>>>,
    }

    impl crate::network::Network for SpyNetwork {
        fn clock(&mut self, _elapsed_ms: u64) {}
        fn is_connected(&self) -> bool {
            true
        }
        fn send(&mut self, bytes: &[u8]) -> Result<(), crate::network::NetworkError> {
            self.sent.lock().unwrap().push(bytes.to_vec());
            Ok(())
        }
        fn receive(&mut self, _out: &mut [u8]) -> usize {
            0
        }
    }

    #[test]
    fn adj_site_broadcast_reaches_the_network_adapter() {
        let mut host = host_with(|c| {
            c.protocols.p25.enable = true;
        });
        let sent = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        host.network = Box::new(SpyNetwork { sent: sent.clone() });

        host.tick(10_000);

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0][0] & 0x7F, crate::frame::FrameKind::Csbk.code());
    }
}
