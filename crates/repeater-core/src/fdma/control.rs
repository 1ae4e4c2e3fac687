//! FDMA Control: single-channel state machine, structurally parallel to
//! a TDMA [`crate::tdma::slot::Slot`] but running continuously on one
//! channel with no slot concept (§4.4).

use std::collections::VecDeque;

use tracing::{debug, trace, warn};

use crate::csbk::{self, Csbk, Tsbk};
use crate::frame::{CallType, Frame, FrameKind, LinkControl, Protocol};
use crate::ring::RingBuffer;
use crate::site::SiteData;
use crate::timer::Timer;

/// Continuous-CC vs. burst-CC operating mode (§4.4 "CC operation").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcMode {
    /// The unit is in CC mode indefinitely; the duration timer is never
    /// advanced.
    Dedicated,
    /// Interval+duration timers cycle; RF traffic pauses the duration
    /// timer.
    Burst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RfState {
    #[default]
    Idle,
    Audio,
    Data,
    Tsbk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetState {
    #[default]
    Idle,
    Audio,
    Data,
}

pub struct Control {
    rf_state: RfState,
    net_state: NetState,
    rf_lc: Option<LinkControl>,
    net_watchdog: Timer,
    call_hang: Timer,

    ring: RingBuffer,
    net_out: VecDeque<Vec<u8>>,

    cc_mode: CcMode,
    cc_running: bool,
    cc_halted: bool,
    cc_duration: Timer,
    cc_interval: Timer,
    tsbk_interval: Timer,
    adj_site_timer: Timer,

    tdu_preamble_count: u8,
}

impl Control {
    pub fn new(queue_size: usize) -> Self {
        let mut adj_site_timer = Timer::new(10_000);
        adj_site_timer.start_default();
        Self {
            rf_state: RfState::Idle,
            net_state: NetState::Idle,
            rf_lc: None,
            net_watchdog: Timer::new(2_000),
            call_hang: Timer::new(5_000),
            ring: RingBuffer::new(queue_size),
            net_out: VecDeque::new(),
            cc_mode: CcMode::Burst,
            cc_running: false,
            cc_halted: false,
            cc_duration: Timer::new(3_000),
            cc_interval: Timer::new(60_000),
            tsbk_interval: Timer::new(180),
            adj_site_timer,
            tdu_preamble_count: 8,
        }
    }

    pub fn set_cc_mode(&mut self, mode: CcMode) {
        self.cc_mode = mode;
    }

    pub fn set_tdu_preamble_count(&mut self, count: u8) {
        self.tdu_preamble_count = count;
    }

    /// Apply `protocols.p25.callHang` (§6 config table).
    pub fn set_call_hang_ms(&mut self, ms: u64) {
        self.call_hang = Timer::new(ms);
    }

    pub fn tdu_preamble_count(&self) -> u8 {
        self.tdu_preamble_count
    }

    pub fn rf_state(&self) -> RfState {
        self.rf_state
    }

    pub fn net_state(&self) -> NetState {
        self.net_state
    }

    pub fn is_cc_running(&self) -> bool {
        self.cc_running
    }

    pub fn is_cc_halted(&self) -> bool {
        self.cc_halted
    }

    pub fn set_cc_running(&mut self, running: bool) {
        self.cc_running = running;
        if running {
            self.cc_duration.start_default();
            self.cc_interval.stop();
        } else {
            self.cc_duration.stop();
            self.cc_interval.start_default();
        }
    }

    /// Process an inbound RF frame. In dedicated-CC mode, RF voice/data
    /// halts the CC and drains any pending CC bytes instead of pausing
    /// (§4.4: "RF voice frames set a halt flag...causes the modem to be
    /// drained of pending CC bytes").
    pub fn process_frame(&mut self, frame: &Frame) -> bool {
        debug_assert_eq!(frame.protocol, Protocol::Fdma);

        let is_traffic = frame.is_voice() || frame.is_data();
        if is_traffic && self.cc_running {
            match self.cc_mode {
                CcMode::Dedicated => {
                    self.cc_halted = true;
                }
                CcMode::Burst => {
                    self.cc_duration.pause();
                }
            }
        }

        match frame.kind {
            FrameKind::VoiceHeader => {
                self.rf_lc = Some(LinkControl::new(CallType::Group, 0, 0));
                self.rf_state = RfState::Audio;
                self.enqueue(&frame.to_wire());
                true
            }
            FrameKind::VoiceSuperframe(seq) => {
                trace!(seq, "voice superframe");
                self.enqueue(&frame.to_wire());
                true
            }
            FrameKind::VoiceTerminator => {
                debug!("call ended");
                self.enqueue(&frame.to_wire());
                self.call_hang.start_default();
                self.rf_state = RfState::Idle;
                self.resume_cc_after_traffic();
                true
            }
            FrameKind::DataHeader => {
                self.rf_state = RfState::Data;
                true
            }
            FrameKind::DataBlock => {
                self.enqueue(&frame.to_wire());
                self.rf_state = RfState::Idle;
                self.resume_cc_after_traffic();
                true
            }
            FrameKind::Csbk => {
                self.rf_state = RfState::Tsbk;
                match csbk::decode(&frame.payload) {
                    Ok(decoded) => {
                        let forward = Frame::new(frame.protocol, frame.slot, FrameKind::Csbk, csbk::encode(&decoded).to_vec());
                        self.enqueue(&forward.to_wire());
                    }
                    Err(_) => {
                        if let Ok(regenerated) = csbk::regenerate(&frame.payload) {
                            let forward = Frame::new(frame.protocol, frame.slot, FrameKind::Csbk, regenerated.to_vec());
                            self.enqueue(&forward.to_wire());
                        }
                    }
                }
                self.rf_state = RfState::Idle;
                true
            }
            FrameKind::IdleFill | FrameKind::Wakeup => false,
        }
    }

    pub fn process_network(&mut self, frame: &Frame) -> bool {
        if self.rf_state != RfState::Idle {
            return false;
        }
        self.net_state = match frame.kind {
            FrameKind::VoiceHeader | FrameKind::VoiceSuperframe(_) => NetState::Audio,
            FrameKind::VoiceTerminator => {
                self.net_watchdog.stop();
                NetState::Idle
            }
            FrameKind::DataHeader | FrameKind::DataBlock => NetState::Data,
            _ => self.net_state,
        };
        self.net_watchdog.start_default();
        self.enqueue(&frame.to_wire());
        true
    }

    fn resume_cc_after_traffic(&mut self) {
        match self.cc_mode {
            CcMode::Dedicated => self.cc_halted = false,
            CcMode::Burst => self.cc_duration.resume(),
        }
    }

    pub fn get_frame(&mut self, out: &mut [u8]) -> usize {
        self.ring.get(out)
    }

    /// Pop the next network-bound frame queued by [`Self::write_adj_ss_network`],
    /// if any (§4.4 "Network path"). The Host drains these into the
    /// `Network` adapter the same way it forwards RF-originated frames.
    pub fn take_network_frame(&mut self) -> Option<Vec<u8>> {
        self.net_out.pop_front()
    }

    /// Advance timers; emit TSBK trunking traffic and periodic
    /// adjacent-site network broadcasts while the CC is active.
    pub fn clock(&mut self, delta_ms: u64, site: &SiteData) {
        self.net_watchdog.clock(delta_ms);
        self.call_hang.clock(delta_ms);
        self.tsbk_interval.clock(delta_ms);
        self.adj_site_timer.clock(delta_ms);

        if self.cc_mode == CcMode::Burst {
            self.cc_duration.clock(delta_ms);
            self.cc_interval.clock(delta_ms);
            if self.cc_running && self.cc_duration.has_expired() {
                self.set_cc_running(false);
            }
            if !self.cc_running && self.cc_interval.has_expired() {
                self.set_cc_running(true);
            }
        }

        let writing_cc = self.cc_running && !self.cc_halted;
        if writing_cc && self.tsbk_interval.has_expired() {
            self.write_control_rf(site);
            self.tsbk_interval.start_default();
        }

        if self.adj_site_timer.has_expired() {
            self.write_adj_ss_network(site);
            self.adj_site_timer.start_default();
        }
    }

    /// Emit one TSBK of the control-channel script (§4.4 "Dedicated CC:
    /// writeControlRF() runs every tick that modem has space").
    fn write_control_rf(&mut self, site: &SiteData) {
        let tsbk: Tsbk = Csbk::BroadcastSiteId {
            last_block: true,
            system_identity: site.system_identity(false),
            color_code: 0,
        };
        let block = csbk::encode(&tsbk);
        let wire = Frame::new(Protocol::Fdma, 0, FrameKind::Csbk, block.to_vec()).to_wire();
        self.enqueue(&wire);
    }

    /// Periodically transmit adjacent-site identity to the network layer
    /// even outside an active call (§4.4 "Network path"). Queued for the
    /// Host to drain into the `Network` adapter rather than sent directly —
    /// this `Control` has no network handle of its own, the same split
    /// that keeps `get_frame`'s ring modem-bound.
    fn write_adj_ss_network(&mut self, site: &SiteData) {
        let tsbk: Tsbk = Csbk::BroadcastAdjacentSite {
            last_block: true,
            adjacent_system_identity: site.system_identity(true),
            channel_number: 1,
        };
        let block = csbk::encode(&tsbk);
        let frame = Frame::new(Protocol::Fdma, 0, FrameKind::Csbk, block.to_vec());
        self.net_out.push_back(frame.to_network_wire());
    }

    fn enqueue(&mut self, bytes: &[u8]) {
        if let Err(err) = self.ring.add(bytes) {
            warn!(%err, "FDMA outbound ring full; dropping frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::SiteModel;

    fn site() -> SiteData {
        SiteData::new(SiteModel::Small, 1, 1, 3, false)
    }

    #[test]
    fn call_hang_configuration_overrides_default_timeout() {
        let mut control = Control::new(8192);
        control.set_call_hang_ms(9_000);
        assert_eq!(control.call_hang.timeout(), 9_000);
    }

    #[test]
    fn voice_header_transitions_to_audio() {
        let mut control = Control::new(8192);
        let frame = Frame::new(Protocol::Fdma, 0, FrameKind::VoiceHeader, vec![0u8; 18]);
        assert!(control.process_frame(&frame));
        assert_eq!(control.rf_state(), RfState::Audio);
    }

    #[test]
    fn dedicated_cc_halts_instead_of_pausing_on_rf_traffic() {
        let mut control = Control::new(8192);
        control.set_cc_mode(CcMode::Dedicated);
        control.set_cc_running(true);
        let frame = Frame::new(Protocol::Fdma, 0, FrameKind::VoiceHeader, vec![0u8; 18]);
        control.process_frame(&frame);
        assert!(control.is_cc_halted());
        let terminator = Frame::new(Protocol::Fdma, 0, FrameKind::VoiceTerminator, vec![0u8; 18]);
        control.process_frame(&terminator);
        assert!(!control.is_cc_halted());
    }

    #[test]
    fn burst_cc_pauses_duration_timer_and_resumes_after_traffic() {
        let mut control = Control::new(8192);
        control.set_cc_mode(CcMode::Burst);
        control.set_cc_running(true);
        control.clock(1_000, &site());
        let frame = Frame::new(Protocol::Fdma, 0, FrameKind::DataHeader, vec![0u8; 18]);
        control.process_frame(&frame);
        assert!(control.cc_duration.is_paused());
        let block = Frame::new(Protocol::Fdma, 0, FrameKind::DataBlock, vec![0u8; 18]);
        control.process_frame(&block);
        assert!(!control.cc_duration.is_paused());
    }

    #[test]
    fn csbk_regenerate_fallthrough_forwards_unknown_opcode() {
        let mut control = Control::new(8192);
        let header = crate::signalling::BlockHeader {
            last_block: true,
            pf: false,
            opcode: 0x3E,
            fid: 0,
        };
        let block = crate::signalling::build_block(header, [0u8; 8]);
        let frame = Frame::new(Protocol::Fdma, 0, FrameKind::Csbk, block.to_vec());
        assert!(control.process_frame(&frame));
        let mut out = [0u8; 32];
        let n = control.get_frame(&mut out);
        assert_eq!(out[0] & 0x7F, FrameKind::Csbk.code());
        assert_eq!(&out[1..11], &block[..10]);
        let _ = n;
    }

    #[test]
    fn adj_site_timer_expiry_queues_a_network_frame() {
        let mut control = Control::new(8192);
        assert!(control.take_network_frame().is_none());
        control.clock(10_000, &site());
        let frame = control.take_network_frame().expect("adjacent-site frame queued");
        assert_eq!(frame[0] & 0x7F, FrameKind::Csbk.code());
        assert!(control.take_network_frame().is_none());
    }
}
