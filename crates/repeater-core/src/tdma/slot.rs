//! One TDMA time slot (§4.2 "TDMA Slot").
//!
//! A `Slot` is logically an independent repeater channel; two of them
//! share one RF path under a [`super::control::Control`]. The RF and
//! network state variables are orthogonal: at most one is non-`Idle` at
//! a time (half-duplex call ownership), enforced in [`Slot::process_frame`]
//! and [`Slot::process_network`].

use tracing::{debug, trace, warn};

use crate::csbk::{self, Csbk};
use crate::frame::{CallType, Frame, FrameKind, LinkControl, Protocol};
use crate::ring::RingBuffer;
use crate::timer::Timer;

/// In-progress reception from the air.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RfState {
    #[default]
    Idle,
    Audio,
    Data,
    Csbk,
    Rejected,
}

/// In-progress reception from the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetState {
    #[default]
    Idle,
    Audio,
    Data,
}

/// `setTSCCActivated` state used only by short-LC generation (§9 open
/// question: cleared on the same transition that drops RF-state back to
/// `Idle`, so a stale activation never outlives its call).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsccActivation {
    pub dst_id: u32,
    pub group: bool,
    pub voice: bool,
}

/// Accumulated per-call quality counters, reported on call end (§7).
#[derive(Debug, Clone, Copy, Default)]
pub struct CallStats {
    pub frames: u64,
    pub bit_errors: u64,
}

/// A partially-received data session (§4.2 "Data header/block").
struct DataSession {
    blocks_expected: u16,
    blocks_received: u16,
    buffer: Vec<u8>,
}

pub struct Slot {
    slot_no: u8,
    color_code: u8,
    enable_tscc: bool,

    rf_state: RfState,
    net_state: NetState,
    rf_lc: Option<LinkControl>,
    net_lc: Option<LinkControl>,
    last_dst_id: Option<u32>,
    tscc_activation: Option<TsccActivation>,

    data_session: Option<DataSession>,

    call_hang: Timer,
    tg_hang: Timer,
    rf_timeout: Timer,
    net_watchdog: Timer,

    rf_stats: CallStats,
    net_frame_count: u64,

    ring: RingBuffer,
}

impl Slot {
    pub fn new(slot_no: u8, color_code: u8, ring_capacity: usize) -> Self {
        Self {
            slot_no,
            color_code,
            enable_tscc: false,
            rf_state: RfState::Idle,
            net_state: NetState::Idle,
            rf_lc: None,
            net_lc: None,
            last_dst_id: None,
            tscc_activation: None,
            data_session: None,
            call_hang: Timer::new(5_000),
            tg_hang: Timer::new(10_000),
            rf_timeout: Timer::new(180_000),
            net_watchdog: Timer::new(2_000),
            rf_stats: CallStats::default(),
            net_frame_count: 0,
            ring: RingBuffer::new(ring_capacity),
        }
    }

    pub fn slot_no(&self) -> u8 {
        self.slot_no
    }

    pub fn rf_state(&self) -> RfState {
        self.rf_state
    }

    pub fn net_state(&self) -> NetState {
        self.net_state
    }

    pub fn set_enable_tscc(&mut self, enable: bool) {
        self.enable_tscc = enable;
    }

    pub fn rf_stats(&self) -> CallStats {
        self.rf_stats
    }

    /// Configure the call-hang timeout, in milliseconds (`callHang`).
    pub fn set_call_hang_ms(&mut self, ms: u64) {
        self.call_hang = Timer::new(ms);
    }

    /// Configure the rapid-rekey talkgroup-hang timeout (`rfTalkgroupHang`).
    pub fn set_tg_hang_ms(&mut self, ms: u64) {
        self.tg_hang = Timer::new(ms);
    }

    #[cfg(test)]
    pub(crate) fn call_hang_timeout_ms(&self) -> u64 {
        self.call_hang.timeout()
    }

    #[cfg(test)]
    pub(crate) fn tg_hang_timeout_ms(&self) -> u64 {
        self.tg_hang.timeout()
    }

    /// Advance every per-slot timer by `delta_ms` and react to expiry
    /// (§4.2 "Failure semantics").
    pub fn clock(&mut self, delta_ms: u64) {
        self.call_hang.clock(delta_ms);
        self.tg_hang.clock(delta_ms);
        self.rf_timeout.clock(delta_ms);
        self.net_watchdog.clock(delta_ms);

        if self.call_hang.has_expired() {
            self.call_hang.stop();
            self.last_dst_id = None;
        }

        if self.rf_timeout.has_expired() && self.rf_state != RfState::Idle {
            warn!(slot = self.slot_no, "RF timeout; forcing call end");
            self.end_rf_call();
        }

        if self.net_watchdog.has_expired() && self.net_state != NetState::Idle {
            warn!(slot = self.slot_no, "network watchdog expired; flushing call");
            self.net_state = NetState::Idle;
            self.net_lc = None;
        }
    }

    /// Classify and act on an inbound RF frame. Returns `true` if the
    /// frame was accepted into a call context, signalling the Host that
    /// the mode-hang timer should (re)start.
    pub fn process_frame(&mut self, frame: &Frame) -> bool {
        if self.net_state != NetState::Idle && !self.tg_hang.has_expired() {
            // Network call in progress and its hang hasn't cleared: RF
            // does not interrupt (§3 invariants).
            debug!(slot = self.slot_no, "RF frame dropped; network call active");
            return false;
        }

        match frame.kind {
            FrameKind::VoiceHeader => {
                let lc = LinkControl::new(CallType::Group, read_id24(&frame.payload, 0), read_id24(&frame.payload, 3));
                self.rf_lc = Some(lc);
                self.rf_state = RfState::Audio;
                self.rf_timeout.start_default();
                self.rf_stats = CallStats::default();
                self.enqueue(&frame.to_wire());
                true
            }
            FrameKind::VoiceSuperframe(seq) => {
                if self.rf_state != RfState::Audio {
                    self.rf_state = RfState::Audio;
                    self.rf_timeout.start_default();
                }
                trace!(slot = self.slot_no, seq, "voice superframe");
                self.rf_stats.frames += 1;
                self.enqueue(&frame.to_wire());
                true
            }
            FrameKind::VoiceTerminator => {
                debug!(
                    slot = self.slot_no,
                    frames = self.rf_stats.frames,
                    errors = self.rf_stats.bit_errors,
                    "call ended"
                );
                self.enqueue(&frame.to_wire());
                self.last_dst_id = self.rf_lc.as_ref().map(|lc| lc.dst_id);
                self.tg_hang.start_default();
                self.call_hang.start_default();
                self.rf_state = RfState::Idle;
                self.rf_timeout.stop();
                true
            }
            FrameKind::DataHeader => {
                self.rf_state = RfState::Data;
                self.data_session = Some(DataSession {
                    blocks_expected: frame.payload.first().copied().unwrap_or(0) as u16,
                    blocks_received: 0,
                    buffer: Vec::new(),
                });
                self.rf_timeout.start_default();
                true
            }
            FrameKind::DataBlock => {
                let done = if let Some(session) = self.data_session.as_mut() {
                    session.buffer.extend_from_slice(&frame.payload);
                    session.blocks_received += 1;
                    session.blocks_received >= session.blocks_expected
                } else {
                    // A data block with no open header: dropped session.
                    false
                };
                if done {
                    if let Some(session) = self.data_session.take() {
                        let reassembled = Frame::new(frame.protocol, frame.slot, FrameKind::DataBlock, session.buffer);
                        self.enqueue(&reassembled.to_wire());
                    }
                    self.rf_state = RfState::Idle;
                    self.rf_timeout.stop();
                }
                true
            }
            FrameKind::Csbk => {
                self.rf_state = RfState::Csbk;
                match csbk::decode(&frame.payload) {
                    Ok(decoded) => {
                        self.apply_csbk(&decoded);
                        let block = csbk::encode(&decoded);
                        let forward = Frame::new(frame.protocol, frame.slot, FrameKind::Csbk, block.to_vec());
                        self.enqueue(&forward.to_wire());
                    }
                    Err(err) => {
                        debug!(slot = self.slot_no, %err, "CSBK failed to decode; regenerating");
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

    /// Service network-originated traffic for this slot (§4.1 per-tick
    /// algorithm: "clocks both Controls, which service network-originated
    /// traffic").
    pub fn process_network(&mut self, frame: &Frame) -> bool {
        if self.rf_state != RfState::Idle {
            debug!(slot = self.slot_no, "network frame dropped; RF call active");
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
        self.net_frame_count += 1;
        self.enqueue(&frame.to_wire());
        true
    }

    fn apply_csbk(&mut self, csbk: &Csbk) {
        if csbk.is_channel_grant() {
            if let Csbk::GrantVoiceChannel { dst_id, .. } | Csbk::GrantDataChannel { dst_id, .. } =
                csbk
            {
                self.tscc_activation = Some(TsccActivation {
                    dst_id: *dst_id,
                    group: true,
                    voice: matches!(csbk, Csbk::GrantVoiceChannel { .. }),
                });
            }
        }
    }

    fn end_rf_call(&mut self) {
        self.rf_state = RfState::Idle;
        self.rf_timeout.stop();
        self.tscc_activation = None;
    }

    /// Pop the next queued outbound frame; `0` if empty (§4.2 `getFrame`).
    pub fn get_frame(&mut self, out: &mut [u8]) -> usize {
        self.ring.get(out)
    }

    /// Compact 68-bit short-LC field (represented in the low 68 bits of a
    /// `u128`), regenerated on every state change (§4.2 "Short-LC").
    pub fn short_lc(&self) -> u128 {
        let voice = matches!(self.rf_state, RfState::Audio) as u128;
        let dst = self
            .tscc_activation
            .map(|a| a.dst_id as u128)
            .or_else(|| self.rf_lc.as_ref().map(|lc| lc.dst_id as u128))
            .unwrap_or(0);
        ((self.slot_no as u128) << 33) | (voice << 32) | (dst & 0xFFFF_FFFF)
    }

    fn enqueue(&mut self, bytes: &[u8]) {
        if let Err(err) = self.ring.add(bytes) {
            warn!(slot = self.slot_no, %err, "outbound ring full; dropping frame");
        }
    }

    /// Queue a CSBK built outside the normal RF/network receive path
    /// (used by [`super::control::Control`]'s beacon scripter).
    pub(crate) fn enqueue_csbk(&mut self, bytes: &[u8]) -> Result<(), crate::ring::RingBufferError> {
        self.ring.add(bytes)
    }
}

/// A zero-slot TDMA frame belongs to either side of the repeater path.
pub fn protocol() -> Protocol {
    Protocol::Tdma
}

fn read_id24(payload: &[u8], offset: usize) -> u32 {
    if payload.len() < offset + 3 {
        return 0;
    }
    ((payload[offset] as u32) << 16) | ((payload[offset + 1] as u32) << 8) | payload[offset + 2] as u32
}
