//! TDMA Control: the top-level owner of both time slots (§4.3).

use tracing::debug;

use crate::csbk::Csbk;
use crate::frame::{Frame, Protocol};
use crate::site::SiteData;
use crate::timer::Timer;

use super::slot::Slot;

/// Scripted CSBK sequence emitted while this unit is the trunking
/// control slot (§4.2 "Control channel mode").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BeaconStep {
    Aloha,
    SiteIdentity,
    SystemIdentity,
    AdjacentSite,
}

impl BeaconStep {
    fn next(self, adjacent_site_repeat: u32, cycle: u32) -> Self {
        match self {
            BeaconStep::Aloha => BeaconStep::SiteIdentity,
            BeaconStep::SiteIdentity => BeaconStep::SystemIdentity,
            BeaconStep::SystemIdentity => {
                if adjacent_site_repeat != 0 && cycle % adjacent_site_repeat == 0 {
                    BeaconStep::AdjacentSite
                } else {
                    BeaconStep::Aloha
                }
            }
            BeaconStep::AdjacentSite => BeaconStep::Aloha,
        }
    }
}

pub struct Control {
    color_code: u8,
    slot1: Slot,
    slot2: Slot,
    enable_tscc: bool,
    cc_running: bool,
    cc_packet_interval: Timer,
    beacon_step: BeaconStep,
    beacon_cycle: u32,
    adjacent_site_repeat: u32,
}

impl Control {
    pub fn new(color_code: u8, queue_size: usize) -> Self {
        Self {
            color_code,
            slot1: Slot::new(1, color_code, queue_size),
            slot2: Slot::new(2, color_code, queue_size),
            enable_tscc: false,
            cc_running: false,
            cc_packet_interval: Timer::new(180),
            beacon_step: BeaconStep::Aloha,
            beacon_cycle: 0,
            adjacent_site_repeat: 4,
        }
    }

    pub fn color_code(&self) -> u8 {
        self.color_code
    }

    pub fn set_enable_tscc(&mut self, enable: bool) {
        self.enable_tscc = enable;
        self.slot1.set_enable_tscc(enable);
        self.slot2.set_enable_tscc(enable);
    }

    /// Apply `protocols.dmr.callHang` to both slots (§6 config table).
    pub fn set_call_hang_ms(&mut self, ms: u64) {
        self.slot1.set_call_hang_ms(ms);
        self.slot2.set_call_hang_ms(ms);
    }

    /// Apply `system.rfTalkgroupHang` to both slots (§6 config table).
    pub fn set_tg_hang_ms(&mut self, ms: u64) {
        self.slot1.set_tg_hang_ms(ms);
        self.slot2.set_tg_hang_ms(ms);
    }

    pub fn set_cc_running(&mut self, running: bool) {
        self.cc_running = running;
        if running {
            self.cc_packet_interval.start_default();
        } else {
            self.cc_packet_interval.stop();
        }
    }

    pub fn is_cc_running(&self) -> bool {
        self.cc_running
    }

    pub fn slot(&self, slot_no: u8) -> &Slot {
        if slot_no == 1 {
            &self.slot1
        } else {
            &self.slot2
        }
    }

    /// Dispatch an inbound frame to the slot it names.
    pub fn process_frame(&mut self, frame: &Frame) -> bool {
        debug_assert_eq!(frame.protocol, Protocol::Tdma);
        match frame.slot {
            1 => self.slot1.process_frame(frame),
            2 => self.slot2.process_frame(frame),
            _ => false,
        }
    }

    pub fn process_network(&mut self, frame: &Frame) -> bool {
        match frame.slot {
            1 => self.slot1.process_network(frame),
            2 => self.slot2.process_network(frame),
            _ => false,
        }
    }

    /// Inspect a wakeup CSBK (duplex-only protocol bring-up). Returns
    /// `true` if recognised.
    pub fn process_wakeup(&mut self, bytes: &[u8]) -> bool {
        match crate::csbk::decode(bytes) {
            Ok(Csbk::Aloha { .. }) => {
                debug!("wakeup CSBK recognised");
                true
            }
            _ => false,
        }
    }

    pub fn get_frame1(&mut self, out: &mut [u8]) -> usize {
        self.slot1.get_frame(out)
    }

    pub fn get_frame2(&mut self, out: &mut [u8]) -> usize {
        self.slot2.get_frame(out)
    }

    /// Clock both slots and, when the trunking control slot is running,
    /// emit the next beacon-script CSBK when its packet interval fires.
    pub fn clock(&mut self, delta_ms: u64, site: &SiteData) {
        self.slot1.clock(delta_ms);
        self.slot2.clock(delta_ms);
        self.cc_packet_interval.clock(delta_ms);

        if self.enable_tscc && self.cc_running && self.cc_packet_interval.has_expired() {
            self.emit_beacon_step(site);
            self.cc_packet_interval.start_default();
        }
    }

    fn emit_beacon_step(&mut self, site: &SiteData) {
        let csbk = match self.beacon_step {
            BeaconStep::Aloha => Csbk::Aloha {
                last_block: true,
                site_timeslot_sync: true,
                channel_number: 1,
            },
            BeaconStep::SiteIdentity => Csbk::BroadcastSiteId {
                last_block: true,
                system_identity: site.system_identity(false),
                color_code: self.color_code,
            },
            BeaconStep::SystemIdentity => Csbk::BroadcastSystemId {
                last_block: true,
                network_id: site.net_id(),
                require_registration: site.requires_registration(),
            },
            BeaconStep::AdjacentSite => Csbk::BroadcastAdjacentSite {
                last_block: true,
                adjacent_system_identity: site.system_identity(true),
                channel_number: 1,
            },
        };
        let block = crate::csbk::encode(&csbk);
        let wire = Frame::new(Protocol::Tdma, 1, crate::frame::FrameKind::Csbk, block.to_vec()).to_wire();
        // Trunking control slot is always slot 1 in this crate's layout.
        let _ = self.slot1_enqueue(&wire);

        self.beacon_cycle = self.beacon_cycle.wrapping_add(1);
        self.beacon_step = self
            .beacon_step
            .next(self.adjacent_site_repeat, self.beacon_cycle);
    }

    fn slot1_enqueue(&mut self, bytes: &[u8]) -> Result<(), crate::ring::RingBufferError> {
        self.slot1.enqueue_csbk(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameKind;
    use crate::site::SiteModel;

    #[test]
    fn dispatches_to_named_slot() {
        let mut control = Control::new(1, 5120);
        let frame = Frame::new(Protocol::Tdma, 2, FrameKind::VoiceHeader, vec![0u8; 24]);
        assert!(control.process_frame(&frame));
        assert_eq!(control.slot(2).rf_state(), crate::tdma::slot::RfState::Audio);
        assert_eq!(control.slot(1).rf_state(), crate::tdma::slot::RfState::Idle);
    }

    #[test]
    fn beacon_script_cycles_through_steps() {
        let mut control = Control::new(1, 5120);
        control.set_enable_tscc(true);
        control.set_cc_running(true);
        let site = SiteData::new(SiteModel::Small, 1, 1, 3, false);
        assert_eq!(control.beacon_step, BeaconStep::Aloha);
        control.clock(200, &site);
        assert_eq!(control.beacon_step, BeaconStep::SiteIdentity);
        control.clock(200, &site);
        assert_eq!(control.beacon_step, BeaconStep::SystemIdentity);
    }

    #[test]
    fn call_hang_and_tg_hang_configuration_reaches_both_slots() {
        let mut control = Control::new(1, 5120);
        control.set_call_hang_ms(7_000);
        control.set_tg_hang_ms(12_000);
        assert_eq!(control.slot1.call_hang_timeout_ms(), 7_000);
        assert_eq!(control.slot2.call_hang_timeout_ms(), 7_000);
        assert_eq!(control.slot1.tg_hang_timeout_ms(), 12_000);
        assert_eq!(control.slot2.tg_hang_timeout_ms(), 12_000);
    }

    #[test]
    fn wakeup_recognises_aloha_csbk() {
        let mut control = Control::new(1, 5120);
        let block = crate::csbk::encode(&Csbk::Aloha {
            last_block: true,
            site_timeslot_sync: true,
            channel_number: 1,
        });
        assert!(control.process_wakeup(&block));
    }
}
