//! Control-signalling block variants, shared by the TDMA CSBK trunking
//! slot and the FDMA TSBK trunking channel (§4.5 "CSBK/TSBK codec").
//!
//! The wire framing (header bits, CRC, 64-bit payload window) lives in
//! [`crate::signalling`]; this module owns the opcode dispatch and the
//! per-variant field layouts packed into that 64-bit window.

use crate::signalling::{self, BlockHeader, SignallingError};

/// Service-option flags carried by several variants (§3 "CSBK / TSBK").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceOptions {
    pub emergency: bool,
    pub privacy: bool,
    pub broadcast: bool,
    pub proxy: bool,
    pub priority: u8,
}

/// Channel-grant payloads give service options 7 bits alongside a 9-bit
/// channel number (flags:4 | priority:3 | channel:9 == 16 bits, the full
/// width left in the payload after a 3-byte src + 3-byte dst).
const GRANT_CHANNEL_MASK: u16 = 0x01FF;

impl ServiceOptions {
    fn pack_with_channel(self, channel_number: u16) -> [u8; 2] {
        let channel = channel_number & GRANT_CHANNEL_MASK;
        let hi = ((self.emergency as u8) << 7)
            | ((self.privacy as u8) << 6)
            | ((self.broadcast as u8) << 5)
            | ((self.proxy as u8) << 4)
            | ((self.priority & 0x07) << 1)
            | ((channel >> 8) as u8 & 0x01);
        let lo = (channel & 0xFF) as u8;
        [hi, lo]
    }

    fn unpack_with_channel(bytes: [u8; 2]) -> (Self, u16) {
        let hi = bytes[0];
        let options = Self {
            emergency: hi & 0x80 != 0,
            privacy: hi & 0x40 != 0,
            broadcast: hi & 0x20 != 0,
            proxy: hi & 0x10 != 0,
            priority: (hi >> 1) & 0x07,
        };
        let channel = (((hi & 0x01) as u16) << 8) | bytes[1] as u16;
        (options, channel)
    }
}

/// Opcode values used on the header's 6-bit opcode field. The exact
/// numbering is this codec's own, not a rendition of either standard's
/// assigned opcode space — the FEC/air-format layer that would anchor
/// those values is out of scope (§1).
mod opcode {
    pub const ALOHA: u8 = 0x01;
    pub const ACK_RESPONSE: u8 = 0x02;
    pub const BROADCAST_SITE_ID: u8 = 0x03;
    pub const BROADCAST_SYSTEM_ID: u8 = 0x04;
    pub const BROADCAST_ADJACENT_SITE: u8 = 0x05;
    pub const BROADCAST_NETWORK_STATUS: u8 = 0x06;
    pub const CALL_ALERT: u8 = 0x07;
    pub const EXT_FUNC_CHECK: u8 = 0x08;
    pub const EXT_FUNC_INHIBIT: u8 = 0x09;
    pub const EXT_FUNC_UNINHIBIT: u8 = 0x0A;
    pub const EXT_FUNC_DYN_REGROUP: u8 = 0x0B;
    pub const EMERGENCY_ALARM: u8 = 0x0C;
    pub const GROUP_AFFILIATION_QUERY: u8 = 0x0D;
    pub const GROUP_AFFILIATION_UPDATE: u8 = 0x0E;
    pub const UNIT_REGISTRATION_COMMAND: u8 = 0x0F;
    pub const GRANT_VOICE_CHANNEL: u8 = 0x10;
    pub const GRANT_DATA_CHANNEL: u8 = 0x11;
}

/// A decoded control-signalling block. `Opaque` is the fall-through for
/// any opcode this codec doesn't recognise — it is preserved bit-exactly
/// by [`regenerate`] instead of being dropped (§4.5 "regenerate").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Csbk {
    Aloha {
        last_block: bool,
        site_timeslot_sync: bool,
        channel_number: u16,
    },
    AckResponse {
        last_block: bool,
        response: u8,
        reason: u8,
        dst_id: u32,
    },
    BroadcastSiteId {
        last_block: bool,
        system_identity: u16,
        color_code: u8,
    },
    BroadcastSystemId {
        last_block: bool,
        network_id: u16,
        require_registration: bool,
    },
    BroadcastAdjacentSite {
        last_block: bool,
        adjacent_system_identity: u16,
        channel_number: u16,
    },
    BroadcastNetworkStatus {
        last_block: bool,
        network_id: u16,
        site_id: u16,
    },
    CallAlert {
        last_block: bool,
        src_id: u32,
        dst_id: u32,
    },
    ExtendedFunctionCheck {
        last_block: bool,
        src_id: u32,
        dst_id: u32,
    },
    ExtendedFunctionInhibit {
        last_block: bool,
        src_id: u32,
        dst_id: u32,
    },
    ExtendedFunctionUninhibit {
        last_block: bool,
        src_id: u32,
        dst_id: u32,
    },
    ExtendedFunctionDynRegroup {
        last_block: bool,
        src_id: u32,
        group_id: u32,
    },
    EmergencyAlarm {
        last_block: bool,
        src_id: u32,
        dst_id: u32,
    },
    GroupAffiliationQuery {
        last_block: bool,
        src_id: u32,
    },
    GroupAffiliationUpdate {
        last_block: bool,
        src_id: u32,
        group_id: u32,
    },
    UnitRegistrationCommand {
        last_block: bool,
        dst_id: u32,
    },
    GrantVoiceChannel {
        last_block: bool,
        src_id: u32,
        dst_id: u32,
        channel_number: u16,
        service_options: ServiceOptions,
    },
    GrantDataChannel {
        last_block: bool,
        src_id: u32,
        dst_id: u32,
        channel_number: u16,
        service_options: ServiceOptions,
    },
    /// Unknown opcode, preserved bit-exactly for [`regenerate`].
    Opaque { header: BlockHeader, payload: [u8; 8] },
}

/// FDMA trunking signalling blocks use the identical variant set and
/// wire contract as [`Csbk`] (§4.5: "CSBK/TSBK codec" is one shared
/// component); `Tsbk` is the FDMA-facing name for the same type.
pub type Tsbk = Csbk;

impl Csbk {
    fn last_block(&self) -> bool {
        match self {
            Csbk::Aloha { last_block, .. }
            | Csbk::AckResponse { last_block, .. }
            | Csbk::BroadcastSiteId { last_block, .. }
            | Csbk::BroadcastSystemId { last_block, .. }
            | Csbk::BroadcastAdjacentSite { last_block, .. }
            | Csbk::BroadcastNetworkStatus { last_block, .. }
            | Csbk::CallAlert { last_block, .. }
            | Csbk::ExtendedFunctionCheck { last_block, .. }
            | Csbk::ExtendedFunctionInhibit { last_block, .. }
            | Csbk::ExtendedFunctionUninhibit { last_block, .. }
            | Csbk::ExtendedFunctionDynRegroup { last_block, .. }
            | Csbk::EmergencyAlarm { last_block, .. }
            | Csbk::GroupAffiliationQuery { last_block, .. }
            | Csbk::GroupAffiliationUpdate { last_block, .. }
            | Csbk::UnitRegistrationCommand { last_block, .. }
            | Csbk::GrantVoiceChannel { last_block, .. }
            | Csbk::GrantDataChannel { last_block, .. } => *last_block,
            Csbk::Opaque { header, .. } => header.last_block,
        }
    }

    /// True for the "grant" family, used by the Control layer to decide
    /// whether a decoded block should trigger a channel assignment.
    pub fn is_channel_grant(&self) -> bool {
        matches!(
            self,
            Csbk::GrantVoiceChannel { .. } | Csbk::GrantDataChannel { .. }
        )
    }
}

fn id24(hi: u8, mid: u8, lo: u8) -> u32 {
    ((hi as u32) << 16) | ((mid as u32) << 8) | lo as u32
}

fn split_id24(id: u32) -> [u8; 3] {
    [(id >> 16) as u8, (id >> 8) as u8, id as u8]
}

/// Decode a raw 12-byte block (§4.5's "24-byte block" before the
/// FEC/interleave layer this crate doesn't model) into a [`Csbk`]/[`Tsbk`].
pub fn decode(block: &[u8]) -> Result<Csbk, SignallingError> {
    signalling::verify_crc(block)?;
    let (header, payload, _) = signalling::split_block(block)?;

    Ok(match header.opcode {
        opcode::ALOHA => Csbk::Aloha {
            last_block: header.last_block,
            site_timeslot_sync: payload[0] & 0x01 != 0,
            channel_number: u16::from_be_bytes([payload[1], payload[2]]),
        },
        opcode::ACK_RESPONSE => Csbk::AckResponse {
            last_block: header.last_block,
            response: payload[0],
            reason: payload[1],
            dst_id: id24(payload[2], payload[3], payload[4]),
        },
        opcode::BROADCAST_SITE_ID => Csbk::BroadcastSiteId {
            last_block: header.last_block,
            system_identity: u16::from_be_bytes([payload[0], payload[1]]),
            color_code: payload[2] & 0x0F,
        },
        opcode::BROADCAST_SYSTEM_ID => Csbk::BroadcastSystemId {
            last_block: header.last_block,
            network_id: u16::from_be_bytes([payload[0], payload[1]]),
            require_registration: payload[2] & 0x01 != 0,
        },
        opcode::BROADCAST_ADJACENT_SITE => Csbk::BroadcastAdjacentSite {
            last_block: header.last_block,
            adjacent_system_identity: u16::from_be_bytes([payload[0], payload[1]]),
            channel_number: u16::from_be_bytes([payload[2], payload[3]]),
        },
        opcode::BROADCAST_NETWORK_STATUS => Csbk::BroadcastNetworkStatus {
            last_block: header.last_block,
            network_id: u16::from_be_bytes([payload[0], payload[1]]),
            site_id: u16::from_be_bytes([payload[2], payload[3]]),
        },
        opcode::CALL_ALERT => Csbk::CallAlert {
            last_block: header.last_block,
            src_id: id24(payload[0], payload[1], payload[2]),
            dst_id: id24(payload[3], payload[4], payload[5]),
        },
        opcode::EXT_FUNC_CHECK => Csbk::ExtendedFunctionCheck {
            last_block: header.last_block,
            src_id: id24(payload[0], payload[1], payload[2]),
            dst_id: id24(payload[3], payload[4], payload[5]),
        },
        opcode::EXT_FUNC_INHIBIT => Csbk::ExtendedFunctionInhibit {
            last_block: header.last_block,
            src_id: id24(payload[0], payload[1], payload[2]),
            dst_id: id24(payload[3], payload[4], payload[5]),
        },
        opcode::EXT_FUNC_UNINHIBIT => Csbk::ExtendedFunctionUninhibit {
            last_block: header.last_block,
            src_id: id24(payload[0], payload[1], payload[2]),
            dst_id: id24(payload[3], payload[4], payload[5]),
        },
        opcode::EXT_FUNC_DYN_REGROUP => Csbk::ExtendedFunctionDynRegroup {
            last_block: header.last_block,
            src_id: id24(payload[0], payload[1], payload[2]),
            group_id: id24(payload[3], payload[4], payload[5]),
        },
        opcode::EMERGENCY_ALARM => Csbk::EmergencyAlarm {
            last_block: header.last_block,
            src_id: id24(payload[0], payload[1], payload[2]),
            dst_id: id24(payload[3], payload[4], payload[5]),
        },
        opcode::GROUP_AFFILIATION_QUERY => Csbk::GroupAffiliationQuery {
            last_block: header.last_block,
            src_id: id24(payload[0], payload[1], payload[2]),
        },
        opcode::GROUP_AFFILIATION_UPDATE => Csbk::GroupAffiliationUpdate {
            last_block: header.last_block,
            src_id: id24(payload[0], payload[1], payload[2]),
            group_id: id24(payload[3], payload[4], payload[5]),
        },
        opcode::UNIT_REGISTRATION_COMMAND => Csbk::UnitRegistrationCommand {
            last_block: header.last_block,
            dst_id: id24(payload[0], payload[1], payload[2]),
        },
        opcode::GRANT_VOICE_CHANNEL => {
            let (service_options, channel_number) =
                ServiceOptions::unpack_with_channel([payload[6], payload[7]]);
            Csbk::GrantVoiceChannel {
                last_block: header.last_block,
                src_id: id24(payload[0], payload[1], payload[2]),
                dst_id: id24(payload[3], payload[4], payload[5]),
                channel_number,
                service_options,
            }
        }
        opcode::GRANT_DATA_CHANNEL => {
            let (service_options, channel_number) =
                ServiceOptions::unpack_with_channel([payload[6], payload[7]]);
            Csbk::GrantDataChannel {
                last_block: header.last_block,
                src_id: id24(payload[0], payload[1], payload[2]),
                dst_id: id24(payload[3], payload[4], payload[5]),
                channel_number,
                service_options,
            }
        }
        _ => Csbk::Opaque { header, payload },
    })
}

/// Encode a [`Csbk`]/[`Tsbk`] back into its raw 12-byte block.
pub fn encode(csbk: &Csbk) -> [u8; signalling::BLOCK_LEN] {
    let last_block = csbk.last_block();
    let mut payload = [0u8; 8];
    let (opcode, fid) = match csbk {
        Csbk::Aloha {
            site_timeslot_sync,
            channel_number,
            ..
        } => {
            payload[0] = *site_timeslot_sync as u8;
            let ch = channel_number.to_be_bytes();
            payload[1] = ch[0];
            payload[2] = ch[1];
            (opcode::ALOHA, 0)
        }
        Csbk::AckResponse {
            response,
            reason,
            dst_id,
            ..
        } => {
            payload[0] = *response;
            payload[1] = *reason;
            payload[2..5].copy_from_slice(&split_id24(*dst_id));
            (opcode::ACK_RESPONSE, 0)
        }
        Csbk::BroadcastSiteId {
            system_identity,
            color_code,
            ..
        } => {
            payload[0..2].copy_from_slice(&system_identity.to_be_bytes());
            payload[2] = color_code & 0x0F;
            (opcode::BROADCAST_SITE_ID, 0)
        }
        Csbk::BroadcastSystemId {
            network_id,
            require_registration,
            ..
        } => {
            payload[0..2].copy_from_slice(&network_id.to_be_bytes());
            payload[2] = *require_registration as u8;
            (opcode::BROADCAST_SYSTEM_ID, 0)
        }
        Csbk::BroadcastAdjacentSite {
            adjacent_system_identity,
            channel_number,
            ..
        } => {
            payload[0..2].copy_from_slice(&adjacent_system_identity.to_be_bytes());
            payload[2..4].copy_from_slice(&channel_number.to_be_bytes());
            (opcode::BROADCAST_ADJACENT_SITE, 0)
        }
        Csbk::BroadcastNetworkStatus {
            network_id,
            site_id,
            ..
        } => {
            payload[0..2].copy_from_slice(&network_id.to_be_bytes());
            payload[2..4].copy_from_slice(&site_id.to_be_bytes());
            (opcode::BROADCAST_NETWORK_STATUS, 0)
        }
        Csbk::CallAlert { src_id, dst_id, .. } => {
            payload[0..3].copy_from_slice(&split_id24(*src_id));
            payload[3..6].copy_from_slice(&split_id24(*dst_id));
            (opcode::CALL_ALERT, 0)
        }
        Csbk::ExtendedFunctionCheck { src_id, dst_id, .. } => {
            payload[0..3].copy_from_slice(&split_id24(*src_id));
            payload[3..6].copy_from_slice(&split_id24(*dst_id));
            (opcode::EXT_FUNC_CHECK, 0)
        }
        Csbk::ExtendedFunctionInhibit { src_id, dst_id, .. } => {
            payload[0..3].copy_from_slice(&split_id24(*src_id));
            payload[3..6].copy_from_slice(&split_id24(*dst_id));
            (opcode::EXT_FUNC_INHIBIT, 0)
        }
        Csbk::ExtendedFunctionUninhibit { src_id, dst_id, .. } => {
            payload[0..3].copy_from_slice(&split_id24(*src_id));
            payload[3..6].copy_from_slice(&split_id24(*dst_id));
            (opcode::EXT_FUNC_UNINHIBIT, 0)
        }
        Csbk::ExtendedFunctionDynRegroup {
            src_id, group_id, ..
        } => {
            payload[0..3].copy_from_slice(&split_id24(*src_id));
            payload[3..6].copy_from_slice(&split_id24(*group_id));
            (opcode::EXT_FUNC_DYN_REGROUP, 0)
        }
        Csbk::EmergencyAlarm { src_id, dst_id, .. } => {
            payload[0..3].copy_from_slice(&split_id24(*src_id));
            payload[3..6].copy_from_slice(&split_id24(*dst_id));
            (opcode::EMERGENCY_ALARM, 0)
        }
        Csbk::GroupAffiliationQuery { src_id, .. } => {
            payload[0..3].copy_from_slice(&split_id24(*src_id));
            (opcode::GROUP_AFFILIATION_QUERY, 0)
        }
        Csbk::GroupAffiliationUpdate { src_id, group_id, .. } => {
            payload[0..3].copy_from_slice(&split_id24(*src_id));
            payload[3..6].copy_from_slice(&split_id24(*group_id));
            (opcode::GROUP_AFFILIATION_UPDATE, 0)
        }
        Csbk::UnitRegistrationCommand { dst_id, .. } => {
            payload[0..3].copy_from_slice(&split_id24(*dst_id));
            (opcode::UNIT_REGISTRATION_COMMAND, 0)
        }
        Csbk::GrantVoiceChannel {
            src_id,
            dst_id,
            channel_number,
            service_options,
            ..
        } => {
            payload[0..3].copy_from_slice(&split_id24(*src_id));
            payload[3..6].copy_from_slice(&split_id24(*dst_id));
            payload[6..8].copy_from_slice(&service_options.pack_with_channel(*channel_number));
            (opcode::GRANT_VOICE_CHANNEL, 0)
        }
        Csbk::GrantDataChannel {
            src_id,
            dst_id,
            channel_number,
            service_options,
            ..
        } => {
            payload[0..3].copy_from_slice(&split_id24(*src_id));
            payload[3..6].copy_from_slice(&split_id24(*dst_id));
            payload[6..8].copy_from_slice(&service_options.pack_with_channel(*channel_number));
            (opcode::GRANT_DATA_CHANNEL, 0)
        }
        Csbk::Opaque { header, payload: p } => {
            return signalling::build_block(*header, *p);
        }
    };

    signalling::build_block(
        BlockHeader {
            last_block,
            pf: false,
            opcode,
            fid,
        },
        payload,
    )
}

/// Recompute outer parity over a raw block without decoding its opcode
/// body, forwarding unknown or MFID-private blocks unchanged (§4.5).
pub fn regenerate(block: &[u8]) -> Result<[u8; signalling::BLOCK_LEN], SignallingError> {
    signalling::regenerate(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aloha_round_trips() {
        let csbk = Csbk::Aloha {
            last_block: true,
            site_timeslot_sync: true,
            channel_number: 0x0123,
        };
        let block = encode(&csbk);
        assert_eq!(decode(&block).unwrap(), csbk);
    }

    #[test]
    fn grant_voice_channel_round_trips_with_service_options() {
        let csbk = Csbk::GrantVoiceChannel {
            last_block: false,
            src_id: 0x0102_03,
            dst_id: 0x0405_06,
            channel_number: 0x0145,
            service_options: ServiceOptions {
                emergency: true,
                privacy: false,
                broadcast: true,
                proxy: false,
                priority: 5,
            },
        };
        let block = encode(&csbk);
        assert_eq!(decode(&block).unwrap(), csbk);
    }

    #[test]
    fn unknown_opcode_decodes_opaque_and_regenerates_unchanged() {
        let header = BlockHeader {
            last_block: true,
            pf: true,
            opcode: 0x3D,
            fid: 0x99,
        };
        let payload = [0xAA; 8];
        let block = signalling::build_block(header, payload);
        let decoded = decode(&block).unwrap();
        assert_eq!(decoded, Csbk::Opaque { header, payload });

        let regenerated = regenerate(&block).unwrap();
        assert_eq!(&regenerated[0..10], &block[0..10]);
    }

    #[test]
    fn corrupted_crc_is_rejected() {
        let csbk = Csbk::CallAlert {
            last_block: true,
            src_id: 1,
            dst_id: 2,
        };
        let mut block = encode(&csbk);
        block[11] ^= 0xFF;
        assert!(decode(&block).is_err());
    }

    #[test]
    fn is_channel_grant_distinguishes_grants_from_other_variants() {
        assert!(Csbk::GrantVoiceChannel {
            last_block: true,
            src_id: 1,
            dst_id: 2,
            channel_number: 1,
            service_options: ServiceOptions::default(),
        }
        .is_channel_grant());
        assert!(!Csbk::CallAlert {
            last_block: true,
            src_id: 1,
            dst_id: 2,
        }
        .is_channel_grant());
    }
}
