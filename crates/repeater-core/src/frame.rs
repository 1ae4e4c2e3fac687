//! Protocol-level frame and link-control data model (§3 "Frame",
//! "Link-Control (LC)").

use serde::{Deserialize, Serialize};

/// Which air-interface protocol a [`Frame`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    Tdma,
    Fdma,
}

/// Discriminates the kind of payload a [`Frame`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    VoiceHeader,
    VoiceSuperframe(u8),
    VoiceTerminator,
    DataHeader,
    DataBlock,
    Csbk,
    IdleFill,
    Wakeup,
}

/// Maximum payload size for a TDMA frame (§3: "on the order of 24 bytes
/// TDMA").
pub const TDMA_FRAME_PAYLOAD_MAX: usize = 24;

/// Maximum payload size for an FDMA frame (§3: "18 bytes FDMA").
pub const FDMA_FRAME_PAYLOAD_MAX: usize = 18;

/// A protocol-level payload delivered to or from the modem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub protocol: Protocol,
    /// `1` or `2` for TDMA, `0` for FDMA (single channel, no slots).
    pub slot: u8,
    pub kind: FrameKind,
    pub payload: Vec<u8>,
}

impl FrameKind {
    /// 7-bit wire code identifying this kind. The modem's real sync-word
    /// classification is out of scope (§1); this tag byte is this
    /// crate's stand-in for "the deframer already knows what this is".
    pub(crate) fn code(self) -> u8 {
        match self {
            FrameKind::VoiceHeader => 0x00,
            FrameKind::VoiceSuperframe(n) => 0x10 | (n & 0x0F),
            FrameKind::VoiceTerminator => 0x01,
            FrameKind::DataHeader => 0x02,
            FrameKind::DataBlock => 0x03,
            FrameKind::Csbk => 0x04,
            FrameKind::IdleFill => 0x05,
            FrameKind::Wakeup => 0x06,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        if code & 0xF0 == 0x10 {
            return Some(FrameKind::VoiceSuperframe(code & 0x0F));
        }
        match code {
            0x00 => Some(FrameKind::VoiceHeader),
            0x01 => Some(FrameKind::VoiceTerminator),
            0x02 => Some(FrameKind::DataHeader),
            0x03 => Some(FrameKind::DataBlock),
            0x04 => Some(FrameKind::Csbk),
            0x05 => Some(FrameKind::IdleFill),
            0x06 => Some(FrameKind::Wakeup),
            _ => None,
        }
    }
}

impl Frame {
    pub fn new(protocol: Protocol, slot: u8, kind: FrameKind, payload: Vec<u8>) -> Self {
        Self {
            protocol,
            slot,
            kind,
            payload,
        }
    }

    pub fn is_voice(&self) -> bool {
        matches!(
            self.kind,
            FrameKind::VoiceHeader | FrameKind::VoiceSuperframe(_) | FrameKind::VoiceTerminator
        )
    }

    pub fn is_data(&self) -> bool {
        matches!(self.kind, FrameKind::DataHeader | FrameKind::DataBlock)
    }

    /// Serialise to the tag-byte + payload form stored in ring buffers
    /// and exchanged with the modem (top bit of the tag carries the
    /// TDMA slot; FDMA frames always clear it).
    pub fn to_wire(&self) -> Vec<u8> {
        let slot_bit = if self.slot == 2 { 0x80 } else { 0x00 };
        let mut out = Vec::with_capacity(self.payload.len() + 1);
        out.push(slot_bit | self.kind.code());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse a tag-byte + payload wire frame for the given protocol.
    pub fn from_wire(protocol: Protocol, bytes: &[u8]) -> Option<Frame> {
        let (&tag, payload) = bytes.split_first()?;
        let kind = FrameKind::from_code(tag & 0x7F)?;
        let slot = if protocol == Protocol::Tdma && tag & 0x80 != 0 {
            2
        } else if protocol == Protocol::Tdma {
            1
        } else {
            0
        };
        Some(Frame::new(protocol, slot, kind, payload.to_vec()))
    }

    /// Serialise for the network adapter boundary, which (unlike the
    /// modem) carries frames for either protocol over one opaque pipe —
    /// this prepends a protocol byte ahead of the usual wire tag.
    pub fn to_network_wire(&self) -> Vec<u8> {
        let proto_byte = match self.protocol {
            Protocol::Tdma => 0x00,
            Protocol::Fdma => 0x01,
        };
        let mut out = Vec::with_capacity(self.payload.len() + 2);
        out.push(proto_byte);
        out.extend_from_slice(&self.to_wire());
        out
    }

    pub fn from_network_wire(bytes: &[u8]) -> Option<Frame> {
        let (&proto_byte, rest) = bytes.split_first()?;
        let protocol = match proto_byte {
            0x00 => Protocol::Tdma,
            0x01 => Protocol::Fdma,
            _ => return None,
        };
        Frame::from_wire(protocol, rest)
    }
}

/// Call type for a [`LinkControl`] block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallType {
    Group,
    UnitToUnit,
}

/// Per-call metadata carried in voice headers and periodically in voice
/// frames (§3 "Link-Control (LC)"). Created at call start, held for call
/// duration, freed at call end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkControl {
    pub call_type: CallType,
    pub src_id: u32,
    pub dst_id: u32,
    pub emergency: bool,
    pub privacy: bool,
    pub priority: u8,
    /// Present when the call carries an encryption link control block;
    /// the key/algorithm identifier is opaque to the core.
    pub encryption: Option<EncryptionLc>,
}

impl LinkControl {
    pub fn new(call_type: CallType, src_id: u32, dst_id: u32) -> Self {
        Self {
            call_type,
            src_id,
            dst_id,
            emergency: false,
            privacy: false,
            priority: 0,
            encryption: None,
        }
    }
}

/// Opaque encryption link-control metadata (algorithm ID + key ID); the
/// core never inspects key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionLc {
    pub algorithm_id: u8,
    pub key_id: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_and_data_classification() {
        let voice = Frame::new(Protocol::Tdma, 1, FrameKind::VoiceHeader, vec![]);
        assert!(voice.is_voice());
        assert!(!voice.is_data());

        let data = Frame::new(Protocol::Fdma, 0, FrameKind::DataBlock, vec![]);
        assert!(data.is_data());
        assert!(!data.is_voice());
    }

    #[test]
    fn wire_round_trip_preserves_protocol_slot_kind_and_payload() {
        let frame = Frame::new(
            Protocol::Tdma,
            2,
            FrameKind::VoiceSuperframe(3),
            vec![1, 2, 3, 4],
        );
        let wire = frame.to_wire();
        let parsed = Frame::from_wire(Protocol::Tdma, &wire).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn fdma_wire_frames_always_decode_to_slot_zero() {
        let frame = Frame::new(Protocol::Fdma, 0, FrameKind::Csbk, vec![9; 12]);
        let wire = frame.to_wire();
        let parsed = Frame::from_wire(Protocol::Fdma, &wire).unwrap();
        assert_eq!(parsed.slot, 0);
    }

    #[test]
    fn network_wire_round_trip_preserves_protocol_and_identifies_it_without_a_hint() {
        let tdma = Frame::new(Protocol::Tdma, 2, FrameKind::VoiceTerminator, vec![7; 4]);
        let fdma = Frame::new(Protocol::Fdma, 0, FrameKind::DataBlock, vec![8; 4]);
        assert_eq!(Frame::from_network_wire(&tdma.to_network_wire()).unwrap(), tdma);
        assert_eq!(Frame::from_network_wire(&fdma.to_network_wire()).unwrap(), fdma);
    }
}
