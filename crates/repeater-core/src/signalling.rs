//! Shared control-signalling block wire format, used by both the TDMA and
//! FDMA sides of the [`crate::csbk`] codec (§3 "CSBK / TSBK", §4.5).
//!
//! The FEC/interleaving layer that would normally surround a CSBK/TSBK on
//! the air is out of scope (§1): by the time a block reaches this codec it
//! is already the already-FEC-processed payload the modem handed up. This
//! module's byte layout is therefore this crate's own framing for that
//! payload, not a bit-exact rendition of either standard's air format:
//!
//! ```text
//! byte 0:      [ LB:1 | PF:1 | opcode:6 ]
//! byte 1:      [ FID / MFID : 8 ]
//! bytes 2..10: 64-bit opcode-specific payload
//! bytes 10..12: CRC-16/CCITT over bytes 0..10 ("outer parity")
//! ```

use thiserror::Error;

/// Total block length in bytes: 1 (header) + 1 (FID) + 8 (payload) + 2 (CRC).
pub const BLOCK_LEN: usize = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignallingError {
    #[error("block is {0} bytes, expected {BLOCK_LEN}")]
    WrongLength(usize),
    #[error("CRC mismatch: computed {computed:#06x}, block has {stored:#06x}")]
    CrcMismatch { computed: u16, stored: u16 },
}

/// The common, protocol-agnostic header every CSBK/TSBK carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Last block in a sequence of CSBKs/TSBKs.
    pub last_block: bool,
    /// Protocol-feature flag (`PF`/`Cdef`): marks a manufacturer-private
    /// or alternate-format opcode space.
    pub pf: bool,
    /// 6-bit opcode.
    pub opcode: u8,
    /// Feature/manufacturer ID.
    pub fid: u8,
}

/// CRC-16/CCITT (poly 0x1021, init 0xFFFF), matching the polynomial the
/// teacher's wire codecs use for outer framing checks.
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Split a raw block into its header, FID, 64-bit payload, and stored CRC.
pub fn split_block(block: &[u8]) -> Result<(BlockHeader, [u8; 8], u16), SignallingError> {
    if block.len() != BLOCK_LEN {
        return Err(SignallingError::WrongLength(block.len()));
    }
    let header = BlockHeader {
        last_block: block[0] & 0x80 != 0,
        pf: block[0] & 0x40 != 0,
        opcode: block[0] & 0x3F,
        fid: block[1],
    };
    let mut payload = [0u8; 8];
    payload.copy_from_slice(&block[2..10]);
    let stored_crc = u16::from_be_bytes([block[10], block[11]]);
    Ok((header, payload, stored_crc))
}

/// Verify the outer CRC over a raw block's header+payload bytes.
pub fn verify_crc(block: &[u8]) -> Result<(), SignallingError> {
    if block.len() != BLOCK_LEN {
        return Err(SignallingError::WrongLength(block.len()));
    }
    let computed = crc16_ccitt(&block[0..10]);
    let stored = u16::from_be_bytes([block[10], block[11]]);
    if computed != stored {
        return Err(SignallingError::CrcMismatch { computed, stored });
    }
    Ok(())
}

/// Assemble a raw block from a header, 64-bit payload, and freshly
/// computed CRC.
pub fn build_block(header: BlockHeader, payload: [u8; 8]) -> [u8; BLOCK_LEN] {
    let mut block = [0u8; BLOCK_LEN];
    block[0] = ((header.last_block as u8) << 7) | ((header.pf as u8) << 6) | (header.opcode & 0x3F);
    block[1] = header.fid;
    block[2..10].copy_from_slice(&payload);
    let crc = crc16_ccitt(&block[0..10]);
    block[10..12].copy_from_slice(&crc.to_be_bytes());
    block
}

/// Recompute the outer CRC over an existing block's header+payload bytes
/// without interpreting the opcode body, preserving every other bit
/// (§4.5 "regenerate"). Used to forward unknown or MFID-private blocks
/// unchanged except for the parity field.
pub fn regenerate(block: &[u8]) -> Result<[u8; BLOCK_LEN], SignallingError> {
    if block.len() != BLOCK_LEN {
        return Err(SignallingError::WrongLength(block.len()));
    }
    let mut out = [0u8; BLOCK_LEN];
    out[0..10].copy_from_slice(&block[0..10]);
    let crc = crc16_ccitt(&out[0..10]);
    out[10..12].copy_from_slice(&crc.to_be_bytes());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_then_verify_round_trips() {
        let header = BlockHeader {
            last_block: true,
            pf: false,
            opcode: 0x3F,
            fid: 0xAB,
        };
        let payload = [1, 2, 3, 4, 5, 6, 7, 8];
        let block = build_block(header, payload);
        assert!(verify_crc(&block).is_ok());
        let (h2, p2, _) = split_block(&block).unwrap();
        assert_eq!(h2, header);
        assert_eq!(p2, payload);
    }

    #[test]
    fn regenerate_preserves_all_bits_outside_crc() {
        let header = BlockHeader {
            last_block: false,
            pf: true,
            opcode: 0x15,
            fid: 0x10,
        };
        let payload = [9, 8, 7, 6, 5, 4, 3, 2];
        let mut block = build_block(header, payload);
        // Corrupt the stored CRC to simulate an opaque, unrecognised block
        // arriving with whatever outer parity the transmitter computed.
        block[10] = 0;
        block[11] = 0;
        let regenerated = regenerate(&block).unwrap();
        assert_eq!(&regenerated[0..10], &block[0..10]);
        assert!(verify_crc(&regenerated).is_ok());
    }

    #[test]
    fn wrong_length_rejected() {
        assert_eq!(
            split_block(&[0u8; 4]),
            Err(SignallingError::WrongLength(4))
        );
    }
}
