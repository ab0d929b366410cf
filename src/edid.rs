//! Minimal EDID block decoding.
//!
//! Only the fields the DDC/CI layer needs: header validation, the
//! three-letter PNP vendor ID (drives the Samsung startup quirk) and a
//! few identity fields for diagnostics.

use crate::error::ProbeError;
use crate::protocol::{EDID_BLOCK_LEN, EDID_HEADER};

/// Identity fields decoded from a base EDID block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdidInfo {
    /// Three-letter vendor PNP ID, e.g. "SAM".
    pub pnp_id: String,
    /// Vendor-assigned product code.
    pub product_code: u16,
    /// 32-bit serial number (zero when unset).
    pub serial: u32,
    /// Week of manufacture (0 = unspecified).
    pub week: u8,
    /// Year of manufacture.
    pub year: u16,
}

/// Decode the base 128-byte EDID block.
pub fn parse(data: &[u8]) -> Result<EdidInfo, ProbeError> {
    if data.len() < EDID_BLOCK_LEN {
        return Err(ProbeError::InvalidEdid(format!(
            "block too short: {} bytes",
            data.len()
        )));
    }
    if data[..8] != EDID_HEADER {
        return Err(ProbeError::InvalidEdid(format!(
            "bad header: {:02x?}",
            &data[..8]
        )));
    }

    Ok(EdidInfo {
        pnp_id: decode_pnp_id(data[8], data[9]),
        product_code: u16::from_le_bytes([data[10], data[11]]),
        serial: u32::from_le_bytes([data[12], data[13], data[14], data[15]]),
        week: data[16],
        year: 1990 + u16::from(data[17]),
    })
}

/// Unpack the two-byte big-endian PNP ID: three 5-bit letters, 1 = 'A'.
fn decode_pnp_id(hi: u8, lo: u8) -> String {
    let raw = u16::from_be_bytes([hi, lo]);
    let letters = [
        ((raw >> 10) & 0x1f) as u8,
        ((raw >> 5) & 0x1f) as u8,
        (raw & 0x1f) as u8,
    ];
    letters
        .iter()
        .map(|&l| {
            if (1..=26).contains(&l) {
                (b'A' + l - 1) as char
            } else {
                '?'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_with_vendor(hi: u8, lo: u8) -> Vec<u8> {
        let mut data = vec![0u8; EDID_BLOCK_LEN];
        data[..8].copy_from_slice(&EDID_HEADER);
        data[8] = hi;
        data[9] = lo;
        data
    }

    #[test]
    fn decodes_samsung_pnp_id() {
        // SAM = S(19) A(1) M(13) → 0b0_10011_00001_01101 = 0x4c2d
        let data = block_with_vendor(0x4c, 0x2d);
        let info = parse(&data).unwrap();
        assert_eq!(info.pnp_id, "SAM");
    }

    #[test]
    fn decodes_identity_fields() {
        let mut data = block_with_vendor(0x4c, 0x2d);
        data[10] = 0x34;
        data[11] = 0x12;
        data[12..16].copy_from_slice(&0xdead_beefu32.to_le_bytes());
        data[16] = 12;
        data[17] = 20;
        let info = parse(&data).unwrap();
        assert_eq!(info.product_code, 0x1234);
        assert_eq!(info.serial, 0xdead_beef);
        assert_eq!(info.week, 12);
        assert_eq!(info.year, 2010);
    }

    #[test]
    fn rejects_bad_header() {
        let mut data = block_with_vendor(0x4c, 0x2d);
        data[0] = 0xff;
        assert!(matches!(
            parse(&data).unwrap_err(),
            ProbeError::InvalidEdid(_)
        ));
    }

    #[test]
    fn rejects_short_block() {
        assert!(parse(&[0u8; 64]).is_err());
    }

    #[test]
    fn out_of_range_letters_become_placeholders() {
        let data = block_with_vendor(0x00, 0x00);
        assert_eq!(parse(&data).unwrap().pnp_id, "???");
    }
}
