//! CRC-16 used by every devlink frame and by the serial line trailer.
//!
//! Parameters: reflected polynomial `0xA001` (`0x8005` reversed), initial
//! value `0xFFFF`, no final XOR (CRC-16/MODBUS). Appending the checksum
//! little-endian to a buffer makes the checksum of the whole buffer zero,
//! which is how receivers validate frames.

/// Width of an encoded checksum on the wire.
pub const CRC16_LEN: usize = 2;

const POLY: u16 = 0xA001;
const INIT: u16 = 0xFFFF;

const TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ POLY } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Compute the CRC-16 of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(INIT, |crc, &byte| {
        (crc >> 8) ^ TABLE[usize::from((crc ^ u16::from(byte)) & 0xFF)]
    })
}

/// Append the little-endian CRC-16 of `buf` to `buf`.
pub fn append_crc16(buf: &mut Vec<u8>) {
    let crc = crc16(buf);
    buf.extend_from_slice(&crc.to_le_bytes());
}

/// True if `data` ends with a valid little-endian CRC-16 of its prefix.
pub fn verify_crc16(data: &[u8]) -> bool {
    data.len() >= CRC16_LEN && crc16(data) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::collection::vec;
    use proptest::prelude::*;

    #[test]
    fn test_le_u32_vector() {
        assert_eq!(crc16(&1234u32.to_le_bytes()), 0x9d78);
    }

    #[test]
    fn test_ascii_vector() {
        assert_eq!(crc16(b"amaork0123456789"), 0xb251);
    }

    #[test]
    fn test_empty_is_initial_value() {
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn test_verify_rejects_short_and_corrupt() {
        assert!(!verify_crc16(&[0x01]));

        let mut buf = b"frame body".to_vec();
        append_crc16(&mut buf);
        assert!(verify_crc16(&buf));

        buf[3] ^= 0x40;
        assert!(!verify_crc16(&buf));
    }

    proptest! {
        #[test]
        fn appended_checksum_leaves_zero_residue(data in vec(any::<u8>(), 0..512)) {
            let mut buf = data.clone();
            append_crc16(&mut buf);
            prop_assert_eq!(buf.len(), data.len() + CRC16_LEN);
            prop_assert_eq!(crc16(&buf), 0);
        }
    }
}
