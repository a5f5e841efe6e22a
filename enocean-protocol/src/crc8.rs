//! CRC-8 as used by ESP3 (polynomial 0x07, init 0x00, no reflection).

const POLYNOMIAL: u8 = 0x07;

static TABLE: [u8; 256] = build_table();

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ POLYNOMIAL
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Compute the CRC-8 of `bytes`.
pub fn crc8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |crc, &b| TABLE[(crc ^ b) as usize])
}

/// Compute the CRC-8 over several slices as if they were concatenated.
pub fn crc8_chain(parts: &[&[u8]]) -> u8 {
    parts
        .iter()
        .flat_map(|p| p.iter())
        .fold(0u8, |crc, &b| TABLE[(crc ^ b) as usize])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_esp3_header_vectors() {
        // ERP1 telegram: 7 data bytes, 7 optional bytes
        assert_eq!(crc8(&[0x00, 0x07, 0x07, 0x01]), 0x7A);
        // CO_RD_IDBASE common command
        assert_eq!(crc8(&[0x00, 0x01, 0x00, 0x05]), 0x70);
        // Response with 5 data bytes, 1 optional byte
        assert_eq!(crc8(&[0x00, 0x05, 0x01, 0x02]), 0xDB);
        // Response with a single return code
        assert_eq!(crc8(&[0x00, 0x01, 0x00, 0x02]), 0x65);
    }

    #[test]
    fn test_data_vectors() {
        assert_eq!(crc8(&[0x08]), 0x38);
        assert_eq!(crc8(&[0x03]), 0x09);
        assert_eq!(crc8(&[]), 0x00);
        assert_eq!(crc8(b"123456789"), 0xF4);
    }

    #[test]
    fn test_chain_matches_contiguous() {
        let data = [0xF6, 0x30, 0x01, 0x8A, 0x78, 0xBC, 0x30];
        let opt = [0x03, 0xFF, 0xFF, 0xFF, 0xFF, 0x2D, 0x00];
        let mut all = data.to_vec();
        all.extend_from_slice(&opt);
        assert_eq!(crc8_chain(&[&data[..], &opt[..]]), crc8(&all));
        assert_eq!(crc8(&all), 0x6B);
    }
}
