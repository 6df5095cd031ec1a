//! Address parsing and hex dump formatting.

use anyhow::{Result, anyhow};

/// Parse a hex address, with or without a `0x` prefix
pub fn parse_hex_address(s: &str) -> Result<u64> {
    let digits = s.trim().trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(digits, 16).map_err(|e| anyhow!("Invalid hex address '{}': {}", s, e))
}

/// Render `bytes` as 16-byte rows labelled with absolute addresses.
///
/// ```text
/// 0x140751F50: 00 00 00 00 00 00 00 00  00 00 00 00 74 4F 8B 05  |............tO..|
/// ```
pub fn hexdump(base: u64, bytes: &[u8]) -> Vec<String> {
    bytes
        .chunks(16)
        .enumerate()
        .map(|(row, chunk)| {
            let mut line = format!("0x{:X}: ", base + (row * 16) as u64);
            for j in 0..16 {
                if j == 8 {
                    line.push(' ');
                }
                match chunk.get(j) {
                    Some(byte) => line.push_str(&format!("{:02X} ", byte)),
                    None => line.push_str("   "),
                }
            }
            line.push_str(" |");
            for &byte in chunk {
                line.push(if (0x20..0x7F).contains(&byte) { byte as char } else { '.' });
            }
            line.push('|');
            line
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_address() {
        assert_eq!(parse_hex_address("0x140752038").unwrap(), 0x140752038);
        assert_eq!(parse_hex_address("140752038").unwrap(), 0x140752038);
        assert_eq!(parse_hex_address("0XFF").unwrap(), 0xFF);
        assert!(parse_hex_address("0xZZZ").is_err());
    }

    #[test]
    fn test_hexdump_rows() {
        let mut bytes = vec![0u8; 20];
        bytes[12..14].copy_from_slice(b"tO");
        let lines = hexdump(0x140751F50, &bytes);

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0x140751F50: 00 00"));
        assert!(lines[0].ends_with("|............tO..|"));
        assert!(lines[1].starts_with("0x140751F60: 00 00 00 00 "));
        assert!(lines[1].ends_with("|....|"));
    }
}
