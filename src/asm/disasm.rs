//! Disassembler for LS-8 programs.
//!
//! Converts raw bytes back to readable assembly. Bytes that do not start a
//! valid instruction are shown as `DB` data.

use crate::cpu::decode::decode_at;

/// Disassemble the instruction at `addr`.
///
/// Returns the text and the number of bytes it occupies (at least 1).
pub fn disassemble_at(bytes: &[u8], addr: usize) -> (String, usize) {
    match decode_at(bytes, addr) {
        Ok(instr) => (instr.to_string(), instr.len() as usize),
        Err(_) => (format!("DB {:#04x}", bytes.get(addr).copied().unwrap_or(0)), 1),
    }
}

/// Walk `bytes` from address 0, one entry per instruction.
///
/// Each entry is `(address, length, text)`.
pub fn listing(bytes: &[u8]) -> Vec<(usize, usize, String)> {
    let mut out = Vec::new();
    let mut addr = 0;
    while addr < bytes.len() {
        let (text, len) = disassemble_at(bytes, addr);
        out.push((addr, len, text));
        addr += len;
    }
    out
}

/// Disassemble a whole program.
pub fn disassemble(bytes: &[u8]) -> String {
    let mut output = String::new();
    output.push_str("; LS-8 Disassembly\n");
    output.push_str("; ----------------\n\n");

    for (addr, len, text) in listing(bytes) {
        let raw: Vec<String> = bytes[addr..addr + len]
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        output.push_str(&format!("{:02x}: {:<9} {}\n", addr, raw.join(" "), text));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disassemble_hlt() {
        assert_eq!(disassemble_at(&[0b0000_0001], 0), ("HLT".to_string(), 1));
    }

    #[test]
    fn test_disassemble_ldi() {
        let (text, len) = disassemble_at(&[0b1001_1001, 2, 42], 0);
        assert_eq!(text, "LDI R2, 42");
        assert_eq!(len, 3);
    }

    #[test]
    fn test_disassemble_data() {
        assert_eq!(disassemble_at(&[0xFF], 0), ("DB 0xff".to_string(), 1));
        // Truncated instruction
        assert_eq!(disassemble_at(&[0b1010_1000, 1], 0), ("DB 0xa8".to_string(), 1));
    }

    #[test]
    fn test_listing_walks_variable_length() {
        let bytes = [0b1001_1001, 0, 8, 0b0100_0011, 0, 0b0000_0001];
        let addrs: Vec<usize> = listing(&bytes).iter().map(|(a, _, _)| *a).collect();
        assert_eq!(addrs, vec![0, 3, 5]);
    }

    #[test]
    fn test_disassemble_program() {
        let out = disassemble(&[0b1001_1001, 0, 8, 0b0100_0011, 0, 0b0000_0001]);
        assert!(out.contains("00: 99 00 08  LDI R0, 8"));
        assert!(out.contains("03: 43 00     PRN R0"));
        assert!(out.contains("05: 01        HLT"));
    }
}
