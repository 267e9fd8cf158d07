//! LS-8 program image format.
//!
//! A program image is plain text:
//! - One byte per line, written as eight `0`/`1` characters
//! - Anything after `#` is a comment
//! - Surrounding whitespace is ignored
//! - Blank, comment-only and unparseable lines are skipped
//!
//! ```text
//! # print8.ls8
//! 10011001 # LDI R0,8
//! 00000000
//! 00001000
//! 01000011 # PRN R0
//! 00000000
//! 00000001 # HLT
//! ```

use crate::asm::disasm::disassemble_at;
use crate::cpu::{Cpu, MemoryError};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// A parsed program image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramImage {
    /// Bytes in load order, starting at address 0.
    pub bytes: Vec<u8>,
    /// The line each byte came from (for debugging).
    pub source_lines: Vec<String>,
}

impl ProgramImage {
    /// Create a new empty image.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a byte.
    pub fn push(&mut self, byte: u8, source: &str) {
        self.bytes.push(byte);
        self.source_lines.push(source.to_string());
    }

    /// Get the number of bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Poke the image into a CPU's memory starting at address 0.
    pub fn load_into(&self, cpu: &mut Cpu) -> Result<(), ImageError> {
        cpu.load_program(&self.bytes)?;
        Ok(())
    }
}

/// Parse one image line. `None` for blank, comment-only or malformed lines.
pub fn parse_line(line: &str) -> Option<u8> {
    let code = line.split('#').next().unwrap_or("").trim();
    if code.is_empty() || !code.bytes().all(|c| c == b'0' || c == b'1') {
        return None;
    }
    u8::from_str_radix(code, 2).ok()
}

/// Parse image text. Never fails: lines that do not hold a byte are skipped.
pub fn parse_image(text: &str) -> ProgramImage {
    let mut image = ProgramImage::new();

    for (line_num, line) in text.lines().enumerate() {
        match parse_line(line) {
            Some(byte) => image.push(byte, line.trim()),
            None => {
                let code = line.split('#').next().unwrap_or("").trim();
                if !code.is_empty() {
                    log::debug!("skipping line {}: {:?}", line_num + 1, line);
                }
            }
        }
    }

    image
}

/// Load an image file from disk.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<ProgramImage, ImageError> {
    let text = std::fs::read_to_string(path.as_ref())
        .map_err(|e| ImageError::Io(e.to_string()))?;
    Ok(parse_image(&text))
}

/// Render bytes as image text, annotating each instruction with its
/// disassembly.
pub fn format_image(bytes: &[u8]) -> String {
    let mut out = String::new();
    out.push_str("# LS-8 program image\n");
    out.push_str(&format!("# {} bytes\n\n", bytes.len()));

    let mut addr = 0;
    while addr < bytes.len() {
        let (text, len) = disassemble_at(bytes, addr);
        out.push_str(&format!("{:08b} # {:02x}: {}\n", bytes[addr], addr, text));
        for byte in bytes.iter().skip(addr + 1).take(len - 1) {
            out.push_str(&format!("{:08b}\n", byte));
        }
        addr += len;
    }

    out
}

/// Save bytes as an image file.
pub fn save_image<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<(), ImageError> {
    let mut file = std::fs::File::create(path.as_ref())
        .map_err(|e| ImageError::Io(e.to_string()))?;
    file.write_all(format_image(bytes).as_bytes())
        .map_err(|e| ImageError::Io(e.to_string()))?;
    Ok(())
}

/// Errors that can occur while loading or saving images.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("cannot load image: {0}")]
    Memory(#[from] MemoryError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CaptureConsole;

    const PRINT8: &str = "\
# print8.ls8
10011001 # LDI R0,8
00000000
00001000
01000011 # PRN R0
00000000
00000001 # HLT
";

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("10011001"), Some(0b1001_1001));
        assert_eq!(parse_line("  00000001   # HLT"), Some(1));
        assert_eq!(parse_line("\t01000011\t"), Some(0b0100_0011));
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("# just a comment"), None);
        assert_eq!(parse_line("hello"), None);
        assert_eq!(parse_line("1002"), None);
        assert_eq!(parse_line("+1"), None);
        // Wider than a byte
        assert_eq!(parse_line("100000000"), None);
    }

    #[test]
    fn test_parse_image_skips_noise() {
        let image = parse_image("\n# header\n\n10011001\nnot a byte\n00000000 # R0\n   \n");
        assert_eq!(image.bytes, vec![0b1001_1001, 0]);
        assert_eq!(image.source_lines, vec!["10011001", "00000000 # R0"]);
    }

    #[test]
    fn test_print8_runs() {
        let image = parse_image(PRINT8);
        assert_eq!(image.len(), 6);

        let console = CaptureConsole::new();
        let mut cpu = Cpu::with_console(console.clone());
        image.load_into(&mut cpu).unwrap();
        cpu.run().unwrap();

        assert_eq!(console.lines(), vec!["8"]);
        assert!(cpu.is_halted());
    }

    #[test]
    fn test_image_too_large() {
        let image = parse_image(&"00000001\n".repeat(5));
        let mut cpu = Cpu::with_memory_size(4).unwrap();

        assert_eq!(
            image.load_into(&mut cpu),
            Err(ImageError::Memory(MemoryError::ProgramTooLarge { size: 5, available: 4 }))
        );
    }

    #[test]
    fn test_format_image() {
        let text = format_image(&[0b1001_1001, 0, 8, 0b0000_0001]);
        let lines: Vec<&str> = text.lines().filter(|l| !l.starts_with('#') && !l.is_empty()).collect();
        assert_eq!(lines, vec![
            "10011001 # 00: LDI R0, 8",
            "00000000",
            "00001000",
            "00000001 # 03: HLT",
        ]);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let bytes = [0b1001_1001, 0, 8, 0b0100_0011, 0, 0b0000_0001, 0xFF];
        let path = std::env::temp_dir().join(format!("ls8-image-{}.ls8", std::process::id()));

        save_image(&path, &bytes).unwrap();
        let image = load_image(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(image.bytes, bytes);
    }

    #[test]
    fn test_sample_programs() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("programs");
        let cases: [(&str, &[u8]); 4] = [
            ("print8.ls8", &[8]),
            ("mult.ls8", &[72]),
            ("stack.ls8", &[2, 1]),
            ("call.ls8", &[20]),
        ];

        for (name, expected) in cases {
            let image = load_image(dir.join(name)).unwrap();
            let console = CaptureConsole::new();
            let mut cpu = Cpu::with_console(console.clone());
            image.load_into(&mut cpu).unwrap();
            cpu.run().unwrap();

            assert_eq!(console.values(), expected, "{}", name);
            assert!(cpu.fault().is_none(), "{}", name);
        }
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            load_image("/definitely/not/here.ls8"),
            Err(ImageError::Io(_))
        ));
    }
}
