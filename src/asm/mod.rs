//! Assembler, disassembler and program images for the LS-8.
//!
//! This module provides:
//! - The `.ls8` program image format (one binary byte per line)
//! - A simple two-pass assembler (text → bytes)
//! - A disassembler (bytes → readable text)

pub mod assembler;
pub mod disasm;
pub mod image;

pub use assembler::{assemble, AssemblerError};
pub use disasm::{disassemble, disassemble_at};
pub use image::{ProgramImage, ImageError, parse_image, load_image, save_image};
