//! # LS-8 Emulator
//!
//! An emulator for the LS-8, a tiny 8-bit computer used to teach how a
//! processor works.
//!
//! The LS-8 fetches one-byte opcodes from a flat 256-byte memory, decodes
//! them against a fixed 13-instruction set and executes them against eight
//! byte-wide registers, a downward-growing stack and a single equality flag.

pub mod cpu;
pub mod asm;

#[cfg(feature = "tui")]
pub mod tui;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use cpu::{Cpu, CpuState, CpuError, Memory, Registers, Instruction, Opcode, Console, CaptureConsole};
pub use asm::{assemble, disassemble, AssemblerError, ProgramImage, ImageError, parse_image, load_image, save_image};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
