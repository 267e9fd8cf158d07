//! CPU emulation for the LS-8.
//!
//! This module implements the complete LS-8 architecture:
//! - 256 bytes of flat memory
//! - 8 general-purpose registers R0-R7, plus PC, SP and the E flag
//! - 13-instruction set with 1-3 byte instructions

pub mod memory;
pub mod registers;
pub mod alu;
pub mod decode;
pub mod console;
pub mod execute;

pub use memory::{Memory, MemoryError};
pub use registers::{Registers, Reg, Flags};
pub use decode::{Instruction, Opcode, DecodeError};
pub use console::{Console, StdoutConsole, CaptureConsole};
pub use execute::{Cpu, CpuError, CpuState};
