//! LS-8 CPU registers.
//!
//! The LS-8 has:
//! - R0-R7: eight byte-wide general-purpose registers
//! - PC: program counter (byte address of the next instruction)
//! - SP: stack pointer (byte address of the top of the stack)
//! - FL: flags, of which only E (equal) is defined
//!
//! PC and SP live in their own fields rather than in the general-purpose
//! array, so R7 is an ordinary register.

use serde::{Serialize, Deserialize};
use std::fmt;

/// Number of general-purpose registers.
pub const NUM_REGISTERS: usize = 8;

/// Initial stack pointer. The stack grows down from here.
pub const STACK_TOP: u8 = 0xF4;

/// A validated general-purpose register index (R0-R7).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reg(u8);

impl Reg {
    /// Create a register index, or `None` if it is not 0-7.
    pub const fn new(index: u8) -> Option<Self> {
        if (index as usize) < NUM_REGISTERS {
            Some(Self(index))
        } else {
            None
        }
    }

    /// The raw index.
    #[inline]
    pub const fn index(self) -> u8 {
        self.0
    }
}

impl fmt::Debug for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Condition flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    /// E: set by CMP when both operands are equal.
    pub equal: bool,
}

/// The LS-8 register file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// R0-R7
    pub r: [u8; NUM_REGISTERS],

    /// PC: program counter
    pub pc: u8,

    /// SP: stack pointer
    pub sp: u8,

    /// FL: condition flags
    pub flags: Flags,
}

impl Registers {
    /// Create a new register file: everything zeroed, SP at [`STACK_TOP`].
    pub fn new() -> Self {
        Self {
            r: [0; NUM_REGISTERS],
            pc: 0,
            sp: STACK_TOP,
            flags: Flags::default(),
        }
    }

    /// Reset all registers to their power-on values.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Read a general-purpose register.
    #[inline]
    pub fn get(&self, reg: Reg) -> u8 {
        self.r[reg.index() as usize]
    }

    /// Write a general-purpose register.
    #[inline]
    pub fn set(&mut self, reg: Reg, value: u8) {
        self.r[reg.index() as usize] = value;
    }

    /// Advance the program counter past an instruction of `len` bytes.
    /// Returns the old value.
    pub fn advance_pc(&mut self, len: u8) -> u8 {
        let old = self.pc;
        self.pc = self.pc.wrapping_add(len);
        old
    }

    /// Set the program counter to an absolute address.
    pub fn jump(&mut self, addr: u8) {
        self.pc = addr;
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}
