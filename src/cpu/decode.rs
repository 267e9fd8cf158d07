//! Instruction decoder for the LS-8.
//!
//! Every instruction starts with a one-byte opcode. The top two bits of the
//! opcode give the number of operand bytes that follow it (0-2), so an
//! instruction is 1 to 3 bytes long.
//!
//! ```text
//!   7 6 5 4 3 2 1 0
//!  +---+-----------+
//!  |n n| operation |   nn = operand count
//!  +---+-----------+
//! ```

use crate::cpu::registers::Reg;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// The closed set of LS-8 opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Hlt = 0b0000_0001,
    Ret = 0b0000_1001,
    Prn = 0b0100_0011,
    Call = 0b0100_1000,
    Pop = 0b0100_1100,
    Push = 0b0100_1101,
    Jmp = 0b0101_0000,
    Jeq = 0b0101_0001,
    Jne = 0b0101_0010,
    Ldi = 0b1001_1001,
    Cmp = 0b1010_0000,
    Add = 0b1010_1000,
    Mul = 0b1010_1010,
}

impl Opcode {
    /// Every opcode, in byte order.
    pub const ALL: [Opcode; 13] = [
        Opcode::Hlt,
        Opcode::Ret,
        Opcode::Prn,
        Opcode::Call,
        Opcode::Pop,
        Opcode::Push,
        Opcode::Jmp,
        Opcode::Jeq,
        Opcode::Jne,
        Opcode::Ldi,
        Opcode::Cmp,
        Opcode::Add,
        Opcode::Mul,
    ];

    /// The opcode byte.
    #[inline]
    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// Number of operand bytes following the opcode.
    #[inline]
    pub const fn operand_count(self) -> u8 {
        operand_count(self as u8)
    }

    /// Assembly mnemonic.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Hlt => "HLT",
            Opcode::Ret => "RET",
            Opcode::Prn => "PRN",
            Opcode::Call => "CALL",
            Opcode::Pop => "POP",
            Opcode::Push => "PUSH",
            Opcode::Jmp => "JMP",
            Opcode::Jeq => "JEQ",
            Opcode::Jne => "JNE",
            Opcode::Ldi => "LDI",
            Opcode::Cmp => "CMP",
            Opcode::Add => "ADD",
            Opcode::Mul => "MUL",
        }
    }

    /// Look up an opcode by mnemonic (case-insensitive).
    pub fn from_mnemonic(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.mnemonic().eq_ignore_ascii_case(name))
    }
}

impl TryFrom<u8> for Opcode {
    type Error = DecodeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|op| op.byte() == byte)
            .ok_or(DecodeError::IllegalInstruction(byte))
    }
}

/// Number of operand bytes encoded in the top two bits of an opcode byte.
#[inline]
pub const fn operand_count(ir: u8) -> u8 {
    ir >> 6
}

/// Decoded LS-8 instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    // ==================== Control ====================

    /// Halt execution
    Hlt,

    /// Return: PC := [SP], SP := SP + 1
    Ret,

    /// Call subroutine: push PC + 2, PC := reg
    Call { reg: Reg },

    /// Unconditional jump: PC := reg
    Jmp { reg: Reg },

    /// Jump if equal: if E then PC := reg
    Jeq { reg: Reg },

    /// Jump if not equal: if !E then PC := reg
    Jne { reg: Reg },

    // ==================== Data Transfer ====================

    /// Load immediate: reg := value
    Ldi { reg: Reg, value: u8 },

    /// Print register as a decimal number
    Prn { reg: Reg },

    /// Push register onto the stack
    Push { reg: Reg },

    /// Pop the top of the stack into a register
    Pop { reg: Reg },

    // ==================== ALU ====================

    /// a := a + b
    Add { a: Reg, b: Reg },

    /// a := a * b
    Mul { a: Reg, b: Reg },

    /// E := (a == b)
    Cmp { a: Reg, b: Reg },
}

impl Instruction {
    /// The instruction's opcode.
    pub const fn opcode(&self) -> Opcode {
        match self {
            Instruction::Hlt => Opcode::Hlt,
            Instruction::Ret => Opcode::Ret,
            Instruction::Call { .. } => Opcode::Call,
            Instruction::Jmp { .. } => Opcode::Jmp,
            Instruction::Jeq { .. } => Opcode::Jeq,
            Instruction::Jne { .. } => Opcode::Jne,
            Instruction::Ldi { .. } => Opcode::Ldi,
            Instruction::Prn { .. } => Opcode::Prn,
            Instruction::Push { .. } => Opcode::Push,
            Instruction::Pop { .. } => Opcode::Pop,
            Instruction::Add { .. } => Opcode::Add,
            Instruction::Mul { .. } => Opcode::Mul,
            Instruction::Cmp { .. } => Opcode::Cmp,
        }
    }

    /// Encoded length in bytes (1-3).
    #[inline]
    pub const fn len(&self) -> u8 {
        1 + self.opcode().operand_count()
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self.opcode().mnemonic();
        match self {
            Instruction::Hlt | Instruction::Ret => write!(f, "{}", name),
            Instruction::Call { reg }
            | Instruction::Jmp { reg }
            | Instruction::Jeq { reg }
            | Instruction::Jne { reg }
            | Instruction::Prn { reg }
            | Instruction::Push { reg }
            | Instruction::Pop { reg } => write!(f, "{} {}", name, reg),
            Instruction::Ldi { reg, value } => write!(f, "{} {}, {}", name, reg, value),
            Instruction::Add { a, b }
            | Instruction::Mul { a, b }
            | Instruction::Cmp { a, b } => write!(f, "{} {}, {}", name, a, b),
        }
    }
}

/// Decode one instruction.
///
/// `operands` holds the two bytes following the opcode, or `None` where
/// they lie past the end of memory. Bytes the opcode does not consume are
/// ignored.
pub fn decode(ir: u8, operands: [Option<u8>; 2]) -> Result<Instruction, DecodeError> {
    let opcode = Opcode::try_from(ir)?;

    let byte = |i: usize| operands[i].ok_or(DecodeError::MissingOperand { opcode: ir });
    let reg = |i: usize| -> Result<Reg, DecodeError> {
        let index = byte(i)?;
        Reg::new(index).ok_or(DecodeError::InvalidRegister { opcode: ir, index })
    };

    let instruction = match opcode {
        Opcode::Hlt => Instruction::Hlt,
        Opcode::Ret => Instruction::Ret,
        Opcode::Prn => Instruction::Prn { reg: reg(0)? },
        Opcode::Call => Instruction::Call { reg: reg(0)? },
        Opcode::Pop => Instruction::Pop { reg: reg(0)? },
        Opcode::Push => Instruction::Push { reg: reg(0)? },
        Opcode::Jmp => Instruction::Jmp { reg: reg(0)? },
        Opcode::Jeq => Instruction::Jeq { reg: reg(0)? },
        Opcode::Jne => Instruction::Jne { reg: reg(0)? },
        Opcode::Ldi => Instruction::Ldi { reg: reg(0)?, value: byte(1)? },
        Opcode::Cmp => Instruction::Cmp { a: reg(0)?, b: reg(1)? },
        Opcode::Add => Instruction::Add { a: reg(0)?, b: reg(1)? },
        Opcode::Mul => Instruction::Mul { a: reg(0)?, b: reg(1)? },
    };

    Ok(instruction)
}

/// Decode the instruction starting at `addr` in a byte slice.
pub fn decode_at(bytes: &[u8], addr: usize) -> Result<Instruction, DecodeError> {
    let ir = bytes
        .get(addr)
        .copied()
        .ok_or(DecodeError::EndOfInput { address: addr })?;
    let operand = |offset: usize| addr.checked_add(offset).and_then(|a| bytes.get(a).copied());
    decode(ir, [operand(1), operand(2)])
}

/// Encode an instruction back to bytes.
pub fn encode(instr: &Instruction) -> Vec<u8> {
    let op = instr.opcode().byte();
    match *instr {
        Instruction::Hlt | Instruction::Ret => vec![op],
        Instruction::Prn { reg }
        | Instruction::Call { reg }
        | Instruction::Pop { reg }
        | Instruction::Push { reg }
        | Instruction::Jmp { reg }
        | Instruction::Jeq { reg }
        | Instruction::Jne { reg } => vec![op, reg.index()],
        Instruction::Ldi { reg, value } => vec![op, reg.index(), value],
        Instruction::Cmp { a, b }
        | Instruction::Add { a, b }
        | Instruction::Mul { a, b } => vec![op, a.index(), b.index()],
    }
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("illegal instruction {0:#010b}")]
    IllegalInstruction(u8),

    #[error("invalid register index {index} in instruction {opcode:#010b}")]
    InvalidRegister { opcode: u8, index: u8 },

    #[error("instruction {opcode:#010b} runs past the end of memory")]
    MissingOperand { opcode: u8 },

    #[error("no instruction at address {address:#04x}")]
    EndOfInput { address: usize },
}
