//! Arithmetic/logic unit.
//!
//! Register-to-register integer arithmetic on byte-wide values. Results
//! wrap modulo 256.

use serde::{Serialize, Deserialize};

/// Operations the ALU can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AluOp {
    Add,
    Mul,
}

/// Apply `op` to `a` and `b`.
#[inline]
pub fn alu(op: AluOp, a: u8, b: u8) -> u8 {
    match op {
        AluOp::Add => a.wrapping_add(b),
        AluOp::Mul => a.wrapping_mul(b),
    }
}
