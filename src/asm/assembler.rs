//! Simple assembler for LS-8 programs.
//!
//! Syntax:
//! ```text
//! ; Comment (# also works)
//! START:              ; Define a label
//!     LDI R0, 8       ; Load immediate into register
//!     LDI R1, MULT    ; Labels are immediates too
//!     CALL R1
//!     PRN R0
//!     HLT
//! MULT:
//!     MUL R0, R0
//!     RET
//!
//!     ORG 0x40        ; Pad with zeros up to an address
//!     DB 42, 0b101    ; Raw data bytes
//! ```

use crate::cpu::decode::Opcode;
use crate::cpu::memory::MAX_MEMORY_SIZE;
use crate::cpu::registers::Reg;
use std::collections::HashMap;
use thiserror::Error;

/// Assemble source code to a program image.
pub fn assemble(source: &str) -> Result<Vec<u8>, AssemblerError> {
    let mut asm = Assembler::new();
    asm.assemble(source)
}

/// The assembler state.
struct Assembler {
    /// Symbol table (label -> address).
    symbols: HashMap<String, usize>,
    /// Forward references: (output_index, label, source_line).
    pending: Vec<(usize, String, usize)>,
    /// Output bytes. The current address is always `output.len()`.
    output: Vec<u8>,
}

impl Assembler {
    fn new() -> Self {
        Self {
            symbols: HashMap::new(),
            pending: Vec::new(),
            output: Vec::new(),
        }
    }

    fn assemble(&mut self, source: &str) -> Result<Vec<u8>, AssemblerError> {
        // Pass 1: Collect labels and generate code
        for (line_num, line) in source.lines().enumerate() {
            self.process_line(line, line_num + 1)?;
        }

        if self.output.len() > MAX_MEMORY_SIZE {
            return Err(AssemblerError::ProgramTooLarge(self.output.len()));
        }

        // Pass 2: Resolve forward references
        self.resolve_references()?;

        Ok(std::mem::take(&mut self.output))
    }

    fn process_line(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        // Remove comments
        let line = match line.find([';', '#']) {
            Some(idx) => &line[..idx],
            None => line,
        };
        let line = line.trim();

        if line.is_empty() {
            return Ok(());
        }

        // Check for label definition
        if let Some(colon_idx) = line.find(':') {
            let label = line[..colon_idx].trim().to_uppercase();
            if !is_identifier(&label) {
                return Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: format!("invalid label {:?}", label),
                });
            }
            if self.symbols.insert(label.clone(), self.output.len()).is_some() {
                return Err(AssemblerError::SyntaxError {
                    line: line_num,
                    message: format!("duplicate label {}", label),
                });
            }

            // Process rest of line if any
            let rest = line[colon_idx + 1..].trim();
            if !rest.is_empty() {
                return self.process_statement(rest, line_num);
            }
            return Ok(());
        }

        self.process_statement(line, line_num)
    }

    fn process_statement(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let (mnemonic, rest) = match line.split_once(char::is_whitespace) {
            Some((m, r)) => (m, r.trim()),
            None => (line, ""),
        };
        let mnemonic = mnemonic.to_uppercase();
        let operands: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split(',').map(str::trim).collect()
        };

        match mnemonic.as_str() {
            // Directives
            "ORG" => {
                let [operand] = operands[..] else {
                    return Err(AssemblerError::SyntaxError {
                        line: line_num,
                        message: "ORG requires one address".into(),
                    });
                };
                let addr = parse_number(operand, line_num)?;
                if addr < self.output.len() as i64 || addr > MAX_MEMORY_SIZE as i64 {
                    return Err(AssemblerError::ValueOutOfRange { line: line_num, value: addr });
                }
                self.output.resize(addr as usize, 0);
            }

            "DB" | "DATA" => {
                if operands.is_empty() {
                    return Err(AssemblerError::SyntaxError {
                        line: line_num,
                        message: "DB requires at least one value".into(),
                    });
                }
                for operand in operands {
                    let value = self.parse_immediate(operand, line_num)?;
                    self.emit(value);
                }
            }

            // Instructions
            _ => {
                let opcode = Opcode::from_mnemonic(&mnemonic).ok_or_else(|| {
                    AssemblerError::UnknownMnemonic { line: line_num, mnemonic: mnemonic.clone() }
                })?;

                let expected = opcode.operand_count() as usize;
                if operands.len() != expected {
                    return Err(AssemblerError::SyntaxError {
                        line: line_num,
                        message: format!(
                            "{} expects {} operand(s), found {}",
                            opcode.mnemonic(), expected, operands.len()
                        ),
                    });
                }

                self.emit(opcode.byte());
                for (i, operand) in operands.into_iter().enumerate() {
                    // LDI's second operand is the only immediate
                    let byte = if opcode == Opcode::Ldi && i == 1 {
                        self.parse_immediate(operand, line_num)?
                    } else {
                        parse_register(operand, line_num)?.index()
                    };
                    self.emit(byte);
                }
            }
        }

        Ok(())
    }

    /// Parse an immediate byte. Labels become a placeholder that pass 2
    /// patches.
    fn parse_immediate(&mut self, operand: &str, line_num: usize) -> Result<u8, AssemblerError> {
        if operand.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+') {
            let value = parse_number(operand, line_num)?;
            return u8::try_from(value)
                .map_err(|_| AssemblerError::ValueOutOfRange { line: line_num, value });
        }

        let label = operand.to_uppercase();
        if !is_identifier(&label) {
            return Err(AssemblerError::SyntaxError {
                line: line_num,
                message: format!("invalid operand {:?}", operand),
            });
        }

        // Must be a label reference - store for pass 2
        self.pending.push((self.output.len(), label, line_num));
        Ok(0)
    }

    fn emit(&mut self, byte: u8) {
        self.output.push(byte);
    }

    fn resolve_references(&mut self) -> Result<(), AssemblerError> {
        for (out_idx, label, line_num) in &self.pending {
            let addr = *self.symbols.get(label)
                .ok_or_else(|| AssemblerError::UndefinedLabel {
                    line: *line_num,
                    label: label.clone()
                })?;

            self.output[*out_idx] = u8::try_from(addr)
                .map_err(|_| AssemblerError::ValueOutOfRange { line: *line_num, value: addr as i64 })?;
        }
        Ok(())
    }
}

/// Parse `R0`-`R7`.
fn parse_register(operand: &str, line_num: usize) -> Result<Reg, AssemblerError> {
    operand
        .strip_prefix(['R', 'r'])
        .and_then(|n| n.parse::<u8>().ok())
        .and_then(Reg::new)
        .ok_or_else(|| AssemblerError::InvalidRegister {
            line: line_num,
            operand: operand.to_string(),
        })
}

/// Parse a decimal, `0x` hex or `0b` binary number.
fn parse_number(operand: &str, line_num: usize) -> Result<i64, AssemblerError> {
    let lower = operand.to_ascii_lowercase();
    let parsed = if let Some(hex) = lower.strip_prefix("0x") {
        i64::from_str_radix(hex, 16)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        i64::from_str_radix(bin, 2)
    } else {
        lower.parse::<i64>()
    };

    parsed.map_err(|_| AssemblerError::SyntaxError {
        line: line_num,
        message: format!("invalid number {:?}", operand),
    })
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("value out of range on line {line}: {value}")]
    ValueOutOfRange { line: usize, value: i64 },

    #[error("invalid register on line {line}: {operand}")]
    InvalidRegister { line: usize, operand: String },

    #[error("program is {0} bytes, larger than memory")]
    ProgramTooLarge(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::{CaptureConsole, Cpu};

    fn run(source: &str) -> Vec<u8> {
        let program = assemble(source).unwrap();
        let console = CaptureConsole::new();
        let mut cpu = Cpu::with_console(console.clone());
        cpu.load_program(&program).unwrap();
        cpu.run().unwrap();
        console.values()
    }

    #[test]
    fn test_assemble_print8() {
        let source = r#"
            ; print8
            LDI R0, 8   ; Store 8 into R0
            PRN R0      # Print the value in R0
            HLT
        "#;

        let result = assemble(source).unwrap();
        assert_eq!(result, vec![0b1001_1001, 0, 8, 0b0100_0011, 0, 0b0000_0001]);
    }

    #[test]
    fn test_assemble_with_labels() {
        let source = r#"
        START:
            LDI R0, 3
            LDI R1, SQUARE
            CALL R1
            PRN R0
            HLT
        SQUARE: MUL R0, R0
            RET
        "#;

        let result = assemble(source).unwrap();
        // SQUARE is at 3 + 3 + 2 + 2 + 1 = 11
        assert_eq!(result[5], 11);
        assert_eq!(run(source), vec![9]);
    }

    #[test]
    fn test_assemble_loop() {
        let source = r#"
            LDI R0, 0
            LDI R1, 1
            LDI R2, 3
            LDI R3, LOOP
        LOOP:
            ADD R0, R1
            PRN R0
            CMP R0, R2
            JNE R3
            HLT
        "#;

        assert_eq!(run(source), vec![1, 2, 3]);
    }

    #[test]
    fn test_assemble_data() {
        let source = r#"
            DB 42
            DATA 0xff, 0b101
            ORG 8
            DB 1
        "#;

        let result = assemble(source).unwrap();
        assert_eq!(result, vec![42, 255, 5, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_unknown_mnemonic() {
        assert_eq!(
            assemble("NOP"),
            Err(AssemblerError::UnknownMnemonic { line: 1, mnemonic: "NOP".into() })
        );
    }

    #[test]
    fn test_operand_count_checked() {
        assert!(matches!(
            assemble("LDI R0"),
            Err(AssemblerError::SyntaxError { line: 1, .. })
        ));
        assert!(matches!(
            assemble("HLT R0"),
            Err(AssemblerError::SyntaxError { line: 1, .. })
        ));
    }

    #[test]
    fn test_invalid_register() {
        assert_eq!(
            assemble("\nPRN R8"),
            Err(AssemblerError::InvalidRegister { line: 2, operand: "R8".into() })
        );
        assert!(matches!(assemble("ADD R0, 5"), Err(AssemblerError::InvalidRegister { .. })));
    }

    #[test]
    fn test_value_out_of_range() {
        assert_eq!(
            assemble("LDI R0, 256"),
            Err(AssemblerError::ValueOutOfRange { line: 1, value: 256 })
        );
        assert_eq!(
            assemble("DB -1"),
            Err(AssemblerError::ValueOutOfRange { line: 1, value: -1 })
        );
    }

    #[test]
    fn test_undefined_label() {
        assert_eq!(
            assemble("LDI R0, NOWHERE"),
            Err(AssemblerError::UndefinedLabel { line: 1, label: "NOWHERE".into() })
        );
    }

    #[test]
    fn test_duplicate_label() {
        assert!(matches!(
            assemble("A:\nA:"),
            Err(AssemblerError::SyntaxError { line: 2, .. })
        ));
    }

    #[test]
    fn test_org_cannot_move_backwards() {
        assert!(matches!(
            assemble("DB 1, 2, 3\nORG 1"),
            Err(AssemblerError::ValueOutOfRange { line: 2, value: 1 })
        ));
    }

    #[test]
    fn test_program_too_large() {
        assert_eq!(assemble("ORG 256\nDB 0"), Err(AssemblerError::ProgramTooLarge(257)));
    }
}
