//! CPU execution engine for the LS-8.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.

use crate::cpu::{Memory, Registers};
use crate::cpu::alu::{alu, AluOp};
use crate::cpu::console::{Console, StdoutConsole};
use crate::cpu::decode::{self, Instruction, DecodeError};
use crate::cpu::memory::MemoryError;
use crate::cpu::registers::Reg;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// CPU is running normally.
    Running,
    /// CPU has halted (HLT or a fatal error). Terminal.
    Halted,
}

/// Where the program counter goes after an instruction executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// Fall through to the next instruction.
    Next,
    /// Control transferred to an absolute address.
    Jump(u8),
}

/// The LS-8 CPU.
#[derive(Serialize)]
pub struct Cpu {
    /// CPU registers.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Current execution state.
    pub state: CpuState,
    /// Instruction count (for profiling).
    pub cycles: u64,
    /// Last executed instruction (for debugging).
    last_instr: Option<Instruction>,
    /// The error that halted the CPU, if any.
    #[serde(skip)]
    fault: Option<CpuError>,
    #[serde(skip)]
    console: Box<dyn Console>,
}

impl Cpu {
    /// Create a new CPU with zeroed state that prints to stdout.
    pub fn new() -> Self {
        Self::with_memory(Memory::new())
    }

    /// Create a CPU around an existing memory.
    pub fn with_memory(mem: Memory) -> Self {
        Self {
            regs: Registers::new(),
            mem,
            state: CpuState::Running,
            cycles: 0,
            last_instr: None,
            fault: None,
            console: Box::new(StdoutConsole),
        }
    }

    /// Create a CPU with `size` bytes of memory.
    pub fn with_memory_size(size: usize) -> Result<Self, MemoryError> {
        Ok(Self::with_memory(Memory::with_size(size)?))
    }

    /// Create a CPU that sends `PRN` output to `console`.
    pub fn with_console<C: Console + 'static>(console: C) -> Self {
        let mut cpu = Self::new();
        cpu.set_console(console);
        cpu
    }

    /// Replace the console.
    pub fn set_console<C: Console + 'static>(&mut self, console: C) {
        self.console = Box::new(console);
    }

    /// Reset the CPU to initial state.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.mem.clear();
        self.state = CpuState::Running;
        self.cycles = 0;
        self.last_instr = None;
        self.fault = None;
    }

    /// Store a single byte in memory.
    pub fn load(&mut self, addr: usize, value: u8) -> Result<(), CpuError> {
        self.mem.write(addr, value)?;
        Ok(())
    }

    /// Load a program into memory at address 0.
    pub fn load_program(&mut self, program: &[u8]) -> Result<(), MemoryError> {
        self.mem.load_program(0, program)
    }

    /// Execute a single instruction.
    ///
    /// Returns the instruction that was executed, or an error. Every error
    /// halts the CPU and leaves registers and memory as they were before
    /// the failing cycle.
    pub fn step(&mut self) -> Result<Instruction, CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }

        let pc = self.regs.pc;
        match self.cycle() {
            Ok(instr) => {
                self.cycles += 1;
                self.last_instr = Some(instr);
                log::trace!(
                    "{:02x}: {:<12} R={:?} SP={:02x} E={}",
                    pc,
                    instr.to_string(),
                    self.regs.r,
                    self.regs.sp,
                    u8::from(self.regs.flags.equal)
                );
                Ok(instr)
            }
            Err(e) => {
                log::warn!("CPU halted at PC={:02x}: {}", pc, e);
                self.state = CpuState::Halted;
                self.fault = Some(e.clone());
                Err(e)
            }
        }
    }

    /// One fetch-decode-execute-advance cycle.
    fn cycle(&mut self) -> Result<Instruction, CpuError> {
        // Fetch. Operand bytes are read ahead whether or not the opcode
        // uses them; past the end of memory they are simply absent.
        let pc = self.regs.pc as usize;
        let ir = self.mem.read(pc)?;
        let operands = [self.mem.peek(pc + 1), self.mem.peek(pc + 2)];

        // Decode
        let instr = decode::decode(ir, operands)?;

        // Execute
        match self.execute(instr)? {
            Flow::Next => {
                self.regs.advance_pc(instr.len());
            }
            Flow::Jump(addr) => self.regs.jump(addr),
        }

        Ok(instr)
    }

    /// Run until halt or error.
    ///
    /// Returns the number of instructions executed.
    pub fn run(&mut self) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;

        while self.state == CpuState::Running {
            self.step()?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Run for at most `max_cycles` instructions.
    pub fn run_limited(&mut self, max_cycles: u64) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;
        let limit = self.cycles.saturating_add(max_cycles);

        while self.state == CpuState::Running && self.cycles < limit {
            self.step()?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Execute a decoded instruction.
    fn execute(&mut self, instr: Instruction) -> Result<Flow, CpuError> {
        match instr {
            // ==================== Control ====================

            Instruction::Hlt => {
                self.state = CpuState::Halted;
            }

            Instruction::Call { reg } => {
                let target = self.regs.get(reg);
                // Return address skips this instruction's operand byte
                self.push(self.regs.pc.wrapping_add(2))?;
                return Ok(Flow::Jump(target));
            }

            Instruction::Ret => {
                let addr = self.pop()?;
                return Ok(Flow::Jump(addr));
            }

            Instruction::Jmp { reg } => {
                return Ok(Flow::Jump(self.regs.get(reg)));
            }

            Instruction::Jeq { reg } => {
                if self.regs.flags.equal {
                    return Ok(Flow::Jump(self.regs.get(reg)));
                }
            }

            Instruction::Jne { reg } => {
                if !self.regs.flags.equal {
                    return Ok(Flow::Jump(self.regs.get(reg)));
                }
            }

            // ==================== Data Transfer ====================

            Instruction::Ldi { reg, value } => {
                self.regs.set(reg, value);
            }

            Instruction::Prn { reg } => {
                self.console.print(self.regs.get(reg));
            }

            Instruction::Push { reg } => {
                self.push(self.regs.get(reg))?;
            }

            Instruction::Pop { reg } => {
                let value = self.pop()?;
                self.regs.set(reg, value);
            }

            // ==================== ALU ====================

            Instruction::Add { a, b } => self.alu(AluOp::Add, a, b),

            Instruction::Mul { a, b } => self.alu(AluOp::Mul, a, b),

            Instruction::Cmp { a, b } => {
                self.regs.flags.equal = self.regs.get(a) == self.regs.get(b);
            }
        }

        Ok(Flow::Next)
    }

    /// a := a <op> b
    fn alu(&mut self, op: AluOp, a: Reg, b: Reg) {
        let result = alu(op, self.regs.get(a), self.regs.get(b));
        self.regs.set(a, result);
    }

    /// Decrement SP, then store `value` at the new top of stack.
    fn push(&mut self, value: u8) -> Result<(), CpuError> {
        let sp = self.regs.sp.checked_sub(1).ok_or(CpuError::StackOverflow)?;
        self.mem.write(sp as usize, value)?;
        self.regs.sp = sp;
        Ok(())
    }

    /// Read the top of stack, then increment SP.
    fn pop(&mut self) -> Result<u8, CpuError> {
        let value = self.mem.read(self.regs.sp as usize)?;
        self.regs.sp = self.regs.sp.checked_add(1).ok_or(CpuError::StackUnderflow)?;
        Ok(value)
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// The error that halted the CPU, if it did not halt normally.
    pub fn fault(&self) -> Option<&CpuError> {
        self.fault.as_ref()
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .field("fault", &self.fault)
            .finish()
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("CPU not running: {0:?}")]
    NotRunning(CpuState),

    #[error("memory fault: {0}")]
    Memory(#[from] MemoryError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("stack overflow: SP would move below address 0")]
    StackOverflow,

    #[error("stack underflow: SP would move past address 0xff")]
    StackUnderflow,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::console::CaptureConsole;
    use crate::cpu::decode::encode;
    use crate::cpu::registers::STACK_TOP;
    use proptest::prelude::*;

    fn r(i: u8) -> Reg {
        Reg::new(i).unwrap()
    }

    fn make_program(instructions: &[Instruction]) -> Vec<u8> {
        instructions.iter().flat_map(encode).collect()
    }

    fn cpu_with(program: &[Instruction]) -> (Cpu, CaptureConsole) {
        let console = CaptureConsole::new();
        let mut cpu = Cpu::with_console(console.clone());
        cpu.load_program(&make_program(program)).unwrap();
        (cpu, console)
    }

    #[test]
    fn test_cpu_halt() {
        let (mut cpu, _) = cpu_with(&[Instruction::Hlt]);

        let executed = cpu.run().unwrap();

        assert_eq!(executed, 1);
        assert!(cpu.is_halted());
        assert!(cpu.fault().is_none());
    }

    #[test]
    fn test_step_after_halt() {
        let (mut cpu, _) = cpu_with(&[Instruction::Hlt]);
        cpu.run().unwrap();
        let regs = cpu.regs.clone();

        assert_eq!(cpu.step(), Err(CpuError::NotRunning(CpuState::Halted)));
        assert_eq!(cpu.regs, regs);
        assert_eq!(cpu.cycles, 1);
    }

    #[test]
    fn test_print8() {
        let console = CaptureConsole::new();
        let mut cpu = Cpu::with_console(console.clone());
        for (addr, byte) in [0b1001_1001, 0, 8, 0b0100_0011, 0, 0b0000_0001].into_iter().enumerate() {
            cpu.load(addr, byte).unwrap();
        }

        cpu.run().unwrap();

        assert_eq!(console.lines(), vec!["8"]);
        assert!(cpu.is_halted());
    }

    #[test]
    fn test_mult() {
        let (mut cpu, console) = cpu_with(&[
            Instruction::Ldi { reg: r(0), value: 8 },
            Instruction::Ldi { reg: r(1), value: 9 },
            Instruction::Mul { a: r(0), b: r(1) },
            Instruction::Prn { reg: r(0) },
            Instruction::Hlt,
        ]);

        let executed = cpu.run().unwrap();

        assert_eq!(executed, 5);
        assert_eq!(console.values(), vec![72]);
        assert_eq!(cpu.regs.r[1], 9);
    }

    #[test]
    fn test_pc_advances_by_length() {
        let (mut cpu, _) = cpu_with(&[
            Instruction::Ldi { reg: r(0), value: 1 },
            Instruction::Push { reg: r(0) },
            Instruction::Ret,
        ]);

        cpu.step().unwrap();
        assert_eq!(cpu.regs.pc, 3);
        cpu.step().unwrap();
        assert_eq!(cpu.regs.pc, 5);
    }

    #[test]
    fn test_call_ret() {
        // 0: LDI R1,8  3: CALL R1  5: PRN R0  7: HLT  8: LDI R0,42  11: RET
        let (mut cpu, console) = cpu_with(&[
            Instruction::Ldi { reg: r(1), value: 8 },
            Instruction::Call { reg: r(1) },
            Instruction::Prn { reg: r(0) },
            Instruction::Hlt,
            Instruction::Ldi { reg: r(0), value: 42 },
            Instruction::Ret,
        ]);

        cpu.step().unwrap();
        cpu.step().unwrap(); // CALL
        assert_eq!(cpu.regs.pc, 8);
        assert_eq!(cpu.regs.sp, STACK_TOP - 1);
        assert_eq!(cpu.mem.read(STACK_TOP as usize - 1).unwrap(), 5);

        cpu.step().unwrap();
        cpu.step().unwrap(); // RET
        assert_eq!(cpu.regs.pc, 5);
        assert_eq!(cpu.regs.sp, STACK_TOP);

        cpu.run().unwrap();
        assert_eq!(console.values(), vec![42]);
    }

    #[test]
    fn test_jmp() {
        // 0: LDI R0,6  3: JMP R0  5: HLT  6: PRN R0  8: HLT
        let (mut cpu, console) = cpu_with(&[
            Instruction::Ldi { reg: r(0), value: 6 },
            Instruction::Jmp { reg: r(0) },
            Instruction::Hlt,
            Instruction::Prn { reg: r(0) },
            Instruction::Hlt,
        ]);

        let executed = cpu.run().unwrap();

        assert_eq!(executed, 4);
        assert_eq!(console.values(), vec![6]);
    }

    #[test]
    fn test_flag_persists() {
        let (mut cpu, _) = cpu_with(&[
            Instruction::Ldi { reg: r(0), value: 3 },
            Instruction::Cmp { a: r(0), b: r(0) },
            Instruction::Ldi { reg: r(0), value: 4 },
            Instruction::Add { a: r(0), b: r(0) },
            Instruction::Hlt,
        ]);

        cpu.run().unwrap();
        assert!(cpu.regs.flags.equal);
    }

    #[test]
    fn test_illegal_instruction() {
        let (mut cpu, console) = cpu_with(&[]);
        cpu.load_program(&[0b1111_1111, 0, 0]).unwrap();
        cpu.regs.r[0] = 17;
        let regs = cpu.regs.clone();
        let mem = cpu.mem.as_slice().to_vec();

        let err = cpu.step().unwrap_err();

        assert_eq!(err, CpuError::Decode(DecodeError::IllegalInstruction(0xFF)));
        assert!(cpu.is_halted());
        assert_eq!(cpu.fault(), Some(&err));
        assert_eq!(cpu.regs, regs);
        assert_eq!(cpu.mem.as_slice(), &mem[..]);
        assert_eq!(cpu.cycles, 0);
        assert!(console.values().is_empty());
    }

    #[test]
    fn test_invalid_register_halts() {
        let (mut cpu, _) = cpu_with(&[]);
        cpu.load_program(&[0b1001_1001, 9, 1]).unwrap();

        assert_eq!(
            cpu.run(),
            Err(CpuError::Decode(DecodeError::InvalidRegister { opcode: 0b1001_1001, index: 9 }))
        );
        assert!(cpu.is_halted());
    }

    #[test]
    fn test_push_out_of_bounds() {
        let mut cpu = Cpu::with_memory_size(16).unwrap();
        cpu.set_console(CaptureConsole::new());
        cpu.load_program(&make_program(&[
            Instruction::Ldi { reg: r(0), value: 5 },
            Instruction::Push { reg: r(0) },
        ])).unwrap();

        cpu.step().unwrap();
        let err = cpu.step().unwrap_err();

        assert_eq!(
            err,
            CpuError::Memory(MemoryError::AddressOutOfRange { address: 0xF3, size: 16 })
        );
        assert_eq!(cpu.regs.sp, STACK_TOP);
        assert_eq!(cpu.regs.pc, 3);
        assert!(cpu.is_halted());
    }

    #[test]
    fn test_operand_past_end_of_memory() {
        let mut cpu = Cpu::with_memory_size(4).unwrap();
        // LDI R0,5 then a PRN whose operand would be at address 4
        cpu.load_program(&[0b1001_1001, 0, 5, 0b0100_0011]).unwrap();

        cpu.step().unwrap();
        assert_eq!(
            cpu.step(),
            Err(CpuError::Decode(DecodeError::MissingOperand { opcode: 0b0100_0011 }))
        );
    }

    #[test]
    fn test_read_ahead_past_end_is_harmless() {
        let mut cpu = Cpu::with_memory_size(2).unwrap();
        // HLT in the last byte: both read-ahead slots are past the end
        cpu.load_program(&[0b0000_0000, 0b0000_0001]).unwrap();
        cpu.regs.pc = 1;

        assert_eq!(cpu.step(), Ok(Instruction::Hlt));
    }

    #[test]
    fn test_stack_overflow() {
        let (mut cpu, _) = cpu_with(&[Instruction::Push { reg: r(0) }]);
        cpu.regs.sp = 0;

        assert_eq!(cpu.step(), Err(CpuError::StackOverflow));
        assert_eq!(cpu.regs.sp, 0);
    }

    #[test]
    fn test_stack_underflow() {
        let (mut cpu, _) = cpu_with(&[Instruction::Pop { reg: r(0) }]);
        cpu.regs.sp = 0xFF;
        cpu.mem.write(0xFF, 9).unwrap();

        assert_eq!(cpu.step(), Err(CpuError::StackUnderflow));
        assert_eq!(cpu.regs.r[0], 0);
        assert_eq!(cpu.regs.sp, 0xFF);
    }

    #[test]
    fn test_run_limited() {
        // 0: LDI R0,3  3: JMP R0, loops forever
        let (mut cpu, _) = cpu_with(&[
            Instruction::Ldi { reg: r(0), value: 3 },
            Instruction::Jmp { reg: r(0) },
        ]);

        assert_eq!(cpu.run_limited(10).unwrap(), 10);
        assert!(cpu.is_running());
        assert_eq!(cpu.regs.pc, 3);
    }

    #[test]
    fn test_reset() {
        let (mut cpu, _) = cpu_with(&[Instruction::Ldi { reg: r(2), value: 7 }, Instruction::Hlt]);
        cpu.run().unwrap();

        cpu.reset();

        assert!(cpu.is_running());
        assert_eq!(cpu.cycles, 0);
        assert_eq!(cpu.regs, Registers::new());
        assert!(cpu.mem.as_slice().iter().all(|&b| b == 0));
        assert!(cpu.last_instruction().is_none());
    }

    #[test]
    fn test_state_serializes() {
        let (mut cpu, _) = cpu_with(&[Instruction::Ldi { reg: r(0), value: 8 }, Instruction::Hlt]);
        cpu.run().unwrap();

        let json = serde_json::to_value(&cpu).unwrap();
        assert_eq!(json["state"], "Halted");
        assert_eq!(json["regs"]["r"][0], 8);
        assert_eq!(json["regs"]["sp"], 0xF4);
        assert_eq!(json["cycles"], 2);
    }

    proptest! {
        #[test]
        fn prop_add_wraps(a in 0u8..8, b in 0u8..8, v: u8, w: u8) {
            let (mut cpu, _) = cpu_with(&[
                Instruction::Ldi { reg: r(a), value: v },
                Instruction::Ldi { reg: r(b), value: w },
                Instruction::Add { a: r(a), b: r(b) },
            ]);
            for _ in 0..3 {
                cpu.step().unwrap();
            }
            // With A == B the second LDI overwrote the first
            let expected = if a == b { w.wrapping_add(w) } else { v.wrapping_add(w) };
            prop_assert_eq!(cpu.regs.r[a as usize], expected);
        }

        #[test]
        fn prop_push_pop_roundtrip(a in 0u8..8, b in 0u8..8, v: u8) {
            let (mut cpu, _) = cpu_with(&[
                Instruction::Ldi { reg: r(a), value: v },
                Instruction::Push { reg: r(a) },
                Instruction::Pop { reg: r(b) },
            ]);
            for _ in 0..3 {
                cpu.step().unwrap();
            }
            prop_assert_eq!(cpu.regs.r[b as usize], v);
            prop_assert_eq!(cpu.regs.sp, STACK_TOP);
        }

        #[test]
        fn prop_call_ret_returns_past_call(target in 8u8..0xE0, v: u8) {
            // 0: LDI R1,target  3: CALL R1  5: PRN R0  7: HLT
            let (mut cpu, console) = cpu_with(&[
                Instruction::Ldi { reg: r(1), value: target },
                Instruction::Call { reg: r(1) },
                Instruction::Prn { reg: r(0) },
                Instruction::Hlt,
            ]);
            let subroutine = make_program(&[
                Instruction::Ldi { reg: r(0), value: v },
                Instruction::Ret,
            ]);
            cpu.mem.load_program(target as usize, &subroutine).unwrap();

            cpu.step().unwrap();
            cpu.step().unwrap(); // CALL
            prop_assert_eq!(cpu.regs.pc, target);
            prop_assert_eq!(cpu.regs.sp, STACK_TOP - 1);

            cpu.step().unwrap();
            cpu.step().unwrap(); // RET
            prop_assert_eq!(cpu.regs.pc, 5);
            prop_assert_eq!(cpu.regs.sp, STACK_TOP);

            cpu.run().unwrap();
            prop_assert_eq!(console.values(), vec![v]);
        }

        #[test]
        fn prop_cmp_branches_exclusive(v: u8, w: u8) {
            // The branch sits at address 12 and is two bytes long
            let pc_after = |branch: Instruction| {
                let (mut cpu, _) = cpu_with(&[
                    Instruction::Ldi { reg: r(0), value: v },
                    Instruction::Ldi { reg: r(1), value: w },
                    Instruction::Ldi { reg: r(2), value: 0x80 },
                    Instruction::Cmp { a: r(0), b: r(1) },
                    branch,
                ]);
                for _ in 0..5 {
                    cpu.step().unwrap();
                }
                assert_eq!(cpu.regs.flags.equal, v == w);
                cpu.regs.pc
            };

            let jeq = pc_after(Instruction::Jeq { reg: r(2) });
            let jne = pc_after(Instruction::Jne { reg: r(2) });
            prop_assert_eq!(jeq, if v == w { 0x80 } else { 14 });
            prop_assert_eq!(jne, if v != w { 0x80 } else { 14 });
        }
    }
}
