//! WebAssembly bindings for the LS-8 emulator.
//!
//! This module provides JavaScript-friendly wrappers around the core emulator.

use wasm_bindgen::prelude::*;
use crate::{Cpu, CaptureConsole};
use crate::asm::assembler::assemble;
use crate::asm::disasm::disassemble_at;
use crate::asm::image::parse_image;

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// WebAssembly-friendly CPU wrapper.
#[wasm_bindgen]
pub struct WasmCpu {
    cpu: Cpu,
    console: CaptureConsole,
    program: Vec<u8>,
}

#[wasm_bindgen]
impl WasmCpu {
    /// Create a new CPU instance.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        let console = CaptureConsole::new();
        Self {
            cpu: Cpu::with_console(console.clone()),
            console,
            program: Vec::new(),
        }
    }

    /// Load a program from assembly source code. Returns its size in bytes.
    #[wasm_bindgen]
    pub fn load_asm(&mut self, source: &str) -> Result<usize, JsError> {
        let program = assemble(source)
            .map_err(|e| JsError::new(&format!("{}", e)))?;
        self.load(program)
    }

    /// Load a program from `.ls8` image text. Returns its size in bytes.
    #[wasm_bindgen]
    pub fn load_image(&mut self, text: &str) -> Result<usize, JsError> {
        self.load(parse_image(text).bytes)
    }

    fn load(&mut self, program: Vec<u8>) -> Result<usize, JsError> {
        self.cpu.reset();
        self.console.clear();
        self.cpu.load_program(&program)
            .map_err(|e| JsError::new(&format!("{}", e)))?;
        self.program = program;
        Ok(self.program.len())
    }

    /// Step one instruction. Returns the disassembled instruction.
    #[wasm_bindgen]
    pub fn step(&mut self) -> Result<String, JsError> {
        let instr = self.cpu.step()
            .map_err(|e| JsError::new(&format!("{}", e)))?;

        Ok(instr.to_string())
    }

    /// Run until halt or max cycles. Returns the total cycle count.
    #[wasm_bindgen]
    pub fn run(&mut self, max_cycles: u32) -> u64 {
        // Faults are reported through `state()` and `fault()`
        let _ = self.cpu.run_limited(max_cycles as u64);
        self.cpu.cycles
    }

    /// Reset CPU to initial state with loaded program.
    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.console.clear();
        if let Err(e) = self.cpu.load_program(&self.program) {
            log::warn!("failed to reload program after reset: {}", e);
        }
    }

    /// Check if CPU is running.
    #[wasm_bindgen]
    pub fn is_running(&self) -> bool {
        self.cpu.is_running()
    }

    /// Check if CPU is halted.
    #[wasm_bindgen]
    pub fn is_halted(&self) -> bool {
        self.cpu.is_halted()
    }

    /// The error that halted the CPU, if any.
    #[wasm_bindgen]
    pub fn fault(&self) -> Option<String> {
        self.cpu.fault().map(|e| e.to_string())
    }

    /// Get cycle count.
    #[wasm_bindgen]
    pub fn cycles(&self) -> u64 {
        self.cpu.cycles
    }

    /// Get program counter.
    #[wasm_bindgen]
    pub fn pc(&self) -> u8 {
        self.cpu.regs.pc
    }

    /// Get stack pointer.
    #[wasm_bindgen]
    pub fn sp(&self) -> u8 {
        self.cpu.regs.sp
    }

    /// Get a general-purpose register (0-7).
    #[wasm_bindgen]
    pub fn register(&self, index: usize) -> u8 {
        self.cpu.regs.r.get(index).copied().unwrap_or(0)
    }

    /// Get the E flag.
    #[wasm_bindgen]
    pub fn equal_flag(&self) -> bool {
        self.cpu.regs.flags.equal
    }

    /// Get state as string.
    #[wasm_bindgen]
    pub fn state(&self) -> String {
        format!("{:?}", self.cpu.state)
    }

    /// Values printed so far.
    #[wasm_bindgen]
    pub fn output(&self) -> js_sys::Uint8Array {
        js_sys::Uint8Array::from(self.console.values().as_slice())
    }

    /// Get a memory byte (0 past the end of memory).
    #[wasm_bindgen]
    pub fn memory_at(&self, addr: usize) -> u8 {
        self.cpu.mem.peek(addr).unwrap_or(0)
    }

    /// Get all memory as a typed array.
    #[wasm_bindgen]
    pub fn memory_all(&self) -> js_sys::Uint8Array {
        js_sys::Uint8Array::from(self.cpu.mem.as_slice())
    }

    /// Get registers as JSON string.
    #[wasm_bindgen]
    pub fn registers_json(&self) -> String {
        serde_json::json!({
            "regs": &self.cpu.regs,
            "state": self.cpu.state,
            "cycles": self.cpu.cycles,
        })
        .to_string()
    }
}

impl Default for WasmCpu {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble source code and return the program bytes.
#[wasm_bindgen]
pub fn wasm_assemble(source: &str) -> Result<Vec<u8>, JsError> {
    assemble(source).map_err(|e| JsError::new(&format!("{}", e)))
}

/// Disassemble the instruction at `addr` in `bytes`.
#[wasm_bindgen]
pub fn wasm_disassemble(bytes: &[u8], addr: usize) -> String {
    disassemble_at(bytes, addr).0
}
