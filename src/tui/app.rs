//! Debugger application state and logic.

use crate::asm::disasm::listing;
use crate::cpu::{CaptureConsole, Cpu};
use std::collections::HashSet;

/// Bytes shown per row of the memory view.
pub const MEM_ROW_BYTES: usize = 8;

/// Debugger application state.
pub struct DebuggerApp {
    /// The CPU being debugged.
    pub cpu: Cpu,
    /// Loaded program, restored on reset.
    pub program: Vec<u8>,
    /// Values printed by the program.
    pub console: CaptureConsole,
    /// Breakpoints (by address).
    pub breakpoints: HashSet<u8>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Memory view scroll offset (in rows).
    pub mem_scroll: usize,
}

impl DebuggerApp {
    /// Create a new debugger with a loaded program.
    pub fn new(program: Vec<u8>) -> Self {
        let console = CaptureConsole::new();
        let mut cpu = Cpu::with_console(console.clone());
        let status = match cpu.load_program(&program) {
            Ok(()) => "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into(),
            Err(e) => format!("Load error: {}", e),
        };

        Self {
            cpu,
            program,
            console,
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status,
            mem_scroll: 0,
        }
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if !self.cpu.is_running() {
            self.status = match self.cpu.fault() {
                Some(e) => format!("CPU halted: {}", e),
                None => format!("CPU halted after {} cycles", self.cpu.cycles),
            };
            self.running = false;
            return;
        }

        let pc = self.cpu.regs.pc;
        match self.cpu.step() {
            Ok(instr) => {
                self.status = format!("PC={:02x}: {}", pc, instr);
            }
            Err(e) => {
                self.status = format!("Error: {}", e);
                self.running = false;
            }
        }
    }

    /// Run until halt, breakpoint, or error.
    pub fn run(&mut self) {
        self.running = true;
        self.status = "Running...".into();
    }

    /// Run one iteration of continuous execution.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }

        if !self.cpu.is_running() {
            self.running = false;
            self.status = format!("Halted after {} cycles", self.cpu.cycles);
            return;
        }

        self.step();

        // Check for breakpoint at the next instruction
        let pc = self.cpu.regs.pc;
        if self.running && self.breakpoints.contains(&pc) {
            self.running = false;
            self.status = format!("Breakpoint at PC={:02x}", pc);
        }
    }

    /// Toggle breakpoint at current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.cpu.regs.pc;
        if self.breakpoints.remove(&pc) {
            self.status = format!("Removed breakpoint at PC={:02x}", pc);
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at PC={:02x}", pc);
        }
    }

    /// Reset CPU to initial state.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.console.clear();
        self.running = false;
        self.status = match self.cpu.load_program(&self.program) {
            Ok(()) => "Reset. Ready.".into(),
            Err(e) => {
                log::warn!("failed to reload program after reset: {}", e);
                format!("Load error: {}", e)
            }
        };
    }

    /// Scroll the memory view, clamped to the last row.
    pub fn scroll_memory(&mut self, delta: isize) {
        let rows = self.cpu.mem.size().div_ceil(MEM_ROW_BYTES);
        self.mem_scroll = self.mem_scroll
            .saturating_add_signed(delta)
            .min(rows.saturating_sub(1));
    }

    /// Get disassembly around current PC: `(address, text, is_current)`.
    ///
    /// Memory is decoded linearly from address 0, so a PC pointing into the
    /// middle of an instruction is shown on the row that contains it.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(u8, String, bool)> {
        let pc = self.cpu.regs.pc as usize;
        let rows = listing(self.cpu.mem.as_slice());
        let current = rows
            .iter()
            .position(|(addr, len, _)| (*addr..addr + len).contains(&pc))
            .unwrap_or(0);
        let start = current.saturating_sub(lines / 2);

        rows.into_iter()
            .enumerate()
            .skip(start)
            .take(lines)
            .map(|(i, (addr, _, text))| (addr as u8, text, i == current))
            .collect()
    }
}

/// Run the debugger with a program.
pub fn run_debugger(program: Vec<u8>) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Create app
    let mut app = DebuggerApp::new(program);

    // Main loop
    loop {
        // Draw
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        // Handle input
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Up => app.scroll_memory(-1),
                        KeyCode::Down => app.scroll_memory(1),
                        _ => {}
                    }
                }
            }
        }

        // Tick for continuous running
        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}
