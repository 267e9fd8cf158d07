//! Console output for the `PRN` instruction.
//!
//! The CPU writes each printed value to a [`Console`]. The CLI prints to
//! stdout; tests, the debugger and the WebAssembly bindings capture values
//! instead.

use std::cell::RefCell;
use std::rc::Rc;

/// Receives values printed by `PRN`.
pub trait Console {
    /// Print one byte value.
    fn print(&mut self, value: u8);
}

/// Prints each value as a decimal number on its own line of stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutConsole;

impl Console for StdoutConsole {
    fn print(&mut self, value: u8) {
        println!("{}", value);
    }
}

/// Collects printed values in memory.
///
/// Clones share the same buffer, so a caller can keep one handle and give
/// another to the CPU.
#[derive(Debug, Default, Clone)]
pub struct CaptureConsole {
    values: Rc<RefCell<Vec<u8>>>,
}

impl CaptureConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything printed so far.
    pub fn values(&self) -> Vec<u8> {
        self.values.borrow().clone()
    }

    /// Printed values rendered the way stdout would show them.
    pub fn lines(&self) -> Vec<String> {
        self.values.borrow().iter().map(|v| v.to_string()).collect()
    }

    pub fn clear(&self) {
        self.values.borrow_mut().clear();
    }
}

impl Console for CaptureConsole {
    fn print(&mut self, value: u8) {
        self.values.borrow_mut().push(value);
    }
}
