//! LS-8 memory subsystem.
//!
//! A flat, byte-addressable store. Addresses are plain indices into the
//! backing buffer; there is no paging, protection or alignment.

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Default memory size in bytes.
pub const DEFAULT_MEMORY_SIZE: usize = 256;

/// Largest memory the byte-wide PC and SP can address.
pub const MAX_MEMORY_SIZE: usize = 256;

/// LS-8 memory: a fixed number of zero-initialised bytes.
#[derive(Clone, Serialize, Deserialize)]
pub struct Memory {
    cells: Vec<u8>,
}

impl Memory {
    /// Create a new memory of [`DEFAULT_MEMORY_SIZE`] bytes.
    pub fn new() -> Self {
        Self {
            cells: vec![0; DEFAULT_MEMORY_SIZE],
        }
    }

    /// Create a memory of `size` bytes (1-256).
    pub fn with_size(size: usize) -> Result<Self, MemoryError> {
        if size == 0 || size > MAX_MEMORY_SIZE {
            return Err(MemoryError::InvalidSize(size));
        }
        Ok(Self { cells: vec![0; size] })
    }

    /// Number of addressable bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.cells.len()
    }

    /// Read the byte at `addr`.
    #[inline]
    pub fn read(&self, addr: usize) -> Result<u8, MemoryError> {
        self.cells
            .get(addr)
            .copied()
            .ok_or(MemoryError::AddressOutOfRange { address: addr, size: self.cells.len() })
    }

    /// Write `value` at `addr`.
    #[inline]
    pub fn write(&mut self, addr: usize, value: u8) -> Result<(), MemoryError> {
        let size = self.cells.len();
        let cell = self.cells
            .get_mut(addr)
            .ok_or(MemoryError::AddressOutOfRange { address: addr, size })?;
        *cell = value;
        Ok(())
    }

    /// Non-faulting read. `None` past the end of memory.
    #[inline]
    pub fn peek(&self, addr: usize) -> Option<u8> {
        self.cells.get(addr).copied()
    }

    /// Clear all memory to zeros.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// Load a program into memory starting at the given address.
    pub fn load_program(&mut self, start_addr: usize, program: &[u8]) -> Result<(), MemoryError> {
        if start_addr > self.cells.len() {
            return Err(MemoryError::AddressOutOfRange {
                address: start_addr,
                size: self.cells.len(),
            });
        }

        let available = self.cells.len().saturating_sub(start_addr);
        if program.len() > available {
            return Err(MemoryError::ProgramTooLarge {
                size: program.len(),
                available,
            });
        }

        self.cells[start_addr..start_addr + program.len()].copy_from_slice(program);
        Ok(())
    }

    /// Dump memory contents (for debugging).
    pub fn dump(&self, start: usize, count: usize) -> Vec<(usize, u8)> {
        let end = start.saturating_add(count).min(self.cells.len());
        (start.min(end)..end)
            .map(|i| (i, self.cells[i]))
            .collect()
    }

    /// The whole backing buffer.
    pub fn as_slice(&self) -> &[u8] {
        &self.cells
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only count non-zero cells
        let non_zero = self.cells.iter().filter(|&&b| b != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &self.cells.len())
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("memory address {address:#04x} out of range (size {size})")]
    AddressOutOfRange { address: usize, size: usize },

    #[error("program size {size} exceeds available space {available}")]
    ProgramTooLarge { size: usize, available: usize },

    #[error("invalid memory size {0} (must be 1-256)")]
    InvalidSize(usize),
}
