//! Word-addressed main memory.
//!
//! Memory is a flat array of words. Which part of it user code may touch is
//! decided by the kernel subsystem, not here.

use crate::word::Word;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Memory size in the reference layout.
pub const MEMORY_SIZE: usize = 2048;

/// Size of the privileged region holding the boot image.
pub const KERNEL_REGION_SIZE: usize = 1024;

/// Main memory.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    cells: Vec<Word>,
}

impl Memory {
    /// Create a zero-filled memory of `size` words.
    pub fn new(size: usize) -> Self {
        Self { cells: vec![0; size] }
    }

    /// Number of words.
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True if memory has no cells at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// True if `addr` names a cell.
    #[inline]
    pub fn contains(&self, addr: Word) -> bool {
        (addr as usize) < self.cells.len()
    }

    /// Read a cell.
    #[inline]
    pub fn read(&self, addr: Word) -> Result<Word, MemoryError> {
        self.cells
            .get(addr as usize)
            .copied()
            .ok_or(MemoryError::AddressOutOfRange(addr))
    }

    /// Write a cell.
    #[inline]
    pub fn write(&mut self, addr: Word, value: Word) -> Result<(), MemoryError> {
        let cell = self
            .cells
            .get_mut(addr as usize)
            .ok_or(MemoryError::AddressOutOfRange(addr))?;
        *cell = value;
        Ok(())
    }

    /// Copy `image` into memory starting at `start`.
    pub fn load_image(&mut self, start: usize, image: &[Word]) -> Result<(), MemoryError> {
        let available = self.cells.len().saturating_sub(start);
        let window = start
            .checked_add(image.len())
            .and_then(|end| self.cells.get_mut(start..end))
            .ok_or(MemoryError::ImageTooLarge {
                size: image.len(),
                available,
            })?;
        window.copy_from_slice(image);
        Ok(())
    }

    /// All cells in address order.
    pub fn cells(&self) -> &[Word] {
        &self.cells
    }

    /// Dump a window of memory (for debugging).
    pub fn dump(&self, start: usize, count: usize) -> Vec<(usize, Word)> {
        let end = start.saturating_add(count).min(self.cells.len());
        (start.min(end)..end).map(|i| (i, self.cells[i])).collect()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(MEMORY_SIZE)
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only count non-zero cells
        let non_zero = self.cells.iter().filter(|w| **w != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &self.cells.len())
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("address out of bounds: {0}")]
    AddressOutOfRange(Word),

    #[error("image of {size} words exceeds available space {available}")]
    ImageTooLarge { size: usize, available: usize },
}
