//! The register file.
//!
//! Eight 32-bit registers, r0-r7. r7 is the instruction pointer; the
//! kernel subsystem additionally stashes r0 across trap entry and exit.

use crate::word::{Hex, Operand, Word};
use serde::{Serialize, Deserialize};
use std::fmt;

/// Number of general registers.
pub const REGISTER_COUNT: usize = 8;

/// Index of the instruction pointer.
pub const IPTR: usize = 7;

/// The register file.
#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Registers {
    regs: [Word; REGISTER_COUNT],
}

impl Registers {
    /// Create a register file with every register zeroed.
    pub fn new() -> Self {
        Self { regs: [0; REGISTER_COUNT] }
    }

    /// Read a register.
    ///
    /// # Panics
    /// Panics if `index` is not 0-7. Decoding validates register arguments,
    /// so instruction behaviors never hit this.
    #[inline]
    pub fn get(&self, index: usize) -> Word {
        self.regs[index]
    }

    /// Write a register.
    ///
    /// # Panics
    /// Panics if `index` is not 0-7.
    #[inline]
    pub fn set(&mut self, index: usize, value: Word) {
        self.regs[index] = value;
    }

    /// Current instruction pointer.
    #[inline]
    pub fn iptr(&self) -> Word {
        self.regs[IPTR]
    }

    /// Set the instruction pointer.
    #[inline]
    pub fn set_iptr(&mut self, value: Word) {
        self.regs[IPTR] = value;
    }

    /// Increment the instruction pointer by 1.
    /// Returns the old value.
    pub fn advance_iptr(&mut self) -> Word {
        let old = self.regs[IPTR];
        self.regs[IPTR] = old.wrapping_add(1);
        old
    }

    /// Resolve an argument byte to a value.
    ///
    /// Literals (high bit set) yield `byte - 128`; register selectors yield
    /// the register's current contents.
    #[inline]
    pub fn resolve(&self, arg: u8) -> Word {
        match Operand::from_byte(arg) {
            Operand::Literal(v) => v as Word,
            Operand::Register(r) => self.regs[r as usize],
        }
    }

    /// All registers in index order.
    pub fn as_slice(&self) -> &[Word; REGISTER_COUNT] {
        &self.regs
    }
}

impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, r) in self.regs.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "r{}={}", i, Hex(*r))?;
        }
        write!(f, "]")
    }
}

impl fmt::Debug for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_advance_iptr() {
        let mut regs = Registers::new();
        regs.set_iptr(10);

        let old = regs.advance_iptr();
        assert_eq!(old, 10);
        assert_eq!(regs.iptr(), 11);
        assert_eq!(regs.get(IPTR), 11);
    }

    #[test]
    fn test_advance_iptr_wraps() {
        let mut regs = Registers::new();
        regs.set_iptr(Word::MAX);
        regs.advance_iptr();
        assert_eq!(regs.iptr(), 0);
    }

    #[test]
    fn test_display() {
        let mut regs = Registers::new();
        regs.set(1, 0xff);
        assert!(regs.to_string().starts_with("[r0=00000000 r1=000000ff"));
    }

    proptest! {
        #[test]
        fn literal_ignores_register_contents(byte in 128u8..=255, fill in any::<Word>()) {
            let mut regs = Registers::new();
            for i in 0..REGISTER_COUNT {
                regs.set(i, fill);
            }
            prop_assert_eq!(regs.resolve(byte), (byte - 128) as Word);
        }

        #[test]
        fn register_selector_reads_register(index in 0u8..8, value in any::<Word>()) {
            let mut regs = Registers::new();
            regs.set(index as usize, value);
            prop_assert_eq!(regs.resolve(index), value);
        }
    }
}
