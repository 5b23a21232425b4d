//! Machine words and operand bytes.
//!
//! Every register, memory cell and instruction is a 32-bit [`Word`].
//! Words cross every boundary (image files, the input device) as
//! 4 big-endian bytes.

use serde::{Serialize, Deserialize};
use std::fmt;

/// A machine word. Arithmetic on words wraps modulo 2^32.
pub type Word = u32;

/// Number of bytes in a serialized word.
pub const WORD_BYTES: usize = 4;

/// Bit that marks an operand byte as a literal.
pub const LITERAL_FLAG: u8 = 0x80;

/// Largest literal an operand byte can carry.
pub const MAX_LITERAL: u8 = 127;

/// Convert a word to its big-endian byte representation.
#[inline]
pub fn to_be_bytes(w: Word) -> [u8; WORD_BYTES] {
    w.to_be_bytes()
}

/// Convert big-endian bytes back to a word.
#[inline]
pub fn from_be_bytes(bytes: [u8; WORD_BYTES]) -> Word {
    Word::from_be_bytes(bytes)
}

/// Serialize a sequence of words as a flat big-endian byte stream.
pub fn words_to_bytes(words: &[Word]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

/// Parse a flat big-endian byte stream into words.
///
/// Returns `None` if the length is not a multiple of [`WORD_BYTES`].
pub fn bytes_to_words(bytes: &[u8]) -> Option<Vec<Word>> {
    if bytes.len() % WORD_BYTES != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(WORD_BYTES)
            .map(|c| Word::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

/// Formats a word the way the machine prints it: 8 hex digits.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Hex(pub Word);

impl fmt::Display for Hex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl fmt::Debug for Hex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// One instruction argument byte, interpreted.
///
/// A byte with the high bit set is a literal (`byte - 128`, range 0-127);
/// anything else selects a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    /// Register selector. Only 0-7 are valid registers.
    Register(u8),
    /// Immediate value 0-127.
    Literal(u8),
}

impl Operand {
    /// Interpret a raw argument byte.
    #[inline]
    pub fn from_byte(byte: u8) -> Self {
        if byte & LITERAL_FLAG != 0 {
            Operand::Literal(byte - LITERAL_FLAG)
        } else {
            Operand::Register(byte)
        }
    }

    /// Encode back to a raw argument byte.
    ///
    /// Literals larger than [`MAX_LITERAL`] cannot be represented.
    pub fn to_byte(self) -> Option<u8> {
        match self {
            Operand::Register(r) if r < LITERAL_FLAG => Some(r),
            Operand::Literal(v) if v <= MAX_LITERAL => Some(v | LITERAL_FLAG),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(r) => write!(f, "r{}", r),
            Operand::Literal(v) => write!(f, "{}", v),
        }
    }
}
