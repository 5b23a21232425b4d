//! Assembler, disassembler and word-image files.
//!
//! This module provides:
//! - A two-pass assembler (text → instruction words)
//! - A disassembler (instruction words → text)
//! - Loading and saving raw big-endian word images

pub mod assembler;
pub mod disasm;
pub mod image;

pub use assembler::{assemble, AssemblerError};
pub use disasm::{disassemble, disassemble_word};
pub use image::{load_image, parse_image, save_image, ImageError};
