//! CPU emulation.
//!
//! This module implements the machine core:
//! - 8 word registers, r7 is the instruction pointer
//! - word-addressed memory (2048 cells by default)
//! - an extensible instruction registry with guard chains
//! - a 24-instruction base set and byte-oriented devices

pub mod memory;
pub mod registers;
pub mod isa;
pub mod decode;
pub mod instructions;
pub mod devices;
pub mod execute;

pub use memory::{Memory, MemoryError};
pub use registers::Registers;
pub use isa::{ArgKind, Args, Flow, InstrDef, InstructionSet, RegisterWrite};
pub use decode::{ArgError, DecodeError, DecodedInstr};
pub use devices::{InputDevice, OutputCapture, OutputDevice};
pub use execute::{Cpu, CpuError, CpuSnapshot, ExecError};
