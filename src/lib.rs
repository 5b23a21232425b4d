//! # trapvm
//!
//! A word-addressed virtual CPU with a minimal kernel/user privilege model.
//!
//! The machine has eight 32-bit registers (r7 is the instruction pointer),
//! a flat word memory split into a kernel region and a user region, and an
//! instruction set that can be extended and intercepted at runtime. Kernel
//! support adds two execution modes, a single trap gate, a preemption timer
//! and memory protection for user code.

pub mod word;
pub mod cpu;
pub mod kernel;
pub mod config;
pub mod boot;
pub mod asm;
pub mod debugger;
pub mod logging;

#[cfg(feature = "tui")]
pub mod tui;

// Re-export commonly used types
pub use word::Word;
pub use cpu::{Cpu, CpuError, CpuSnapshot, ExecError, InstructionSet, Memory, Registers};
pub use kernel::{KernelState, TrapReason, TrapVector};
pub use config::MachineConfig;
pub use boot::{load, BootError};
pub use asm::{assemble, disassemble, AssemblerError, load_image, save_image};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
