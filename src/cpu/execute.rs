//! CPU execution engine.
//!
//! Implements the fetch-decode-execute cycle. Every step first gives the
//! kernel subsystem a chance to preempt, then fetches the word at r7,
//! decodes it, advances r7 and only then runs the instruction. Instructions
//! that write r7 therefore overwrite the auto-increment, and guards that
//! check a would-be r7 value see the instruction's own target.

use crate::cpu::{InputDevice, InstructionSet, Memory, OutputDevice, Registers};
use crate::cpu::decode::DecodeError;
use crate::cpu::isa::Flow;
use crate::cpu::memory::MemoryError;
use crate::kernel::{self, KernelState, TrapReason};
use crate::word::{Hex, Word};
use serde::{Serialize, Deserialize};
use std::fmt;
use thiserror::Error;

/// The CPU.
pub struct Cpu {
    /// CPU registers.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Privilege and trap state.
    pub kernel: KernelState,
    /// Input device used by `read`.
    pub input: InputDevice,
    /// Output device used by `write`.
    pub output: OutputDevice,
    /// Instructions executed (steps consumed by the timer are not counted).
    pub cycles: u64,
    halted: bool,
    instructions: InstructionSet,
}

impl Cpu {
    /// Boot a CPU with the kernel-extended instruction set.
    ///
    /// The CPU starts in whatever mode `kernel` is in (kernel mode for a
    /// fresh [`KernelState`]), not halted, with devices on the host's
    /// standard input and output.
    pub fn boot(kernel: KernelState, memory: Memory) -> Self {
        Self::boot_with(kernel, memory, kernel::instruction_set())
    }

    /// Boot a CPU with a caller-built instruction set.
    pub fn boot_with(kernel: KernelState, memory: Memory, instructions: InstructionSet) -> Self {
        Self {
            regs: Registers::new(),
            mem: memory,
            kernel,
            input: InputDevice::stdin(),
            output: OutputDevice::stdout(),
            cycles: 0,
            halted: false,
            instructions,
        }
    }

    /// Execute one instruction.
    ///
    /// Returns `true` once the machine has halted. Any error halts the
    /// machine permanently.
    ///
    /// # Panics
    /// Panics if called on a halted CPU.
    pub fn step(&mut self) -> Result<bool, CpuError> {
        assert!(!self.halted, "cannot execute CPU once it has been halted");
        log::debug!("[cpu.step] CPU state: {}", self);

        // Give the kernel subsystem a chance to skip this instruction.
        match kernel::pre_execute(self) {
            Ok(Flow::Proceed) => {}
            Ok(Flow::Skip) => {
                log::debug!("[cpu.step] kernel pre-execute hook decided to skip this instruction");
                return Ok(self.halted);
            }
            Err(e) => return Err(self.fault(CpuError::PreExecute(e))),
        }

        // Fetch
        let iptr = self.regs.iptr();
        let raw = match self.mem.read(iptr) {
            Ok(w) => w,
            Err(_) => return Err(self.fault(CpuError::IptrOutOfBounds(Hex(iptr)))),
        };

        // Decode
        let instr = match self.instructions.decode(raw) {
            Ok(i) => i,
            Err(e) => return Err(self.fault(CpuError::Decode(e))),
        };
        log::debug!("[cpu.step] decoded instruction: {}", instr);

        // Advance before executing; jumps overwrite this
        self.regs.advance_iptr();

        // Execute
        if let Err(source) = instr.run(self) {
            return Err(self.fault(CpuError::Execute { instr: instr.to_string(), source }));
        }
        self.cycles += 1;

        Ok(self.halted)
    }

    /// Run until halt or error.
    ///
    /// Returns the number of steps taken.
    pub fn run(&mut self) -> Result<u64, CpuError> {
        let mut steps = 0;
        while !self.halted {
            self.step()?;
            steps += 1;
        }
        Ok(steps)
    }

    /// Run for at most `max_steps` steps.
    pub fn run_limited(&mut self, max_steps: u64) -> Result<u64, CpuError> {
        let mut steps = 0;
        while !self.halted && steps < max_steps {
            self.step()?;
            steps += 1;
        }
        Ok(steps)
    }

    /// Stop the machine. Used by `halt` and by fatal errors.
    pub fn halt(&mut self) {
        self.halted = true;
    }

    fn fault(&mut self, err: CpuError) -> CpuError {
        self.halted = true;
        err
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Check if the CPU is in kernel mode.
    pub fn kernel_mode(&self) -> bool {
        self.kernel.kernel_mode
    }

    /// The instruction set this CPU decodes with.
    pub fn instructions(&self) -> &InstructionSet {
        &self.instructions
    }

    /// Queue bytes on the input device after everything already queued.
    pub fn append_input(&mut self, bytes: Vec<u8>) {
        self.input.append_bytes(bytes);
    }

    /// Capture the machine state for inspection or serialization.
    pub fn snapshot(&self, include_memory: bool) -> CpuSnapshot {
        CpuSnapshot {
            registers: self.regs,
            kernel: self.kernel.clone(),
            halted: self.halted,
            cycles: self.cycles,
            memory: include_memory.then(|| self.mem.cells().to_vec()),
        }
    }
}

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | kernel: {}", self.regs, self.kernel)
    }
}

impl fmt::Debug for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cpu")
            .field("halted", &self.halted)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .field("kernel", &self.kernel)
            .finish()
    }
}

/// A serializable view of the machine state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSnapshot {
    pub registers: Registers,
    pub kernel: KernelState,
    pub halted: bool,
    pub cycles: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<Vec<Word>>,
}

/// Failures raised while running an instruction's guards or behavior.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("{op}: {source}")]
    Memory {
        op: &'static str,
        #[source]
        source: MemoryError,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("unreachable instruction reached!")]
    Unreachable,

    #[error("cannot deliver {0} trap: trap vector not configured")]
    TrapsUnconfigured(TrapReason),

    #[error("cannot deliver {reason} trap: {cell} cell {addr} is outside memory")]
    TrapCellOutOfBounds {
        reason: TrapReason,
        cell: &'static str,
        addr: Word,
    },

    #[error("{0}")]
    Guard(String),
}

/// Errors that can occur during CPU execution. All of them halt the CPU.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("kernel pre-execute hook failed: {0}")]
    PreExecute(#[source] ExecError),

    #[error("iptr out of bounds: {0}")]
    IptrOutOfBounds(Hex),

    #[error("failed to decode instruction: {0}")]
    Decode(#[from] DecodeError),

    #[error("failed to execute instruction {instr}: {source}")]
    Execute {
        instr: String,
        #[source]
        source: ExecError,
    },
}
