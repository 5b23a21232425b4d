//! Kernel support: privilege modes, the trap gate and the timer.
//!
//! The machine starts in kernel mode. The boot image configures the trap
//! vector with `lgdt` and drops to user mode with `usermode`. From then on
//! the only way back into kernel mode is a trap:
//!
//! - `syscall n` (reason 0)
//! - the preemption timer (reason 1)
//! - a user access outside the user region (reason 2)
//! - a privileged instruction in user mode (reason 3)
//!
//! Trap delivery saves r7 into the return-address cell, jumps to the
//! handler, writes the reason code and stashes r0 so that `usermode` can
//! restore it on the way out.

pub mod guards;
pub mod instructions;

use crate::config::MachineConfig;
use crate::cpu::execute::{Cpu, ExecError};
use crate::cpu::instructions::base_set;
use crate::cpu::isa::{Flow, InstructionSet};
use crate::word::{Hex, Word};
use serde::{Serialize, Deserialize};
use std::fmt;

pub use instructions::install;

/// Why the machine entered kernel mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrapReason {
    Syscall,
    Timer,
    OutOfBounds,
    IllegalInstruction,
}

impl TrapReason {
    /// The code written to the trap-reason cell.
    pub fn code(self) -> Word {
        match self {
            TrapReason::Syscall => 0,
            TrapReason::Timer => 1,
            TrapReason::OutOfBounds => 2,
            TrapReason::IllegalInstruction => 3,
        }
    }

    /// Inverse of [`TrapReason::code`].
    pub fn from_code(code: Word) -> Option<Self> {
        match code {
            0 => Some(TrapReason::Syscall),
            1 => Some(TrapReason::Timer),
            2 => Some(TrapReason::OutOfBounds),
            3 => Some(TrapReason::IllegalInstruction),
            _ => None,
        }
    }
}

impl fmt::Display for TrapReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrapReason::Syscall => "syscall",
            TrapReason::Timer => "timer",
            TrapReason::OutOfBounds => "out-of-bounds",
            TrapReason::IllegalInstruction => "illegal instruction",
        };
        f.write_str(name)
    }
}

/// The four addresses installed by `lgdt`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrapVector {
    /// Entry point of the trap handler.
    pub handler: Word,
    /// Cell receiving the syscall number.
    pub syscall_number: Word,
    /// Cell receiving the trap reason code.
    pub trap_reason: Word,
    /// Cell receiving the interrupted r7.
    pub return_address: Word,
}

impl fmt::Display for TrapVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "handler={} syscall={} reason={} return={}",
            Hex(self.handler),
            Hex(self.syscall_number),
            Hex(self.trap_reason),
            Hex(self.return_address)
        )
    }
}

/// State the CPU keeps to implement kernel support.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelState {
    /// True in kernel mode, false in user mode.
    pub kernel_mode: bool,
    /// User-mode steps since the timer last fired.
    pub counter: u32,
    /// r0 at the moment of the last trap.
    pub saved_r0: Word,
    /// Installed by `lgdt`.
    pub vector: Option<TrapVector>,
    /// Counter value at which the timer fires.
    pub timer_threshold: u32,
    /// First address of the user region.
    pub user_start: Word,
    /// One past the last address of the user region.
    pub user_end: Word,
    /// Deliver traps through address 0 when no vector is installed.
    pub allow_unconfigured_traps: bool,
}

impl KernelState {
    /// Initial kernel state for a machine laid out by `config`.
    pub fn new(config: &MachineConfig) -> Self {
        Self {
            kernel_mode: true,
            counter: 0,
            saved_r0: 0,
            vector: None,
            timer_threshold: config.timer_threshold,
            user_start: config.kernel_region as Word,
            user_end: config.memory_size as Word,
            allow_unconfigured_traps: config.allow_unconfigured_traps,
        }
    }

    /// True if user code may touch (or jump to) `addr`.
    #[inline]
    pub fn in_user_region(&self, addr: Word) -> bool {
        addr >= self.user_start && addr < self.user_end
    }

    /// The vector traps are delivered through, if any.
    pub fn effective_vector(&self) -> Option<TrapVector> {
        match self.vector {
            Some(v) => Some(v),
            None if self.allow_unconfigured_traps => Some(TrapVector::default()),
            None => None,
        }
    }
}

impl Default for KernelState {
    fn default() -> Self {
        Self::new(&MachineConfig::default())
    }
}

impl fmt::Display for KernelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.kernel_mode { "KERNEL" } else { "USER" };
        write!(f, "{} counter={} r0={}", mode, self.counter, Hex(self.saved_r0))?;
        match &self.vector {
            Some(v) => write!(f, " [{}]", v),
            None => write!(f, " [no trap vector]"),
        }
    }
}

/// Switch to kernel mode and transfer control to the trap handler.
///
/// All cells the trap writes are checked before any state changes, so a
/// failed delivery leaves the machine exactly as it was.
pub fn deliver_trap(cpu: &mut Cpu, reason: TrapReason) -> Result<(), ExecError> {
    let vector = cpu
        .kernel
        .effective_vector()
        .ok_or(ExecError::TrapsUnconfigured(reason))?;

    let mut cells = vec![
        ("return-address", vector.return_address),
        ("trap-reason", vector.trap_reason),
    ];
    if reason == TrapReason::Syscall {
        cells.push(("syscall-number", vector.syscall_number));
    }
    if let Some(&(cell, addr)) = cells.iter().find(|(_, addr)| !cpu.mem.contains(*addr)) {
        return Err(ExecError::TrapCellOutOfBounds { reason, cell, addr });
    }

    let iptr = cpu.regs.iptr();
    log::debug!(
        "[kernel] {} trap at {}; entering handler at {}",
        reason,
        Hex(iptr),
        Hex(vector.handler)
    );

    cpu.kernel.kernel_mode = true;
    cpu.mem
        .write(vector.return_address, iptr)
        .map_err(|source| ExecError::Memory { op: "trap", source })?;
    cpu.regs.set_iptr(vector.handler);
    cpu.mem
        .write(vector.trap_reason, reason.code())
        .map_err(|source| ExecError::Memory { op: "trap", source })?;
    cpu.kernel.saved_r0 = cpu.regs.get(0);
    Ok(())
}

/// Runs at the start of every step, before fetch.
///
/// In user mode this advances the preemption counter. When the counter
/// reaches the threshold the timer trap is delivered and the step is
/// skipped, so the pending r7 is what lands in the return-address cell.
pub fn pre_execute(cpu: &mut Cpu) -> Result<Flow, ExecError> {
    if cpu.kernel.kernel_mode {
        return Ok(Flow::Proceed);
    }

    cpu.kernel.counter = cpu.kernel.counter.saturating_add(1);
    if cpu.kernel.counter >= cpu.kernel.timer_threshold {
        deliver_trap(cpu, TrapReason::Timer)?;
        cpu.kernel.counter = 0;
        return Ok(Flow::Skip);
    }
    Ok(Flow::Proceed)
}

/// The standard instruction set with kernel support installed.
pub fn instruction_set() -> InstructionSet {
    let mut set = base_set();
    install(&mut set);
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::memory::Memory;

    fn user_cpu(vector: Option<TrapVector>) -> Cpu {
        let mut kernel = KernelState::default();
        kernel.kernel_mode = false;
        kernel.vector = vector;
        Cpu::boot(kernel, Memory::default())
    }

    fn vector() -> TrapVector {
        TrapVector {
            handler: 10,
            syscall_number: 20,
            trap_reason: 21,
            return_address: 22,
        }
    }

    #[test]
    fn test_trap_reason_codes() {
        for code in 0..4 {
            assert_eq!(TrapReason::from_code(code).unwrap().code(), code);
        }
        assert!(TrapReason::from_code(4).is_none());
    }

    #[test]
    fn test_deliver_trap() {
        let mut cpu = user_cpu(Some(vector()));
        cpu.regs.set_iptr(1500);
        cpu.regs.set(0, 77);

        deliver_trap(&mut cpu, TrapReason::OutOfBounds).unwrap();
        assert!(cpu.kernel.kernel_mode);
        assert_eq!(cpu.regs.iptr(), 10);
        assert_eq!(cpu.mem.read(22).unwrap(), 1500);
        assert_eq!(cpu.mem.read(21).unwrap(), 2);
        assert_eq!(cpu.kernel.saved_r0, 77);
        // r0 itself is untouched
        assert_eq!(cpu.regs.get(0), 77);
    }

    #[test]
    fn test_unconfigured_vector_is_rejected() {
        let mut cpu = user_cpu(None);
        cpu.regs.set_iptr(1500);
        let err = deliver_trap(&mut cpu, TrapReason::Timer).unwrap_err();
        assert_eq!(err, ExecError::TrapsUnconfigured(TrapReason::Timer));
        assert!(!cpu.kernel.kernel_mode);
        assert_eq!(cpu.regs.iptr(), 1500);
    }

    #[test]
    fn test_legacy_unconfigured_vector_uses_address_zero() {
        let mut cpu = user_cpu(None);
        cpu.kernel.allow_unconfigured_traps = true;
        cpu.regs.set_iptr(1500);
        deliver_trap(&mut cpu, TrapReason::Timer).unwrap();
        assert_eq!(cpu.regs.iptr(), 0);
        // return address then reason, both into cell 0
        assert_eq!(cpu.mem.read(0).unwrap(), 1);
    }

    #[test]
    fn test_bad_trap_cell_changes_nothing() {
        let mut v = vector();
        v.trap_reason = 5000;
        let mut cpu = user_cpu(Some(v));
        cpu.regs.set_iptr(1500);
        let err = deliver_trap(&mut cpu, TrapReason::Syscall).unwrap_err();
        assert!(matches!(err, ExecError::TrapCellOutOfBounds { cell: "trap-reason", addr: 5000, .. }));
        assert!(!cpu.kernel.kernel_mode);
        assert_eq!(cpu.mem.read(22).unwrap(), 0);
    }

    #[test]
    fn test_timer_fires_at_threshold() {
        let mut cpu = user_cpu(Some(vector()));
        cpu.kernel.timer_threshold = 3;
        cpu.regs.set_iptr(1024);

        assert_eq!(pre_execute(&mut cpu).unwrap(), Flow::Proceed);
        assert_eq!(pre_execute(&mut cpu).unwrap(), Flow::Proceed);
        assert_eq!(pre_execute(&mut cpu).unwrap(), Flow::Skip);
        assert_eq!(cpu.kernel.counter, 0);
        assert!(cpu.kernel.kernel_mode);
        assert_eq!(cpu.mem.read(21).unwrap(), 1);
        assert_eq!(cpu.mem.read(22).unwrap(), 1024);
    }

    #[test]
    fn test_pre_execute_ignores_kernel_mode() {
        let mut cpu = Cpu::boot(KernelState::default(), Memory::default());
        for _ in 0..500 {
            assert_eq!(pre_execute(&mut cpu).unwrap(), Flow::Proceed);
        }
        assert_eq!(cpu.kernel.counter, 0);
    }

    #[test]
    fn test_user_region() {
        let kernel = KernelState::default();
        assert!(!kernel.in_user_region(1023));
        assert!(kernel.in_user_region(1024));
        assert!(kernel.in_user_region(2047));
        assert!(!kernel.in_user_region(2048));
    }

    #[test]
    fn test_instruction_set_extends_base() {
        let set = instruction_set();
        assert_eq!(set.len(), 27);
        assert_eq!(set.opcode_of("syscall"), Some(24));
        assert_eq!(set.opcode_of("usermode"), Some(25));
        assert_eq!(set.opcode_of("lgdt"), Some(26));
    }
}
