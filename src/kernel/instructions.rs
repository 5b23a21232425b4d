//! Kernel instructions and guard installation.
//!
//! | op | name       | args | effect                                          |
//! |----|------------|------|-------------------------------------------------|
//! | 24 | `syscall`  | a0   | trap with reason 0, syscall-number cell := a0   |
//! | 25 | `usermode` |      | enter user mode at r0, restore stashed r0       |
//! | 26 | `lgdt`     |      | trap vector := r0 r1 r2 r3                      |

use super::guards::{address_guard, iptr_write_guard, nonzero_divisor, privileged};
use super::{deliver_trap, TrapReason, TrapVector};
use crate::cpu::execute::ExecError;
use crate::cpu::isa::{ArgKind::{Ignore, RegOrLit}, InstrDef, InstructionSet};

/// Instructions only kernel mode may run, besides the ones defined here.
pub const PRIVILEGED: [&str; 4] = ["read", "write", "halt", "unreachable"];

fn syscall() -> InstrDef {
    InstrDef::new("syscall", |cpu, args| {
        let number = cpu.regs.resolve(args[0]);
        deliver_trap(cpu, TrapReason::Syscall)?;

        // deliver_trap checked the cell and a vector exists
        if let Some(vector) = cpu.kernel.effective_vector() {
            cpu.mem
                .write(vector.syscall_number, number)
                .map_err(|source| ExecError::Memory { op: "syscall", source })?;
        }

        // The syscall itself does not count towards preemption.
        cpu.kernel.counter = cpu.kernel.counter.saturating_sub(1);
        Ok(())
    })
    .with_args([RegOrLit, Ignore, Ignore])
}

fn usermode() -> InstrDef {
    let mut def = InstrDef::new("usermode", |cpu, _| {
        cpu.kernel.kernel_mode = false;
        cpu.regs.set_iptr(cpu.regs.get(0));
        cpu.regs.set(0, cpu.kernel.saved_r0);
        log::debug!("[kernel] entering user mode at {}", crate::word::Hex(cpu.regs.iptr()));
        Ok(())
    });
    def.add_guard(privileged);
    def
}

fn lgdt() -> InstrDef {
    let mut def = InstrDef::new("lgdt", |cpu, _| {
        let vector = TrapVector {
            handler: cpu.regs.get(0),
            syscall_number: cpu.regs.get(1),
            trap_reason: cpu.regs.get(2),
            return_address: cpu.regs.get(3),
        };
        log::debug!("[kernel] trap vector installed: {}", vector);
        cpu.kernel.vector = Some(vector);
        Ok(())
    });
    def.add_guard(privileged);
    def
}

/// Install kernel support into `set`.
///
/// Guards are attached to the existing instructions and the three kernel
/// instructions are appended as the next opcodes. Guards run in reverse
/// installation order, so a zero divisor is reported before the jump check
/// evaluates the division and an address is checked before `load` reads it.
pub fn install(set: &mut InstructionSet) {
    let writes: Vec<_> = set
        .iter()
        .filter_map(|d| d.register_write().map(|w| (d.name(), w.clone())))
        .collect();
    for (name, write) in writes {
        if let Some(def) = set.by_name_mut(name) {
            def.add_guard(iptr_write_guard(write));
        }
    }

    if let Some(def) = set.by_name_mut("load") {
        def.add_guard(address_guard(0));
    }
    if let Some(def) = set.by_name_mut("store") {
        def.add_guard(address_guard(1));
    }
    if let Some(def) = set.by_name_mut("div") {
        def.add_guard(nonzero_divisor);
    }

    set.add_guard_where(|d| PRIVILEGED.contains(&d.name()), privileged);

    set.register(syscall());
    set.register(usermode());
    set.register(lgdt());
}
