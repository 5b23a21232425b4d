//! Guards that enforce the user/kernel boundary.
//!
//! Every guard is a no-op in kernel mode. In user mode a violation is
//! turned into a trap and the instruction is skipped.

use super::{deliver_trap, TrapReason};
use crate::cpu::execute::{Cpu, ExecError};
use crate::cpu::isa::{Args, Flow, RegisterWrite};
use crate::cpu::registers::IPTR;

/// Deliver `reason` and skip the instruction.
fn trap(cpu: &mut Cpu, reason: TrapReason) -> Result<Flow, ExecError> {
    deliver_trap(cpu, reason)?;
    Ok(Flow::Skip)
}

/// Only kernel mode may run the guarded instruction.
pub fn privileged(cpu: &mut Cpu, _args: Args) -> Result<Flow, ExecError> {
    if cpu.kernel.kernel_mode {
        return Ok(Flow::Proceed);
    }
    trap(cpu, TrapReason::IllegalInstruction)
}

/// User code may only address the user region through argument `operand`.
pub fn address_guard(operand: usize) -> impl Fn(&mut Cpu, Args) -> Result<Flow, ExecError> {
    move |cpu, args| {
        if cpu.kernel.kernel_mode {
            return Ok(Flow::Proceed);
        }
        let addr = cpu.regs.resolve(args[operand]);
        if cpu.kernel.in_user_region(addr) {
            Ok(Flow::Proceed)
        } else {
            trap(cpu, TrapReason::OutOfBounds)
        }
    }
}

/// User code may only jump inside the user region.
///
/// Evaluates the instruction's own computation when it targets r7. A write
/// that would not happen (a `cmove` with a zero condition) always passes.
pub fn iptr_write_guard(write: RegisterWrite) -> impl Fn(&mut Cpu, Args) -> Result<Flow, ExecError> {
    move |cpu, args| {
        if cpu.kernel.kernel_mode || write.target(&args) != IPTR {
            return Ok(Flow::Proceed);
        }
        let value = (write.compute)(&*cpu, &args)?;
        match value {
            Some(target) if !cpu.kernel.in_user_region(target) => trap(cpu, TrapReason::OutOfBounds),
            _ => Ok(Flow::Proceed),
        }
    }
}

/// A zero divisor in user mode is an illegal instruction.
pub fn nonzero_divisor(cpu: &mut Cpu, args: Args) -> Result<Flow, ExecError> {
    if cpu.kernel.kernel_mode || cpu.regs.resolve(args[1]) != 0 {
        return Ok(Flow::Proceed);
    }
    trap(cpu, TrapReason::IllegalInstruction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::encode;
    use crate::cpu::devices::{InputDevice, OutputCapture};
    use crate::cpu::memory::Memory;
    use crate::kernel::{instruction_set, KernelState, TrapVector};
    use crate::word::Word;
    use proptest::prelude::*;

    const HANDLER: Word = 100;
    const REASON: Word = 201;
    const RETURN: Word = 202;

    fn lit(v: u8) -> u8 {
        v + 128
    }

    fn op(name: &str, args: [u8; 3]) -> Word {
        encode(instruction_set().opcode_of(name).unwrap(), args)
    }

    /// A user-mode CPU about to run `program` at 1024.
    fn user_cpu(program: &[Word]) -> Cpu {
        let mut mem = Memory::default();
        mem.load_image(1024, program).unwrap();
        let mut kernel = KernelState::default();
        kernel.kernel_mode = false;
        kernel.vector = Some(TrapVector {
            handler: HANDLER,
            syscall_number: 200,
            trap_reason: REASON,
            return_address: RETURN,
        });
        let mut cpu = Cpu::boot(kernel, mem);
        cpu.regs.set_iptr(1024);
        cpu
    }

    fn assert_trapped(cpu: &Cpu, reason: TrapReason) {
        assert!(cpu.kernel.kernel_mode);
        assert!(!cpu.is_halted());
        assert_eq!(cpu.regs.iptr(), HANDLER);
        assert_eq!(cpu.mem.read(REASON).unwrap(), reason.code());
        assert_eq!(cpu.mem.read(RETURN).unwrap(), 1025);
    }

    #[test]
    fn test_privileged_instructions_trap_in_user_mode() {
        for name in ["read", "write", "halt", "unreachable", "usermode", "lgdt"] {
            let mut cpu = user_cpu(&[op(name, [0, 0, 0])]);
            cpu.step().unwrap();
            assert_trapped(&cpu, TrapReason::IllegalInstruction);
        }
    }

    #[test]
    fn test_user_io_never_touches_devices() {
        for program in [op("read", [1, 0, 0]), op("write", [lit(b'x'), 0, 0])] {
            let mut cpu = user_cpu(&[program]);
            let capture = OutputCapture::new();
            cpu.input = InputDevice::from_bytes(b"abc".to_vec());
            cpu.output = capture.device();
            cpu.regs.set(1, 42);

            cpu.step().unwrap();
            assert_trapped(&cpu, TrapReason::IllegalInstruction);
            assert_eq!(cpu.input.consumed(), 0);
            assert_eq!(cpu.input.remaining(), Some(3));
            assert_eq!(cpu.output.written(), 0);
            assert!(capture.contents().is_empty());
            assert_eq!(cpu.regs.get(1), 42);
        }
    }

    #[test]
    fn test_store_outside_user_region() {
        let mut cpu = user_cpu(&[op("store", [lit(9), lit(5), 0])]);
        cpu.step().unwrap();
        assert_trapped(&cpu, TrapReason::OutOfBounds);
        assert_eq!(cpu.mem.read(5).unwrap(), 0);
    }

    #[test]
    fn test_load_outside_user_region() {
        let mut cpu = user_cpu(&[op("load", [lit(5), 1, 0])]);
        cpu.regs.set(1, 42);
        cpu.step().unwrap();
        assert_trapped(&cpu, TrapReason::OutOfBounds);
        assert_eq!(cpu.regs.get(1), 42);
    }

    #[test]
    fn test_jump_outside_user_region() {
        let mut cpu = user_cpu(&[op("add", [lit(1), lit(2), 7])]);
        cpu.step().unwrap();
        assert_trapped(&cpu, TrapReason::OutOfBounds);
    }

    #[test]
    fn test_load_literal_jump_is_checked() {
        // loadLiteral 0x0010 r7
        let mut cpu = user_cpu(&[op("loadLiteral", [0x00, 0x10, 7])]);
        cpu.step().unwrap();
        assert_trapped(&cpu, TrapReason::OutOfBounds);

        // loadLiteral 0x0500 r7 stays in the user region
        let mut cpu = user_cpu(&[op("loadLiteral", [0x05, 0x00, 7])]);
        cpu.step().unwrap();
        assert!(!cpu.kernel.kernel_mode);
        assert_eq!(cpu.regs.iptr(), 0x500);
    }

    #[test]
    fn test_not_jump_is_checked() {
        let mut cpu = user_cpu(&[op("not", [lit(0), 7, 0])]);
        cpu.step().unwrap();
        assert_trapped(&cpu, TrapReason::OutOfBounds);
    }

    #[test]
    fn test_cmove_jump_is_checked() {
        let mut cpu = user_cpu(&[op("cmove", [lit(1), lit(3), 7])]);
        cpu.step().unwrap();
        assert_trapped(&cpu, TrapReason::OutOfBounds);

        let mut cpu = user_cpu(&[op("cmove", [lit(1), 1, 7])]);
        cpu.regs.set(1, 1500);
        cpu.step().unwrap();
        assert!(!cpu.kernel.kernel_mode);
        assert_eq!(cpu.regs.iptr(), 1500);
    }

    #[test]
    fn test_load_jump_is_checked() {
        // the address is in the user region, the loaded target is not
        let mut cpu = user_cpu(&[op("load", [1, 7, 0])]);
        cpu.regs.set(1, 1030);
        cpu.mem.write(1030, 5).unwrap();
        cpu.step().unwrap();
        assert_trapped(&cpu, TrapReason::OutOfBounds);

        let mut cpu = user_cpu(&[op("load", [1, 7, 0])]);
        cpu.regs.set(1, 1030);
        cpu.mem.write(1030, 1040).unwrap();
        cpu.step().unwrap();
        assert!(!cpu.kernel.kernel_mode);
        assert_eq!(cpu.regs.iptr(), 1040);
    }

    #[test]
    fn test_comparison_jump_is_checked() {
        for name in ["gt", "lt", "eq"] {
            for (a, b) in [(1, 2), (2, 1), (2, 2)] {
                let mut cpu = user_cpu(&[op(name, [lit(a), lit(b), 7])]);
                cpu.step().unwrap();
                assert_trapped(&cpu, TrapReason::OutOfBounds);
            }
        }
    }

    #[test]
    fn test_cmove_with_false_condition_passes() {
        let mut cpu = user_cpu(&[op("cmove", [lit(0), lit(3), 7])]);
        cpu.step().unwrap();
        assert!(!cpu.kernel.kernel_mode);
        assert_eq!(cpu.regs.iptr(), 1025);
    }

    #[test]
    fn test_user_division_by_zero_traps() {
        let mut cpu = user_cpu(&[op("div", [lit(1), lit(0), 1])]);
        cpu.step().unwrap();
        assert_trapped(&cpu, TrapReason::IllegalInstruction);
    }

    #[test]
    fn test_user_division_by_zero_into_iptr_traps() {
        let mut cpu = user_cpu(&[op("div", [lit(1), lit(0), 7])]);
        cpu.step().unwrap();
        assert_trapped(&cpu, TrapReason::IllegalInstruction);
    }

    #[test]
    fn test_kernel_mode_is_unrestricted() {
        let mut mem = Memory::default();
        mem.load_image(0, &[op("store", [lit(9), lit(5), 0]), op("halt", [0, 0, 0])])
            .unwrap();
        let mut cpu = Cpu::boot(KernelState::default(), mem);
        cpu.run().unwrap();
        assert_eq!(cpu.mem.read(5).unwrap(), 9);
        assert!(cpu.is_halted());
    }

    proptest! {
        #[test]
        fn store_respects_user_region(addr in 0u32..4096) {
            let mut cpu = user_cpu(&[op("store", [lit(7), 1, 0])]);
            cpu.regs.set(1, addr);
            cpu.step().unwrap();
            if (1024..2048).contains(&addr) {
                prop_assert!(!cpu.kernel.kernel_mode);
                prop_assert_eq!(cpu.mem.read(addr).unwrap(), 7);
            } else {
                prop_assert!(cpu.kernel.kernel_mode);
                prop_assert_eq!(cpu.mem.read(REASON).unwrap(), 2);
            }
        }

        #[test]
        fn jumps_respect_user_region(target in 0u32..4096) {
            let mut cpu = user_cpu(&[op("move", [1, 7, 0])]);
            cpu.regs.set(1, target);
            cpu.step().unwrap();
            if (1024..2048).contains(&target) {
                prop_assert_eq!(cpu.regs.iptr(), target);
            } else {
                prop_assert_eq!(cpu.regs.iptr(), HANDLER);
                prop_assert_eq!(cpu.mem.read(RETURN).unwrap(), 1025);
            }
        }
    }
}
