//! The standard instruction set.
//!
//! Opcodes 0-23, in this order:
//!
//! | op | name          | args                | effect                           |
//! |----|---------------|---------------------|----------------------------------|
//! | 0  | `nop`         |                     | nothing                          |
//! | 1  | `add`         | a0 a1 r2            | r2 := a0 + a1                    |
//! | 2  | `sub`         | a0 a1 r2            | r2 := a0 - a1                    |
//! | 3  | `mul`         | a0 a1 r2            | r2 := a0 * a1                    |
//! | 4  | `div`         | a0 a1 r2            | r2 := a0 / a1                    |
//! | 5  | `shl`         | a0 a1 r2            | r2 := a0 << a1                   |
//! | 6  | `shr`         | a0 a1 r2            | r2 := a0 >> a1                   |
//! | 7  | `and`         | a0 a1 r2            | r2 := a0 & a1                    |
//! | 8  | `or`          | a0 a1 r2            | r2 := a0 \| a1                   |
//! | 9  | `xor`         | a0 a1 r2            | r2 := a0 ^ a1                    |
//! | 10 | `not`         | a0 r1               | r1 := !a0                        |
//! | 11 | `gt`          | a0 a1 r2            | r2 := a0 > a1                    |
//! | 12 | `lt`          | a0 a1 r2            | r2 := a0 < a1                    |
//! | 13 | `eq`          | a0 a1 r2            | r2 := a0 == a1                   |
//! | 14 | `move`        | a0 r1               | r1 := a0                         |
//! | 15 | `cmove`       | a0 a1 r2            | if a0 != 0 { r2 := a1 }          |
//! | 16 | `load`        | a0 r1               | r1 := mem[a0]                    |
//! | 17 | `store`       | a0 a1               | mem[a1] := a0                    |
//! | 18 | `loadLiteral` | v16 r2              | r2 := 16-bit literal             |
//! | 19 | `read`        | r0                  | r0 := next input byte            |
//! | 20 | `write`       | a0                  | output low byte of a0            |
//! | 21 | `halt`        |                     | stop the machine                 |
//! | 22 | `debug`       | a0                  | dump state to stderr (+memory)   |
//! | 23 | `unreachable` |                     | fatal error                      |

use crate::cpu::execute::{Cpu, ExecError};
use crate::cpu::isa::{ArgKind::{Ignore, Reg, RegOrLit}, InstrDef, InstructionSet};
use crate::word::Word;

/// A two-operand word operation. `None` means the operation is undefined
/// for these operands (division by zero).
pub type BinaryOp = fn(Word, Word) -> Option<Word>;

/// Generate an instruction `name a0 a1 r2` storing `op(a0, a1)` in r2.
pub fn arithmetic(name: &'static str, op: BinaryOp) -> InstrDef {
    InstrDef::writing_register(name, 2, move |cpu, args| {
        let a0 = cpu.regs.resolve(args[0]);
        let a1 = cpu.regs.resolve(args[1]);
        op(a0, a1).map(Some).ok_or(ExecError::DivisionByZero)
    })
    .with_args([RegOrLit, RegOrLit, Reg])
}

/// Generate a comparison: stores 1 in r2 if `op(a0, a1)`, else 0.
pub fn comparison(name: &'static str, op: fn(Word, Word) -> bool) -> InstrDef {
    InstrDef::writing_register(name, 2, move |cpu, args| {
        let a0 = cpu.regs.resolve(args[0]);
        let a1 = cpu.regs.resolve(args[1]);
        Ok(Some(op(a0, a1) as Word))
    })
    .with_args([RegOrLit, RegOrLit, Reg])
}

fn shift_left(a: Word, b: Word) -> Option<Word> {
    Some(a.checked_shl(b).unwrap_or(0))
}

fn shift_right(a: Word, b: Word) -> Option<Word> {
    Some(a.checked_shr(b).unwrap_or(0))
}

/// Build the standard 24-instruction set.
pub fn base_set() -> InstructionSet {
    let mut set = InstructionSet::new();

    set.register(InstrDef::new("nop", |_, _| Ok(())));

    // ==================== Arithmetic ====================

    set.register(arithmetic("add", |a, b| Some(a.wrapping_add(b))));
    set.register(arithmetic("sub", |a, b| Some(a.wrapping_sub(b))));
    set.register(arithmetic("mul", |a, b| Some(a.wrapping_mul(b))));
    set.register(arithmetic("div", |a, b| a.checked_div(b)));
    set.register(arithmetic("shl", shift_left));
    set.register(arithmetic("shr", shift_right));
    set.register(arithmetic("and", |a, b| Some(a & b)));
    set.register(arithmetic("or", |a, b| Some(a | b)));
    set.register(arithmetic("xor", |a, b| Some(a ^ b)));
    set.register(
        InstrDef::writing_register("not", 1, |cpu, args| Ok(Some(!cpu.regs.resolve(args[0]))))
            .with_args([RegOrLit, Reg, Ignore]),
    );

    // ==================== Comparison ====================

    set.register(comparison("gt", |a, b| a > b));
    set.register(comparison("lt", |a, b| a < b));
    set.register(comparison("eq", |a, b| a == b));

    // ==================== Data Transfer ====================

    set.register(
        InstrDef::writing_register("move", 1, |cpu, args| Ok(Some(cpu.regs.resolve(args[0]))))
            .with_args([RegOrLit, Reg, Ignore]),
    );
    set.register(
        InstrDef::writing_register("cmove", 2, |cpu, args| {
            if cpu.regs.resolve(args[0]) != 0 {
                Ok(Some(cpu.regs.resolve(args[1])))
            } else {
                Ok(None)
            }
        })
        .with_args([RegOrLit, RegOrLit, Reg]),
    );
    set.register(
        InstrDef::writing_register("load", 1, |cpu, args| {
            let addr = cpu.regs.resolve(args[0]);
            let value = cpu
                .mem
                .read(addr)
                .map_err(|source| ExecError::Memory { op: "load", source })?;
            Ok(Some(value))
        })
        .with_args([RegOrLit, Reg, Ignore]),
    );
    set.register(
        InstrDef::new("store", |cpu, args| {
            let value = cpu.regs.resolve(args[0]);
            let addr = cpu.regs.resolve(args[1]);
            cpu.mem
                .write(addr, value)
                .map_err(|source| ExecError::Memory { op: "store", source })
        })
        .with_args([RegOrLit, RegOrLit, Ignore]),
    );
    set.register(
        InstrDef::writing_register("loadLiteral", 2, |_, args| {
            Ok(Some(Word::from_be_bytes([0, 0, args[0], args[1]])))
        })
        .with_args([Ignore, Ignore, Reg]),
    );

    // ==================== Devices ====================

    set.register(
        InstrDef::new("read", |cpu, args| {
            let byte = cpu.input.read_byte();
            cpu.regs.set(args[0] as usize, byte as Word);
            Ok(())
        })
        .with_args([Reg, Ignore, Ignore]),
    );
    set.register(
        InstrDef::new("write", |cpu, args| {
            let byte = cpu.regs.resolve(args[0]) as u8;
            cpu.output.write_byte(byte);
            Ok(())
        })
        .with_args([RegOrLit, Ignore, Ignore]),
    );

    // ==================== Control ====================

    set.register(InstrDef::new("halt", |cpu, _| {
        cpu.halt();
        Ok(())
    }));
    set.register(
        InstrDef::new("debug", |cpu, args| {
            eprint!("{}", debug_report(cpu, cpu.regs.resolve(args[0]) != 0));
            Ok(())
        })
        .with_args([RegOrLit, Ignore, Ignore]),
    );
    set.register(InstrDef::new("unreachable", |_, _| Err(ExecError::Unreachable)));

    set
}

/// What the `debug` instruction prints to stderr.
fn debug_report(cpu: &Cpu, verbose: bool) -> String {
    let mut report = format!("[debug instruction] CPU state: {}\n", cpu);
    if verbose {
        report.push_str(&format!("[debug instruction][verbose] memory: {:?}\n", cpu.mem.cells()));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::encode;
    use crate::cpu::devices::{InputDevice, OutputCapture};
    use crate::cpu::execute::{Cpu, CpuError};
    use crate::cpu::memory::Memory;
    use crate::kernel::KernelState;

    fn reg(r: u8) -> u8 {
        r
    }

    fn lit(v: u8) -> u8 {
        v + 128
    }

    fn op(name: &str, args: [u8; 3]) -> Word {
        encode(base_set().opcode_of(name).unwrap(), args)
    }

    fn run(program: &[Word]) -> Cpu {
        let mut mem = Memory::new(64);
        mem.load_image(0, program).unwrap();
        let mut cpu = Cpu::boot_with(KernelState::default(), mem, base_set());
        cpu.input = InputDevice::empty();
        cpu.run().unwrap();
        cpu
    }

    #[test]
    fn test_opcode_order() {
        let names: Vec<_> = base_set().iter().map(|d| d.name()).collect();
        assert_eq!(names.len(), 24);
        assert_eq!(names[0], "nop");
        assert_eq!(names[18], "loadLiteral");
        assert_eq!(names[23], "unreachable");
    }

    #[test]
    fn test_arithmetic() {
        let cpu = run(&[
            op("add", [lit(3), lit(4), reg(1)]),
            op("sub", [lit(3), lit(4), reg(2)]),
            op("mul", [reg(1), lit(6), reg(3)]),
            op("div", [reg(3), lit(5), reg(4)]),
            op("shl", [lit(1), lit(40), reg(5)]),
            op("halt", [0, 0, 0]),
        ]);
        assert_eq!(cpu.regs.get(1), 7);
        assert_eq!(cpu.regs.get(2), Word::MAX);
        assert_eq!(cpu.regs.get(3), 42);
        assert_eq!(cpu.regs.get(4), 8);
        assert_eq!(cpu.regs.get(5), 0);
    }

    #[test]
    fn test_bitwise_and_compare() {
        let cpu = run(&[
            op("or", [lit(0b1100), lit(0b0011), reg(1)]),
            op("and", [reg(1), lit(0b0110), reg(2)]),
            op("xor", [reg(1), lit(1), reg(3)]),
            op("not", [lit(0), reg(4), 0]),
            op("gt", [lit(5), lit(4), reg(5)]),
            op("eq", [lit(5), lit(4), reg(6)]),
            op("halt", [0, 0, 0]),
        ]);
        assert_eq!(cpu.regs.get(1), 0b1111);
        assert_eq!(cpu.regs.get(2), 0b0110);
        assert_eq!(cpu.regs.get(3), 0b1110);
        assert_eq!(cpu.regs.get(4), Word::MAX);
        assert_eq!(cpu.regs.get(5), 1);
        assert_eq!(cpu.regs.get(6), 0);
    }

    #[test]
    fn test_moves_and_memory() {
        let cpu = run(&[
            op("loadLiteral", [0x12, 0x34, reg(1)]),
            op("store", [reg(1), lit(40), 0]),
            op("load", [lit(40), reg(2), 0]),
            op("cmove", [lit(0), lit(9), reg(3)]),
            op("cmove", [lit(1), lit(9), reg(4)]),
            op("move", [reg(2), reg(5), 0]),
            op("halt", [0, 0, 0]),
        ]);
        assert_eq!(cpu.regs.get(1), 0x1234);
        assert_eq!(cpu.mem.read(40).unwrap(), 0x1234);
        assert_eq!(cpu.regs.get(3), 0);
        assert_eq!(cpu.regs.get(4), 9);
        assert_eq!(cpu.regs.get(5), 0x1234);
    }

    #[test]
    fn test_move_to_iptr_jumps() {
        let cpu = run(&[
            op("move", [lit(3), reg(7), 0]),
            op("unreachable", [0, 0, 0]),
            op("unreachable", [0, 0, 0]),
            op("halt", [0, 0, 0]),
        ]);
        assert!(cpu.is_halted());
        assert_eq!(cpu.regs.iptr(), 4);
    }

    #[test]
    fn test_devices() {
        let mut mem = Memory::new(16);
        mem.load_image(0, &[
            op("read", [reg(1), 0, 0]),
            op("add", [reg(1), lit(1), reg(1)]),
            op("write", [reg(1), 0, 0]),
            op("halt", [0, 0, 0]),
        ]).unwrap();
        let mut cpu = Cpu::boot_with(KernelState::default(), mem, base_set());
        let capture = OutputCapture::new();
        cpu.input = InputDevice::from_bytes(b"A".to_vec());
        cpu.output = capture.device();
        cpu.run().unwrap();
        assert_eq!(capture.contents(), b"B");
    }

    #[test]
    fn test_load_out_of_memory_is_fatal() {
        let mut mem = Memory::new(8);
        mem.load_image(0, &[op("load", [lit(100), reg(1), 0])]).unwrap();
        let mut cpu = Cpu::boot_with(KernelState::default(), mem, base_set());
        let err = cpu.step().unwrap_err();
        assert!(matches!(err, CpuError::Execute { source: ExecError::Memory { op: "load", .. }, .. }));
        assert!(cpu.is_halted());
    }

    #[test]
    fn test_division_by_zero_is_fatal() {
        let mut mem = Memory::new(8);
        mem.load_image(0, &[op("div", [lit(1), lit(0), reg(1)])]).unwrap();
        let mut cpu = Cpu::boot_with(KernelState::default(), mem, base_set());
        let err = cpu.step().unwrap_err();
        assert!(matches!(err, CpuError::Execute { source: ExecError::DivisionByZero, .. }));
    }

    #[test]
    fn test_debug_report() {
        let cpu = run(&[op("debug", [lit(1), 0, 0]), op("halt", [0, 0, 0])]);
        let report = debug_report(&cpu, false);
        assert_eq!(report, format!("[debug instruction] CPU state: {}\n", cpu));
        assert_eq!(report.lines().count(), 1);

        let verbose = debug_report(&cpu, true);
        assert!(verbose.starts_with(&report));
        assert!(verbose.ends_with(&format!("[debug instruction][verbose] memory: {:?}\n", cpu.mem.cells())));
    }

    #[test]
    fn test_unreachable() {
        let mut mem = Memory::new(8);
        mem.load_image(0, &[op("unreachable", [0, 0, 0])]).unwrap();
        let mut cpu = Cpu::boot_with(KernelState::default(), mem, base_set());
        let err = cpu.step().unwrap_err();
        assert!(err.to_string().contains("unreachable instruction reached"));
    }
}
