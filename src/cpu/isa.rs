//! The instruction registry.
//!
//! An [`InstructionSet`] is an ordered catalog of [`InstrDef`]s: the Nth
//! registered definition is opcode N. Definitions can be appended after
//! the base set is built, and existing definitions can have guards layered
//! in front of their behavior.
//!
//! A guard sees the CPU and the raw argument bytes before the instruction
//! runs. It returns [`Flow::Proceed`] to let the next guard (or the base
//! behavior) run, [`Flow::Skip`] to end the instruction with no further
//! effect, or an error to halt the machine. Guards run most-recently-added
//! first. The chain is composed when a guard is attached, so stepping never
//! rebuilds closures.

use crate::cpu::decode::ArgError;
use crate::cpu::execute::{Cpu, ExecError};
use crate::word::{Operand, Word};
use std::fmt;
use std::rc::Rc;

/// The three raw argument bytes of an instruction word.
pub type Args = [u8; 3];

/// The effective behavior of an instruction: its guard chain plus base behavior.
pub type Behavior = Rc<dyn Fn(&mut Cpu, Args) -> Result<(), ExecError>>;

/// Computes the value an instruction would write to its destination register.
///
/// `Ok(None)` means the instruction writes nothing this time (for example a
/// `cmove` whose condition is zero).
pub type Compute = Rc<dyn Fn(&Cpu, &Args) -> Result<Option<Word>, ExecError>>;

/// What a guard tells the chain to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Run the next guard, or the base behavior.
    Proceed,
    /// Stop here; the instruction completes with no further effect.
    Skip,
}

/// How decoding validates one argument byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Not validated.
    Ignore,
    /// Must be a register selector 0-7.
    Reg,
    /// A register selector 0-7 or a literal.
    RegOrLit,
}

impl ArgKind {
    fn check(self, index: usize, byte: u8) -> Result<(), ArgError> {
        match (self, Operand::from_byte(byte)) {
            (ArgKind::Ignore, _) => Ok(()),
            (ArgKind::Reg, Operand::Literal(value)) => {
                Err(ArgError::LiteralForRegister { index, value })
            }
            (ArgKind::Reg | ArgKind::RegOrLit, Operand::Register(r)) if r >= 8 => {
                Err(ArgError::RegisterOutOfBounds { index, register: r })
            }
            _ => Ok(()),
        }
    }
}

/// Describes an instruction whose effect is writing one register.
#[derive(Clone)]
pub struct RegisterWrite {
    /// Which argument holds the destination register selector.
    pub dest: usize,
    /// The value that would be written.
    pub compute: Compute,
}

impl RegisterWrite {
    /// Destination register for a given set of arguments.
    #[inline]
    pub fn target(&self, args: &Args) -> usize {
        args[self.dest] as usize
    }
}

/// A description of an instruction (not an instance of one).
#[derive(Clone)]
pub struct InstrDef {
    name: &'static str,
    exec: Behavior,
    signature: Option<[ArgKind; 3]>,
    writes: Option<RegisterWrite>,
    guards: usize,
}

impl InstrDef {
    /// Define an instruction from its base behavior.
    pub fn new<F>(name: &'static str, exec: F) -> Self
    where
        F: Fn(&mut Cpu, Args) -> Result<(), ExecError> + 'static,
    {
        Self {
            name,
            exec: Rc::new(exec),
            signature: None,
            writes: None,
            guards: 0,
        }
    }

    /// Define an instruction whose only effect is writing one register.
    ///
    /// The base behavior evaluates `compute` and stores the result in the
    /// register named by argument `dest`. The same computation is exposed
    /// through [`InstrDef::register_write`] so guards can inspect the value
    /// before it is committed.
    pub fn writing_register<F>(name: &'static str, dest: usize, compute: F) -> Self
    where
        F: Fn(&Cpu, &Args) -> Result<Option<Word>, ExecError> + 'static,
    {
        let compute: Compute = Rc::new(compute);
        let base = Rc::clone(&compute);
        let mut def = Self::new(name, move |cpu, args| {
            if let Some(value) = base(&*cpu, &args)? {
                cpu.regs.set(args[dest] as usize, value);
            }
            Ok(())
        });
        def.writes = Some(RegisterWrite { dest, compute });
        def
    }

    /// Attach an argument signature, checked at decode time.
    pub fn with_args(mut self, kinds: [ArgKind; 3]) -> Self {
        self.signature = Some(kinds);
        self
    }

    /// Layer a guard in front of the current behavior.
    ///
    /// The new guard runs before every previously attached guard.
    pub fn add_guard<G>(&mut self, guard: G)
    where
        G: Fn(&mut Cpu, Args) -> Result<Flow, ExecError> + 'static,
    {
        let next = Rc::clone(&self.exec);
        self.exec = Rc::new(move |cpu, args| match guard(cpu, args)? {
            Flow::Skip => Ok(()),
            Flow::Proceed => next(cpu, args),
        });
        self.guards += 1;
    }

    /// Mnemonic.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The argument signature, if any.
    pub fn signature(&self) -> Option<&[ArgKind; 3]> {
        self.signature.as_ref()
    }

    /// The register-write descriptor, if this instruction has one.
    pub fn register_write(&self) -> Option<&RegisterWrite> {
        self.writes.as_ref()
    }

    /// Number of guards attached.
    pub fn guard_count(&self) -> usize {
        self.guards
    }

    /// Validate argument bytes against the signature.
    pub fn validate(&self, args: &Args) -> Result<(), ArgError> {
        if let Some(kinds) = &self.signature {
            for (i, (kind, byte)) in kinds.iter().zip(args.iter()).enumerate() {
                kind.check(i, *byte)?;
            }
        }
        Ok(())
    }

    /// The effective behavior (guards + base).
    pub(crate) fn behavior(&self) -> Behavior {
        Rc::clone(&self.exec)
    }
}

impl fmt::Debug for InstrDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrDef")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("guards", &self.guards)
            .finish()
    }
}

/// An instruction set. Opcode N is the Nth definition.
#[derive(Clone, Default)]
pub struct InstructionSet {
    defs: Vec<InstrDef>,
}

impl InstructionSet {
    /// Largest number of opcodes a one-byte opcode can address.
    pub const MAX_OPCODES: usize = 256;

    /// An empty instruction set.
    pub fn new() -> Self {
        Self { defs: Vec::new() }
    }

    /// Append a definition and return its opcode.
    ///
    /// # Panics
    /// Panics if the set already holds [`Self::MAX_OPCODES`] definitions.
    pub fn register(&mut self, def: InstrDef) -> u8 {
        assert!(
            self.defs.len() < Self::MAX_OPCODES,
            "instruction set is full; cannot register {}",
            def.name
        );
        self.defs.push(def);
        (self.defs.len() - 1) as u8
    }

    /// Number of opcodes.
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// True if no instruction is registered.
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Look up a definition by opcode.
    pub fn get(&self, opcode: u8) -> Option<&InstrDef> {
        self.defs.get(opcode as usize)
    }

    /// Look up an opcode by mnemonic.
    pub fn opcode_of(&self, name: &str) -> Option<u8> {
        self.defs.iter().position(|d| d.name == name).map(|i| i as u8)
    }

    /// Look up a definition by mnemonic.
    pub fn by_name(&self, name: &str) -> Option<&InstrDef> {
        self.defs.iter().find(|d| d.name == name)
    }

    /// Mutable lookup by mnemonic.
    pub fn by_name_mut(&mut self, name: &str) -> Option<&mut InstrDef> {
        self.defs.iter_mut().find(|d| d.name == name)
    }

    /// Iterate definitions in opcode order.
    pub fn iter(&self) -> impl Iterator<Item = &InstrDef> {
        self.defs.iter()
    }

    /// Iterate definitions mutably in opcode order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut InstrDef> {
        self.defs.iter_mut()
    }

    /// Attach one shared guard to every definition matching `pred`.
    ///
    /// Returns how many definitions received the guard.
    pub fn add_guard_where<P, G>(&mut self, pred: P, guard: G) -> usize
    where
        P: Fn(&InstrDef) -> bool,
        G: Fn(&mut Cpu, Args) -> Result<Flow, ExecError> + 'static,
    {
        let guard = Rc::new(guard);
        let mut count = 0;
        for def in self.defs.iter_mut().filter(|d| pred(d)) {
            let guard = Rc::clone(&guard);
            def.add_guard(move |cpu, args| guard(cpu, args));
            count += 1;
        }
        count
    }

    /// Attach one shared guard to every definition.
    pub fn add_guard_to_all<G>(&mut self, guard: G) -> usize
    where
        G: Fn(&mut Cpu, Args) -> Result<Flow, ExecError> + 'static,
    {
        self.add_guard_where(|_| true, guard)
    }
}

impl fmt::Debug for InstructionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.defs.iter().map(|d| d.name)).finish()
    }
}
