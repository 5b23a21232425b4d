//! Instruction decoder.
//!
//! An instruction word is four bytes, big-endian:
//! byte 0 is the opcode, bytes 1-3 are the arguments. Each argument is
//! either a register selector (high bit clear) or a literal (high bit set,
//! value = byte - 128).

use crate::cpu::isa::{Args, Behavior, InstructionSet};
use crate::cpu::execute::{Cpu, ExecError};
use crate::word::{self, Word};
use std::fmt;
use thiserror::Error;

/// A decoded instance of an instruction.
#[derive(Clone)]
pub struct DecodedInstr {
    /// Opcode (position in the instruction set).
    pub opcode: u8,
    /// Mnemonic of the definition.
    pub name: &'static str,
    /// The raw argument bytes.
    pub args: Args,
    exec: Behavior,
}

impl DecodedInstr {
    /// Run the instruction: guard chain, then base behavior.
    pub fn run(&self, cpu: &mut Cpu) -> Result<(), ExecError> {
        (self.exec)(cpu, self.args)
    }

    /// Re-encode this instance as a word.
    pub fn encode(&self) -> Word {
        encode(self.opcode, self.args)
    }
}

impl fmt::Display for DecodedInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.name, self.args)
    }
}

impl fmt::Debug for DecodedInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedInstr")
            .field("opcode", &self.opcode)
            .field("name", &self.name)
            .field("args", &self.args)
            .finish()
    }
}

/// Split a word into its opcode and argument bytes.
#[inline]
pub fn split(w: Word) -> (u8, Args) {
    let b = word::to_be_bytes(w);
    (b[0], [b[1], b[2], b[3]])
}

/// Encode an opcode and argument bytes into an instruction word.
#[inline]
pub fn encode(opcode: u8, args: Args) -> Word {
    word::from_be_bytes([opcode, args[0], args[1], args[2]])
}

impl InstructionSet {
    /// Decode a word as an instruction.
    ///
    /// This resolves the opcode to a definition and then validates the
    /// arguments against that definition's signature.
    pub fn decode(&self, w: Word) -> Result<DecodedInstr, DecodeError> {
        let (opcode, args) = split(w);

        let def = self.get(opcode).ok_or(DecodeError::InvalidOpcode(opcode))?;
        def.validate(&args)
            .map_err(|source| DecodeError::InvalidArguments { name: def.name(), source })?;

        Ok(DecodedInstr {
            opcode,
            name: def.name(),
            args,
            exec: def.behavior(),
        })
    }
}

/// An argument that does not fit its declared kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgError {
    #[error("argument {index}: literal given ({value}) where register expected")]
    LiteralForRegister { index: usize, value: u8 },

    #[error("argument {index}: register out of bounds: {register}")]
    RegisterOutOfBounds { index: usize, register: u8 },
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid instruction code: {0}")]
    InvalidOpcode(u8),

    #[error("invalid arguments for instruction {name}: {source}")]
    InvalidArguments {
        name: &'static str,
        #[source]
        source: ArgError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::instructions::base_set;
    use crate::cpu::isa::ArgKind;
    use crate::kernel;
    use proptest::prelude::*;

    #[test]
    fn test_decode_nop() {
        let set = base_set();
        let instr = set.decode(0).unwrap();
        assert_eq!(instr.name, "nop");
        assert_eq!(instr.args, [0, 0, 0]);
    }

    #[test]
    fn test_decode_invalid_opcode() {
        let set = base_set();
        let err = set.decode(encode(200, [0, 0, 0])).unwrap_err();
        assert_eq!(err, DecodeError::InvalidOpcode(200));
        assert_eq!(err.to_string(), "invalid instruction code: 200");
    }

    #[test]
    fn test_decode_rejects_bad_register() {
        let set = base_set();
        let add = set.opcode_of("add").unwrap();
        // destination must be a register
        let err = set.decode(encode(add, [129, 130, 131])).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::InvalidArguments { name: "add", source: ArgError::LiteralForRegister { index: 2, value: 3 } }
        ));
        // 8..=127 is neither a register nor a literal
        assert!(set.decode(encode(add, [9, 0, 1])).is_err());
    }

    #[test]
    fn test_display() {
        let set = base_set();
        let add = set.opcode_of("add").unwrap();
        let instr = set.decode(encode(add, [129, 2, 3])).unwrap();
        assert_eq!(instr.to_string(), "add [129, 2, 3]");
    }

    proptest! {
        #[test]
        fn encode_decode_recovers_fields(opcode in 0u8..27, a in 0u8..8, b in 128u8..=255, c in 0u8..8) {
            let set = kernel::instruction_set();
            let def = set.get(opcode).unwrap();
            // pick argument bytes that satisfy any signature
            let args = match def.signature() {
                Some(kinds) => {
                    let pick = |k: &ArgKind, reg: u8, lit: u8| match k {
                        ArgKind::RegOrLit => lit,
                        _ => reg,
                    };
                    [pick(&kinds[0], a, b), pick(&kinds[1], c, b), pick(&kinds[2], a, b)]
                }
                None => [a, b, c],
            };
            let decoded = set.decode(encode(opcode, args)).unwrap();
            prop_assert_eq!(decoded.opcode, opcode);
            prop_assert_eq!(decoded.args, args);
            prop_assert_eq!(decoded.encode(), encode(opcode, args));
        }

        #[test]
        fn split_inverts_encode(opcode in any::<u8>(), args in any::<[u8; 3]>()) {
            prop_assert_eq!(split(encode(opcode, args)), (opcode, args));
        }
    }
}
