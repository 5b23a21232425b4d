//! Two-pass assembler.
//!
//! Syntax:
//! ```text
//! ; Comment
//!     org 1024            ; Set the address counter (nothing is emitted)
//! start:                  ; Define a label
//!     loadLiteral .msg r1 ; 16-bit value (here a label address)
//!     add r1 1 r1         ; Registers are rN, literals are plain numbers
//!     write 'A'           ; Character literal
//!     move .start r7      ; Jump
//! ```
//!
//! Numbers may be decimal or carry a `0x`, `0o` or `0b` prefix. Ordinary
//! arguments must fit an operand byte: registers 0-7, literals 0-127.

use crate::cpu::decode::{encode, ArgError};
use crate::cpu::isa::InstructionSet;
use crate::word::{Operand, Word};
use std::collections::HashMap;
use thiserror::Error;

/// The only mnemonic whose first argument is a 16-bit value.
const LOAD_LITERAL: &str = "loadLiteral";

/// Assemble source code against `set`.
pub fn assemble(source: &str, set: &InstructionSet) -> Result<Vec<Word>, AssemblerError> {
    let mut asm = Assembler::new(set);
    asm.collect_labels(source)?;
    asm.encode_lines(source)
}

/// One parsed argument before encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arg {
    Register(u32),
    Literal(u32),
}

impl Arg {
    fn value(self) -> u32 {
        match self {
            Arg::Register(v) | Arg::Literal(v) => v,
        }
    }

    fn to_byte(self) -> Option<u8> {
        match self {
            Arg::Register(r) if r < 8 => Operand::Register(r as u8).to_byte(),
            Arg::Literal(v) if v <= 127 => Operand::Literal(v as u8).to_byte(),
            _ => None,
        }
    }
}

/// A source line with its comment removed.
enum Line<'s> {
    Blank,
    Label(&'s str),
    Org(&'s str),
    Instruction(&'s str),
}

fn classify(raw: &str) -> Line<'_> {
    let text = raw.split(';').next().unwrap_or("").trim();
    if text.is_empty() {
        Line::Blank
    } else if let Some(label) = text.strip_suffix(':') {
        Line::Label(label)
    } else if let Some(rest) = text.strip_prefix("org").filter(|r| r.starts_with(char::is_whitespace)) {
        Line::Org(rest.trim())
    } else {
        Line::Instruction(text)
    }
}

/// Parse `0x`/`0o`/`0b`-prefixed or decimal unsigned numbers.
fn parse_number(text: &str) -> Option<u32> {
    let (digits, radix) = match text.get(..2) {
        Some("0x") | Some("0X") => (&text[2..], 16),
        Some("0o") | Some("0O") => (&text[2..], 8),
        Some("0b") | Some("0B") => (&text[2..], 2),
        _ => (text, 10),
    };
    u32::from_str_radix(digits, radix).ok()
}

/// The assembler state.
struct Assembler<'a> {
    set: &'a InstructionSet,
    /// Current address.
    current_addr: u32,
    /// Symbol table (label -> address).
    symbols: HashMap<String, u32>,
}

impl<'a> Assembler<'a> {
    fn new(set: &'a InstructionSet) -> Self {
        Self {
            set,
            current_addr: 0,
            symbols: HashMap::new(),
        }
    }

    /// Pass 1: assign an address to every label.
    fn collect_labels(&mut self, source: &str) -> Result<(), AssemblerError> {
        for (i, raw) in source.lines().enumerate() {
            let line = i + 1;
            match classify(raw) {
                Line::Blank => {}
                Line::Label(label) => {
                    if label.is_empty() || !label.chars().all(|c| c.is_alphanumeric() || c == '_') {
                        return Err(AssemblerError::InvalidLabel { line, label: label.to_string() });
                    }
                    if self.symbols.insert(label.to_string(), self.current_addr).is_some() {
                        return Err(AssemblerError::DuplicateLabel { line, label: label.to_string() });
                    }
                }
                Line::Org(value) => {
                    self.current_addr = parse_number(value).ok_or_else(|| AssemblerError::SyntaxError {
                        line,
                        message: format!("org requires an address, found \"{}\"", value),
                    })?;
                }
                Line::Instruction(_) => {
                    self.current_addr = self.current_addr.wrapping_add(1);
                }
            }
        }
        Ok(())
    }

    /// Pass 2: encode every instruction.
    fn encode_lines(&self, source: &str) -> Result<Vec<Word>, AssemblerError> {
        let mut output = Vec::new();
        for (i, raw) in source.lines().enumerate() {
            if let Line::Instruction(text) = classify(raw) {
                output.push(self.encode_instruction(text, i + 1)?);
            }
        }
        Ok(output)
    }

    fn encode_instruction(&self, text: &str, line: usize) -> Result<Word, AssemblerError> {
        let mut parts = text.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let args = parts
            .map(|p| self.parse_arg(p, line))
            .collect::<Result<Vec<_>, _>>()?;

        let opcode = self.set.opcode_of(name).ok_or_else(|| AssemblerError::UnknownMnemonic {
            line,
            mnemonic: name.to_string(),
        })?;

        let wrong_count = if name == LOAD_LITERAL { args.len() != 2 } else { args.len() > 3 };
        if wrong_count {
            return Err(AssemblerError::WrongArgumentCount { line, name: name.to_string(), count: args.len() });
        }

        let out_of_range = |arg: Arg| AssemblerError::ValueOutOfRange { line, value: arg.value() };
        let mut bytes = [0u8; 3];
        if name == LOAD_LITERAL {
            let [hi, lo] = (args[0].value() as u16).to_be_bytes();
            bytes[0] = hi;
            bytes[1] = lo;
            bytes[2] = args[1].to_byte().ok_or_else(|| out_of_range(args[1]))?;
        } else {
            for (slot, arg) in bytes.iter_mut().zip(&args) {
                *slot = arg.to_byte().ok_or_else(|| out_of_range(*arg))?;
            }
        }

        if let Some(def) = self.set.get(opcode) {
            def.validate(&bytes).map_err(|source| AssemblerError::InvalidArguments {
                line,
                name: def.name(),
                source,
            })?;
        }
        Ok(encode(opcode, bytes))
    }

    fn parse_arg(&self, text: &str, line: usize) -> Result<Arg, AssemblerError> {
        let invalid = || AssemblerError::SyntaxError {
            line,
            message: format!("invalid argument \"{}\"", text),
        };

        let arg = if let Some(label) = text.strip_prefix('.') {
            let addr = *self.symbols.get(label).ok_or_else(|| AssemblerError::UndefinedLabel {
                line,
                label: label.to_string(),
            })?;
            Arg::Literal(addr)
        } else if text.starts_with('\'') {
            let bytes = text.as_bytes();
            if bytes.len() != 3 || bytes[2] != b'\'' {
                return Err(invalid());
            }
            Arg::Literal(bytes[1] as u32)
        } else if let Some(reg) = text.strip_prefix('r') {
            Arg::Register(parse_number(reg).ok_or_else(invalid)?)
        } else {
            Arg::Literal(parse_number(text).ok_or_else(invalid)?)
        };

        if arg.value() > u16::MAX as u32 {
            return Err(AssemblerError::ValueOutOfRange { line, value: arg.value() });
        }
        Ok(arg)
    }
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("label defined twice on line {line}: {label}")]
    DuplicateLabel { line: usize, label: String },

    #[error("invalid label on line {line}: \"{label}\"")]
    InvalidLabel { line: usize, label: String },

    #[error("value out of range on line {line}: {value}")]
    ValueOutOfRange { line: usize, value: u32 },

    #[error("wrong number of arguments on line {line}: {name} given {count}")]
    WrongArgumentCount { line: usize, name: String, count: usize },

    #[error("invalid arguments on line {line} for {name}: {source}")]
    InvalidArguments {
        line: usize,
        name: &'static str,
        #[source]
        source: ArgError,
    },
}
