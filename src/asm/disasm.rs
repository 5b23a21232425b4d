//! Disassembler.
//!
//! Converts instruction words back to assembler syntax. Output for a valid
//! word re-assembles to the same word as long as its ignored argument bytes
//! are zero.

use crate::cpu::decode::split;
use crate::cpu::isa::{ArgKind, InstructionSet};
use crate::word::{Hex, Operand, Word};

/// Disassemble a single instruction to text.
pub fn disassemble_word(w: Word, set: &InstructionSet) -> String {
    let instr = match set.decode(w) {
        Ok(instr) => instr,
        Err(_) => return format!("??? {}", Hex(w)),
    };
    let (_, args) = split(w);

    if instr.name == "loadLiteral" {
        let value = u16::from_be_bytes([args[0], args[1]]);
        return format!("loadLiteral {} {}", value, Operand::from_byte(args[2]));
    }

    let kinds = set.get(instr.opcode).and_then(|d| d.signature().copied());
    let mut text = instr.name.to_string();
    if let Some(kinds) = kinds {
        // Trailing ignored arguments are dropped; inner ones print as written.
        let used = kinds.iter().rposition(|k| *k != ArgKind::Ignore).map_or(0, |i| i + 1);
        for byte in &args[..used] {
            text.push(' ');
            text.push_str(&Operand::from_byte(*byte).to_string());
        }
    }
    text
}

/// Disassemble a slice of words loaded at `origin`.
pub fn disassemble(words: &[Word], origin: Word, set: &InstructionSet) -> String {
    let mut output = String::new();
    output.push_str("; addr     word      instruction\n");

    for (i, w) in words.iter().enumerate() {
        let addr = origin.wrapping_add(i as Word);
        output.push_str(&format!("{}: {}  {}\n", Hex(addr), Hex(*w), disassemble_word(*w, set)));
    }

    output
}
