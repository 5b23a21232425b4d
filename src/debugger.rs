//! Line-oriented debugger.
//!
//! Reads one command per line and drives the CPU only through `step`,
//! read-only inspection and input appends.
//!
//! ```text
//! step                        execute a single instruction
//! continue                    run until halt or a breakpoint
//! break --set|--clear <hex>   manage breakpoints on the instruction pointer
//! appendInput <text...>       queue text (plus a newline) for `read`
//! debug on|off                toggle step tracing
//! debug print [--memory] [--json]
//! help
//! ```

use crate::cpu::Cpu;
use crate::logging;
use crate::word::{Hex, Word};
use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};

const DEBUG_USAGE: &str = "invalid format; expected 'debug [on | off | print [--memory] [--json]]'";
const BREAK_USAGE: &str =
    "invalid format; expected 'break [--set | --clear] <addr>' (note that <addr> is encoded as hex)";

/// Debugger state that outlives individual commands.
#[derive(Debug, Default)]
pub struct Debugger {
    breakpoints: BTreeSet<Word>,
}

impl Debugger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Addresses with a breakpoint, ascending.
    pub fn breakpoints(&self) -> impl Iterator<Item = Word> + '_ {
        self.breakpoints.iter().copied()
    }

    /// Prompt for and run commands until `input` is exhausted.
    pub fn run<R: BufRead, W: Write>(&mut self, cpu: &mut Cpu, input: R, out: &mut W) -> io::Result<()> {
        write!(out, "> ")?;
        out.flush()?;
        for line in input.lines() {
            self.execute(cpu, &line?, out)?;
            write!(out, "> ")?;
            out.flush()?;
        }
        writeln!(out)
    }

    /// Run a single command line.
    pub fn execute<W: Write>(&mut self, cpu: &mut Cpu, line: &str, out: &mut W) -> io::Result<()> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let Some((&cmd, args)) = fields.split_first() else {
            return Ok(());
        };

        match cmd {
            "step" => {
                if cpu.is_halted() {
                    writeln!(out, "CPU is halted; cannot step")?;
                } else {
                    step(cpu, out)?;
                }
            }
            "continue" => {
                if !args.is_empty() {
                    writeln!(out, "invalid format: continue takes no arguments")?;
                } else if cpu.is_halted() {
                    writeln!(out, "CPU is halted; cannot continue")?;
                } else {
                    self.continue_to_breakpoint(cpu, out)?;
                }
            }
            "break" => self.breakpoint(args, out)?,
            "appendInput" => {
                let mut text = args.join(" ");
                text.push('\n');
                cpu.append_input(text.into_bytes());
            }
            "debug" => debug_command(cpu, args, out)?,
            "help" => {
                if args.is_empty() {
                    help(out)?;
                } else {
                    writeln!(out, "invalid format: help takes no arguments")?;
                }
            }
            _ => writeln!(out, "Unrecognized command")?,
        }
        Ok(())
    }

    fn continue_to_breakpoint<W: Write>(&mut self, cpu: &mut Cpu, out: &mut W) -> io::Result<()> {
        loop {
            if step(cpu, out)? {
                return Ok(());
            }
            let iptr = cpu.regs.iptr();
            if self.breakpoints.contains(&iptr) {
                return writeln!(out, "Encountered a breakpoint at instruction pointer {}", Hex(iptr));
            }
        }
    }

    fn breakpoint<W: Write>(&mut self, args: &[&str], out: &mut W) -> io::Result<()> {
        let [flag, addr] = args else {
            return writeln!(out, "{}", BREAK_USAGE);
        };
        if *flag != "--set" && *flag != "--clear" {
            return writeln!(out, "{}", BREAK_USAGE);
        }
        let addr = match Word::from_str_radix(addr.trim_start_matches("0x"), 16) {
            Ok(a) => a,
            Err(e) => return writeln!(out, "failed to parse address: {}", e),
        };
        if *flag == "--set" {
            self.breakpoints.insert(addr);
        } else {
            self.breakpoints.remove(&addr);
        }
        Ok(())
    }
}

/// Step once, reporting a bad state. Returns true if the CPU is now halted.
fn step<W: Write>(cpu: &mut Cpu, out: &mut W) -> io::Result<bool> {
    match cpu.step() {
        Ok(halted) => Ok(halted),
        Err(e) => {
            writeln!(out, "CPU entered a bad state: {}; halting...", e)?;
            Ok(true)
        }
    }
}

fn debug_command<W: Write>(cpu: &Cpu, args: &[&str], out: &mut W) -> io::Result<()> {
    match args {
        ["on"] => logging::set_tracing(true),
        ["off"] => logging::set_tracing(false),
        ["print", flags @ ..] if flags.iter().all(|f| *f == "--memory" || *f == "--json") => {
            let memory = flags.contains(&"--memory");
            if flags.contains(&"--json") {
                match serde_json::to_string_pretty(&cpu.snapshot(memory)) {
                    Ok(json) => writeln!(out, "{}", json)?,
                    Err(e) => writeln!(out, "failed to serialize state: {}", e)?,
                }
            } else {
                writeln!(out, "CPU state: {}", cpu)?;
                if memory {
                    writeln!(out, "Memory: {:?}", cpu.mem.cells())?;
                }
            }
        }
        _ => writeln!(out, "{}", DEBUG_USAGE)?,
    }
    Ok(())
}

fn help<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out, "Available commands:")?;
    writeln!(out, "    step        : Execute a single instruction")?;
    writeln!(out, "    debug       : Enable or disable debugging, or print the current machine state")?;
    writeln!(out, "    continue    : Continue executing instructions until the next breakpoint")?;
    writeln!(out, "    break       : Set or clear a breakpoint")?;
    writeln!(out, "    appendInput : Add text to the input read by the 'read' instruction")?;
    writeln!(out, "    help        : Print this help text")
}
