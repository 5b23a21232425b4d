//! Debugger application state and logic.

use crate::asm::disasm::disassemble_word;
use crate::boot::{self, BootError};
use crate::config::MachineConfig;
use crate::cpu::{Cpu, OutputCapture};
use crate::kernel::TrapReason;
use crate::word::{Hex, Word};
use std::collections::HashSet;

/// Steps executed per frame while running.
const STEPS_PER_TICK: usize = 500;

/// Debugger application state.
pub struct DebuggerApp {
    /// The CPU being debugged.
    pub cpu: Cpu,
    /// Guest output.
    pub console: OutputCapture,
    /// Breakpoints (by address).
    pub breakpoints: HashSet<Word>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Memory view scroll offset.
    pub mem_scroll: usize,
    /// Line being typed for the input device, if in input mode.
    pub input_line: Option<String>,
    /// Reason of the most recent entry into kernel mode.
    pub last_trap: Option<TrapReason>,
    config: MachineConfig,
    kernel_image: Vec<Word>,
    program: Vec<Word>,
}

impl DebuggerApp {
    /// Boot a machine for debugging.
    pub fn new(config: MachineConfig, kernel_image: Vec<Word>, program: Vec<Word>) -> Result<Self, BootError> {
        let console = OutputCapture::new();
        let cpu = Self::boot(&config, &kernel_image, &program, &console)?;
        Ok(Self {
            cpu,
            console,
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status: "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into(),
            mem_scroll: 0,
            input_line: None,
            last_trap: None,
            config,
            kernel_image,
            program,
        })
    }

    fn boot(
        config: &MachineConfig,
        kernel_image: &[Word],
        program: &[Word],
        console: &OutputCapture,
    ) -> Result<Cpu, BootError> {
        let mut cpu = boot::load(config, kernel_image, program)?;
        cpu.output = console.device();
        Ok(cpu)
    }

    /// True if the next instruction is a `read` that would find no input.
    pub fn waiting_for_input(&self) -> bool {
        if !self.cpu.kernel_mode() || self.cpu.input.remaining() != Some(0) {
            return false;
        }
        self.cpu
            .mem
            .read(self.cpu.regs.iptr())
            .ok()
            .and_then(|w| self.cpu.instructions().decode(w).ok())
            .is_some_and(|i| i.name == "read")
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if self.cpu.is_halted() {
            self.status = format!("CPU halted after {} cycles", self.cpu.cycles);
            self.running = false;
            return;
        }
        if self.waiting_for_input() {
            self.status = "Waiting for input. Press 'i' to type a line.".into();
            self.running = false;
            return;
        }

        let iptr = self.cpu.regs.iptr();
        let was_user = !self.cpu.kernel_mode();
        let text = self
            .cpu
            .mem
            .read(iptr)
            .map(|w| disassemble_word(w, self.cpu.instructions()))
            .unwrap_or_default();
        match self.cpu.step() {
            Ok(_) => {
                self.status = format!("{}: {}", Hex(iptr), text);
                if was_user && self.cpu.kernel_mode() {
                    self.last_trap = self.trap_reason_cell();
                }
            }
            Err(e) => {
                self.status = format!("CPU entered a bad state: {}; halting...", e);
                self.running = false;
            }
        }
    }

    fn trap_reason_cell(&self) -> Option<TrapReason> {
        let vector = self.cpu.kernel.effective_vector()?;
        let code = self.cpu.mem.read(vector.trap_reason).ok()?;
        TrapReason::from_code(code)
    }

    /// Bytes read from the input device and written to the output device.
    pub fn io_counts(&self) -> (u64, u64) {
        (self.cpu.input.consumed(), self.cpu.output.written())
    }

    /// Run until halt, breakpoint, or error.
    pub fn run(&mut self) {
        self.running = true;
        self.status = "Running...".into();
    }

    /// Run one batch of continuous execution.
    pub fn tick(&mut self) {
        for _ in 0..STEPS_PER_TICK {
            if !self.running {
                return;
            }
            self.step();
            if self.cpu.is_halted() {
                self.running = false;
                if !self.status.starts_with("CPU entered") {
                    self.status = format!("Halted after {} cycles", self.cpu.cycles);
                }
                return;
            }

            let iptr = self.cpu.regs.iptr();
            if self.breakpoints.contains(&iptr) {
                self.running = false;
                self.status = format!("Breakpoint at {}", Hex(iptr));
                return;
            }
        }
    }

    /// Toggle breakpoint at the current instruction pointer.
    pub fn toggle_breakpoint(&mut self) {
        let iptr = self.cpu.regs.iptr();
        if self.breakpoints.remove(&iptr) {
            self.status = format!("Removed breakpoint at {}", Hex(iptr));
        } else {
            self.breakpoints.insert(iptr);
            self.status = format!("Set breakpoint at {}", Hex(iptr));
        }
    }

    /// Start typing a line for the input device.
    pub fn begin_input(&mut self) {
        self.running = false;
        self.input_line = Some(String::new());
        self.status = "Input: type a line, Enter to send, Esc to cancel.".into();
    }

    /// Queue the typed line (plus a newline) on the input device.
    pub fn submit_input(&mut self) {
        if let Some(mut line) = self.input_line.take() {
            line.push('\n');
            self.status = format!("Queued {} bytes of input", line.len());
            self.cpu.append_input(line.into_bytes());
        }
    }

    /// Re-boot from the original images. Breakpoints are kept.
    pub fn reset(&mut self) {
        self.console.clear();
        match Self::boot(&self.config, &self.kernel_image, &self.program, &self.console) {
            Ok(cpu) => {
                self.cpu = cpu;
                self.status = "Reset. Ready.".into();
            }
            Err(e) => self.status = format!("Reset failed: {}", e),
        }
        self.running = false;
        self.input_line = None;
        self.last_trap = None;
    }

    /// Get disassembly around the instruction pointer.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(Word, String, bool)> {
        let iptr = self.cpu.regs.iptr();
        let start = iptr.saturating_sub(lines as Word / 2);

        (0..lines as Word)
            .filter_map(|i| {
                let addr = start.checked_add(i)?;
                let w = self.cpu.mem.read(addr).ok()?;
                Some((addr, disassemble_word(w, self.cpu.instructions()), addr == iptr))
            })
            .collect()
    }
}
