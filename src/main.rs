//! trapvm - CLI Entry Point
//!
//! Commands:
//! - `trapvm run <kernel> <program>` - Boot a kernel image with a user program
//! - `trapvm asm <source>` - Assemble to a raw word image
//! - `trapvm disasm <image>` - Disassemble an image or source file

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use trapvm::asm::{assemble, disassemble, load_image, save_image};
use trapvm::config::MachineConfig;
use trapvm::debugger::Debugger;
use trapvm::word::Word;
use trapvm::{boot, kernel, logging};

#[derive(Parser)]
#[command(name = "trapvm")]
#[command(version)]
#[command(about = "A word-addressed virtual CPU with a kernel/user privilege model")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Boot a kernel image and run a user program until it halts
    Run {
        /// Boot image (.asm source or raw word image), loaded at address 0
        kernel: PathBuf,
        /// User program, passed to the boot image on the input device
        program: PathBuf,
        /// Machine configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Run the line debugger on stdin instead of running freely
        #[arg(long, conflicts_with = "tui")]
        debug: bool,
        /// Run the visual debugger
        #[arg(long)]
        tui: bool,
        /// Trace every step
        #[arg(short, long, conflicts_with = "tui")]
        trace: bool,
        /// Stop after this many steps
        #[arg(long)]
        max_steps: Option<u64>,
        /// Print the final machine state as JSON
        #[arg(long)]
        dump_state: bool,
    },
    /// Assemble source to a raw word image
    Asm {
        /// Path to the source file
        source: PathBuf,
        /// Output image (defaults to the source path with a .bin extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Disassemble an image to readable text
    Disasm {
        /// Path to the image (or .asm source)
        image: PathBuf,
        /// Address of the first word in the listing
        #[arg(long, default_value = "0")]
        origin: Word,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { kernel, program, config, debug, tui, trace, max_steps, dump_state } => {
            logging::init(trace);
            let opts = RunOptions { debug, tui, max_steps, dump_state };
            run_machine(&kernel, &program, config.as_deref(), opts);
        }
        Commands::Asm { source, output } => {
            logging::init(false);
            assemble_file(&source, output);
        }
        Commands::Disasm { image, origin } => {
            logging::init(false);
            disassemble_file(&image, origin);
        }
    }
}

struct RunOptions {
    debug: bool,
    tui: bool,
    max_steps: Option<u64>,
    dump_state: bool,
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("❌ {}", message);
    std::process::exit(1);
}

fn run_machine(kernel_path: &Path, program_path: &Path, config_path: Option<&Path>, opts: RunOptions) {
    let config = match config_path {
        Some(path) => MachineConfig::from_json_file(path)
            .unwrap_or_else(|e| fail(format!("Could not load config {}: {}", path.display(), e))),
        None => MachineConfig::default(),
    };

    let set = kernel::instruction_set();
    let kernel_image = load_image(kernel_path, &set)
        .unwrap_or_else(|e| fail(format!("Could not load kernel/bootloader: {}", e)));
    let program = load_image(program_path, &set)
        .unwrap_or_else(|e| fail(format!("Could not load program: {}", e)));

    if opts.tui {
        run_tui(config, kernel_image, program);
        return;
    }

    let mut cpu = boot::load(&config, &kernel_image, &program).unwrap_or_else(|e| fail(e));

    if opts.debug {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        if let Err(e) = Debugger::new().run(&mut cpu, stdin.lock(), &mut stdout) {
            fail(format!("Debugger error: {}", e));
        }
    } else {
        cpu.input.append_reader(std::io::stdin());
        let result = match opts.max_steps {
            Some(n) => cpu.run_limited(n),
            None => cpu.run(),
        };
        match result {
            Err(e) => println!("CPU entered a bad state: {}; halting...", e),
            Ok(steps) if !cpu.is_halted() => {
                eprintln!("⚠️  Stopped after {} steps without halting. Use --max-steps to increase.", steps);
            }
            Ok(_) => {}
        }
    }

    if opts.dump_state {
        match serde_json::to_string_pretty(&cpu.snapshot(false)) {
            Ok(json) => println!("{}", json),
            Err(e) => fail(format!("Could not serialize state: {}", e)),
        }
    }
}

#[cfg(feature = "tui")]
fn run_tui(config: MachineConfig, kernel_image: Vec<Word>, program: Vec<Word>) {
    if let Err(e) = trapvm::tui::run_debugger(config, kernel_image, program) {
        fail(format!("Debugger error: {}", e));
    }
}

#[cfg(not(feature = "tui"))]
fn run_tui(_config: MachineConfig, _kernel_image: Vec<Word>, _program: Vec<Word>) {
    fail("this build does not include the visual debugger (enable the `tui` feature)");
}

fn assemble_file(source_path: &Path, output: Option<PathBuf>) {
    let out_path = output.unwrap_or_else(|| source_path.with_extension("bin"));

    println!("📝 Assembling: {} → {}", source_path.display(), out_path.display());

    let source = std::fs::read_to_string(source_path)
        .unwrap_or_else(|e| fail(format!("Failed to read file: {}", e)));
    let words = assemble(&source, &kernel::instruction_set())
        .unwrap_or_else(|e| fail(format!("Assembly error: {}", e)));

    println!("✓ Assembled {} words", words.len());

    if let Err(e) = save_image(&out_path, &words) {
        fail(format!("Failed to save image: {}", e));
    }

    println!("✓ Saved to {}", out_path.display());
}

fn disassemble_file(image_path: &Path, origin: Word) {
    let set = kernel::instruction_set();
    let words = load_image(image_path, &set)
        .unwrap_or_else(|e| fail(format!("Failed to load image: {}", e)));

    println!("{}", disassemble(&words, origin, &set));
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_trace_conflicts_with_tui() {
        let err = Cli::try_parse_from(["trapvm", "run", "k.asm", "p.asm", "--trace", "--tui"])
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_trace_with_line_debugger() {
        let cli = Cli::try_parse_from(["trapvm", "run", "k.asm", "p.asm", "-t", "--debug"]).unwrap();
        assert!(matches!(cli.command, Commands::Run { trace: true, debug: true, tui: false, .. }));
    }
}
