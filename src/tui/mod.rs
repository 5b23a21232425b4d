//! Visual debugger.
//!
//! Provides an interactive terminal-based debugger with:
//! - Disassembly around the instruction pointer with breakpoint markers
//! - Registers, privilege mode and timer counter
//! - Memory view and guest console output
//! - Step/run/breakpoint/input controls

mod app;
mod ui;

pub use app::DebuggerApp;

use crate::boot::BootError;
use crate::config::MachineConfig;
use crate::word::Word;
use std::io;
use thiserror::Error;

/// Errors that can end a debugging session.
#[derive(Debug, Error)]
pub enum TuiError {
    #[error(transparent)]
    Boot(#[from] BootError),

    #[error("terminal error: {0}")]
    Terminal(#[from] io::Error),
}

/// Boot a machine and run the visual debugger until the user quits.
pub fn run_debugger(config: MachineConfig, kernel_image: Vec<Word>, program: Vec<Word>) -> Result<(), TuiError> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    let mut app = DebuggerApp::new(config, kernel_image, program)?;

    // Setup terminal
    enable_raw_mode()?;
    let _restore = RestoreOnDrop(|| {
        let _ = disable_raw_mode();
        let _ = stdout().execute(LeaveAlternateScreen);
    });
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Main loop
    while !app.should_quit {
        terminal.draw(|frame| ui::draw(frame, &app))?;

        if event::poll(Duration::from_millis(30))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if app.input_line.is_some() {
                        match key.code {
                            KeyCode::Enter => app.submit_input(),
                            KeyCode::Esc => {
                                app.input_line = None;
                                app.status = "Input cancelled.".into();
                            }
                            KeyCode::Backspace => {
                                if let Some(line) = app.input_line.as_mut() {
                                    line.pop();
                                }
                            }
                            KeyCode::Char(c) => {
                                if let Some(line) = app.input_line.as_mut() {
                                    line.push(c);
                                }
                            }
                            _ => {}
                        }
                        continue;
                    }

                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('i') => app.begin_input(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Up => app.mem_scroll = app.mem_scroll.saturating_sub(1),
                        KeyCode::Down => {
                            if app.mem_scroll + 1 < app.cpu.mem.len() {
                                app.mem_scroll += 1;
                            }
                        }
                        KeyCode::PageUp => app.mem_scroll = app.mem_scroll.saturating_sub(16),
                        KeyCode::PageDown => {
                            app.mem_scroll = (app.mem_scroll + 16).min(app.cpu.mem.len().saturating_sub(1));
                        }
                        _ => {}
                    }
                }
            }
        }

        if app.running {
            app.tick();
        }
    }

    Ok(())
}

/// Runs its closure when dropped, so an early `?` still restores the terminal.
struct RestoreOnDrop<F: FnMut()>(F);

impl<F: FnMut()> Drop for RestoreOnDrop<F> {
    fn drop(&mut self) {
        (self.0)();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fails_midway(restored: &Cell<bool>) -> Result<(), io::Error> {
        let _restore = RestoreOnDrop(|| restored.set(true));
        let draw: io::Result<()> = Err(io::Error::new(io::ErrorKind::Other, "draw failed"));
        draw?;
        Ok(())
    }

    #[test]
    fn test_restore_runs_on_early_return() {
        let restored = Cell::new(false);
        assert!(fails_midway(&restored).is_err());
        assert!(restored.get());
    }

    #[test]
    fn test_restore_runs_on_normal_exit() {
        let restored = Cell::new(false);
        {
            let _restore = RestoreOnDrop(|| restored.set(true));
            assert!(!restored.get());
        }
        assert!(restored.get());
    }
}
