//! UI rendering for the debugger.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, List, ListItem, Wrap},
    style::{Color, Style, Modifier},
};
use crate::cpu::registers::REGISTER_COUNT;
use crate::word::{Hex, Word};
use super::app::DebuggerApp;

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(55),
            Constraint::Percentage(45),
        ])
        .split(frame.area());

    // Left side: code, registers and status
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(9),
            Constraint::Length(3),
        ])
        .split(chunks[0]);

    draw_disassembly(frame, left_chunks[0], app);
    draw_registers(frame, left_chunks[1], app);
    draw_status(frame, left_chunks[2], app);

    // Right side: memory, console and help
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),
            Constraint::Length(8),
            Constraint::Length(4),
        ])
        .split(chunks[1]);

    draw_memory(frame, right_chunks[0], app);
    draw_console(frame, right_chunks[1], app);
    draw_help(frame, right_chunks[2]);
}

/// Draw disassembly around the instruction pointer.
fn draw_disassembly(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let disasm = app.get_disassembly((area.height as usize).saturating_sub(2));

    let items: Vec<ListItem> = disasm
        .iter()
        .map(|(addr, instr, is_current)| {
            let prefix = if *is_current { "▶ " } else { "  " };
            let bp = if app.breakpoints.contains(addr) { "●" } else { " " };
            let text = format!("{}{}: {}", prefix, Hex(*addr), instr);

            let style = if *is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if app.breakpoints.contains(addr) {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };

            ListItem::new(format!("{} {}", bp, text)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Disassembly ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)));

    frame.render_widget(list, area);
}

/// Draw registers and kernel state.
fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let cpu = &app.cpu;
    let reg = |i: usize| {
        let style = if i == 7 { Style::default().fg(Color::Yellow) } else { Style::default().fg(Color::White) };
        vec![
            Span::raw(format!("r{}: ", i)),
            Span::styled(format!("{}", Hex(cpu.regs.get(i))), style),
            Span::raw("   "),
        ]
    };

    let half = REGISTER_COUNT / 2;
    let mut content: Vec<Line> = (0..half)
        .map(|i| Line::from([reg(i), reg(i + half)].concat()))
        .collect();

    let (mode, mode_style) = if cpu.kernel_mode() {
        ("KERNEL", Style::default().fg(Color::Magenta))
    } else {
        ("USER", Style::default().fg(Color::Green))
    };
    content.push(Line::from(vec![
        Span::raw("Mode: "),
        Span::styled(mode, mode_style),
        Span::raw(format!("   Timer: {}/{}", cpu.kernel.counter, cpu.kernel.timer_threshold)),
        Span::raw("   Cycles: "),
        Span::styled(format!("{}", cpu.cycles), Style::default().fg(Color::Cyan)),
    ]));
    content.push(Line::from(vec![
        Span::raw("State: "),
        if cpu.is_halted() {
            Span::styled("Halted", Style::default().fg(Color::Red))
        } else {
            Span::styled("Running", Style::default().fg(Color::Green))
        },
        Span::raw(match &cpu.kernel.vector {
            Some(v) => format!("   Vector: {}", v),
            None => "   Vector: unset".to_string(),
        }),
    ]));
    let (consumed, written) = app.io_counts();
    content.push(Line::from(vec![
        Span::raw(format!("I/O: {} in / {} out", consumed, written)),
        Span::raw("   Last trap: "),
        match app.last_trap {
            Some(reason) => Span::styled(reason.to_string(), Style::default().fg(Color::Magenta)),
            None => Span::styled("none", Style::default().fg(Color::DarkGray)),
        },
    ]));

    let paragraph = Paragraph::new(content)
        .block(Block::default()
            .title(" Registers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)));

    frame.render_widget(paragraph, area);
}

/// Draw memory view.
fn draw_memory(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let visible_rows = (area.height as usize).saturating_sub(2);
    let iptr = app.cpu.regs.iptr();

    let items: Vec<ListItem> = app
        .cpu
        .mem
        .dump(app.mem_scroll, visible_rows)
        .into_iter()
        .map(|(idx, value)| {
            let addr = idx as Word;
            let region = if app.cpu.kernel.in_user_region(addr) { 'u' } else { 'k' };
            let text = format!("{} {}: {} = {}", region, Hex(addr), Hex(value), value);

            let style = if addr == iptr {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if value != 0 {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::DarkGray)
            };

            ListItem::new(text).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Memory ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)));

    frame.render_widget(list, area);
}

/// Draw guest output, plus the input line while typing.
fn draw_console(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let mut text = app.console.text();
    if let Some(line) = &app.input_line {
        text.push_str(&format!("\n> {}_", line));
    }
    // keep the tail visible
    let rows = (area.height as usize).saturating_sub(2);
    let skip = text.lines().count().saturating_sub(rows);
    let tail: Vec<Line> = text.lines().skip(skip).map(|l| Line::from(l.to_string())).collect();

    let console = Paragraph::new(tail)
        .wrap(Wrap { trim: false })
        .block(Block::default()
            .title(" Console ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue)));

    frame.render_widget(console, area);
}

/// Draw status bar.
fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let status = Paragraph::new(app.status.clone())
        .style(Style::default().fg(Color::White))
        .block(Block::default()
            .title(" Status ")
            .borders(Borders::ALL));

    frame.render_widget(status, area);
}

/// Draw help panel.
fn draw_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(vec![
        Line::from("s: Step  r: Run  p: Pause  b: Breakpoint  i: Input"),
        Line::from("x: Reset  ↑↓/PgUp/PgDn: Scroll memory  q: Quit"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default()
        .title(" Help ")
        .borders(Borders::ALL));

    frame.render_widget(help, area);
}
