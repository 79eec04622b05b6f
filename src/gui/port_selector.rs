//! Picking the stage controller's serial port from a list.

use std::{
    io::stdout,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::gui::error::GuiError;

use crossterm::{
    event::{self, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListState, Paragraph},
    Terminal,
};

/// What a key press does to the selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Move(isize),
    Choose,
    Quit,
}

fn action_for(code: KeyCode) -> Option<Action> {
    match code {
        KeyCode::Down | KeyCode::Char('j') => Some(Action::Move(1)),
        KeyCode::Up | KeyCode::Char('k') => Some(Action::Move(-1)),
        KeyCode::Enter => Some(Action::Choose),
        KeyCode::Char('q') | KeyCode::Esc => Some(Action::Quit),
        _ => None,
    }
}

fn wrap(cursor: usize, step: isize, len: usize) -> usize {
    (cursor as isize + step).rem_euclid(len as isize) as usize
}

/// Asks the operator which serial port the stage controller is on. Returns
/// `None` if they quit without choosing.
pub fn port_selector(mut available_ports: Vec<PathBuf>) -> Result<Option<PathBuf>, GuiError> {
    if available_ports.is_empty() {
        return Err(GuiError::NoPorts);
    }

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let res = run_selector(&available_ports);
    // Put the terminal back even if drawing failed.
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(res?.map(|i| available_ports.swap_remove(i)))
}

// One list row: a 1-based number the operator can read back, then the path.
fn row_label(index: usize, port: &Path) -> String {
    format!("{:>2}  {}", index + 1, port.display())
}

// The line under the list: where the cursor is and which keys do what.
fn status_line(ports: &[PathBuf], cursor: usize) -> String {
    format!(
        "port {} of {}: {}   up/down move, enter connects, q cancels",
        cursor + 1,
        ports.len(),
        ports[cursor].display()
    )
}

fn run_selector(ports: &[PathBuf]) -> Result<Option<usize>, GuiError> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let rows: Vec<String> = ports
        .iter()
        .enumerate()
        .map(|(i, p)| row_label(i, p))
        .collect();
    let mut cursor = 0;
    let mut list_state = ListState::default();
    loop {
        list_state.select(Some(cursor));
        let list = List::new(rows.iter().map(String::as_str))
            .block(
                Block::default()
                    .borders(Borders::TOP | Borders::BOTTOM)
                    .title(" which port is the stage on? ".bold()),
            )
            .highlight_symbol("▶ ")
            .highlight_style(Style::default().fg(Color::Black).bg(Color::Cyan));
        let status = Paragraph::new(status_line(ports, cursor)).style(Style::default().fg(Color::Cyan));

        terminal.draw(|frame| {
            let parts = Layout::vertical([Constraint::Min(3), Constraint::Length(1)]).split(frame.size());
            frame.render_stateful_widget(list, parts[0], &mut list_state);
            frame.render_widget(status, parts[1]);
        })?;

        if !event::poll(Duration::from_millis(16))? {
            continue;
        }
        let event::Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match action_for(key.code) {
            Some(Action::Move(step)) => cursor = wrap(cursor, step, ports.len()),
            Some(Action::Choose) => return Ok(Some(cursor)),
            Some(Action::Quit) => return Ok(None),
            None => {}
        }
    }
}
