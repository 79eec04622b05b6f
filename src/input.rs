//! Operator key input for the main loop.
//!
//! The terminal is put in raw mode so single key presses arrive without
//! Enter; keys are polled without blocking once per main loop tick.

use crate::gui::GuiError;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use log::warn;
use std::time::Duration;

/// What the operator asked for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatorCommand {
    /// Move the stage by this much, in millimeters.
    Jog { dx: f64, dy: f64 },
    /// Switch automatic re-centering on or off.
    ToggleTracking,
    /// Log a status line now.
    PrintStatus,
    /// Stop the rig.
    Quit,
}

/// Maps one key press to a command. Arrow keys jog by `jog_step`.
pub fn command_for(key: &KeyEvent, jog_step: f64) -> Option<OperatorCommand> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    let jog = |dx, dy| Some(OperatorCommand::Jog { dx, dy });
    match key.code {
        KeyCode::Left => jog(-jog_step, 0.0),
        KeyCode::Right => jog(jog_step, 0.0),
        KeyCode::Up => jog(0.0, jog_step),
        KeyCode::Down => jog(0.0, -jog_step),
        KeyCode::Char('t') => Some(OperatorCommand::ToggleTracking),
        KeyCode::Char('s') => Some(OperatorCommand::PrintStatus),
        KeyCode::Char('q') | KeyCode::Esc => Some(OperatorCommand::Quit),
        _ => None,
    }
}

/// Keys from the controlling terminal. Raw mode lasts as long as this does.
#[derive(Debug)]
pub struct TerminalKeys {
    jog_step: f64,
}

impl TerminalKeys {
    /// Puts the terminal in raw mode.
    pub fn open(jog_step: f64) -> Result<Self, GuiError> {
        enable_raw_mode()?;
        Ok(Self { jog_step })
    }

    /// Every command typed since the last poll. Never blocks.
    pub fn poll(&mut self) -> Result<Vec<OperatorCommand>, GuiError> {
        let mut commands = Vec::new();
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                commands.extend(command_for(&key, self.jog_step));
            }
        }
        Ok(commands)
    }
}

impl Drop for TerminalKeys {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            warn!("Failed to restore the terminal: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn arrows_jog_by_the_step() {
        assert_eq!(
            command_for(&press(KeyCode::Left), 2.0),
            Some(OperatorCommand::Jog { dx: -2.0, dy: 0.0 })
        );
        assert_eq!(
            command_for(&press(KeyCode::Up), 2.0),
            Some(OperatorCommand::Jog { dx: 0.0, dy: 2.0 })
        );
    }

    #[test]
    fn letters_and_escape() {
        assert_eq!(
            command_for(&press(KeyCode::Char('t')), 1.0),
            Some(OperatorCommand::ToggleTracking)
        );
        assert_eq!(
            command_for(&press(KeyCode::Char('s')), 1.0),
            Some(OperatorCommand::PrintStatus)
        );
        assert_eq!(command_for(&press(KeyCode::Esc), 1.0), Some(OperatorCommand::Quit));
        assert_eq!(command_for(&press(KeyCode::Char('x')), 1.0), None);
    }

    #[test]
    fn releases_are_ignored() {
        let mut key = press(KeyCode::Char('q'));
        key.kind = KeyEventKind::Release;
        assert_eq!(command_for(&key, 1.0), None);
    }
}
