use std::{error::Error, fmt::Display};

/// Terminal interface failures.
#[derive(Debug)]
pub enum GuiError {
    /// Drawing to or reading from the terminal failed.
    IOError(std::io::Error),
    /// There was nothing to choose from.
    NoPorts,
}

impl Display for GuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuiError::IOError(e) => write!(f, "terminal io error: {}", e),
            GuiError::NoPorts => write!(f, "no serial ports found"),
        }
    }
}

impl Error for GuiError {}

impl From<std::io::Error> for GuiError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}
