//! Interactive terminal screens.

mod error;
mod port_selector;

pub use error::GuiError;
pub use port_selector::port_selector;
