//! Domain types for the VStop signal engine

pub mod bar;
pub mod signal;

pub use bar::Bar;
pub use signal::{OptionSide, Signal};

/// Symbol type alias
pub type Symbol = String;
