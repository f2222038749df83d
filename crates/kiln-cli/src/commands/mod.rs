//! Command implementations

pub(crate) mod common;
pub(crate) mod progress;
pub(crate) mod run;
pub(crate) mod state;
