//! Application layer for the `filesync` binary.

pub(crate) mod config_file;
pub(crate) mod exit_handler;
pub(crate) mod output;
pub(crate) mod progress_ui;
pub(crate) mod runtime;
pub(crate) mod terminal;
