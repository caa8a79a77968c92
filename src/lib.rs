//! Interactive terminal search over a LaunchBox-style game catalog.
//!
//! The binary loads a catalog into an immutable in-memory corpus, then runs
//! a raw-terminal session: keystrokes become [`command::Command`]s on a
//! [`bus::CommandBus`], a background worker re-scores the corpus as the
//! query changes, and a dispatcher thread folds both streams into the
//! rendered viewport. The selected record's corpus position is the process
//! exit status.

pub mod app;
pub mod bus;
pub mod catalog;
pub mod command;
pub mod display;
pub mod engine;
pub mod input;
