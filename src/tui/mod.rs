//! Terminal chat interface.

mod input;
mod runner;
mod state;
mod terminal;
mod ui;

pub use runner::run_session;
