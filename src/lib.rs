//! Nimbus - command-line client for the Nimbus compute platform
//!
//! Every verb is a [`lifecycle::Command`]: it describes its arguments with a
//! [`descriptor::Descriptor`], gets attached to the command tree by the
//! [`registrar`], and runs through pre-run, run and render. Long-running API
//! calls go through the [`waiter`], output goes through the [`output`]
//! renderer.
//!
//! ```text
//! argv ─► tree dispatch ─► flag binding ─► pre_run ─► run ─► render ─► stdout
//!                                                      │
//!                                                      └─► waiter ─► SDK
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod lifecycle;
pub mod output;
pub mod prompt;
pub mod registrar;
pub mod sdk;
pub mod sshkey;
pub mod state;
pub mod waiter;
pub mod zones;

mod words;

#[cfg(test)]
pub(crate) mod testing;

pub use error::CliError;
pub use lifecycle::Command;
pub use output::{List, Output, OutputFormat};
pub use state::{Context, GlobalState};
