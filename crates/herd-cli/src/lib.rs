//! Command-line interface for herd.
//!
//! `parser` turns flags and environment into [`herd_core::Settings`];
//! `bootstrap` wires the runtime and proxy together; `handlers` runs the
//! subcommands.

#![deny(unsafe_code)]

pub mod bootstrap;
pub mod handlers;
pub mod parser;

pub use bootstrap::{HerdContext, bootstrap, init_tracing};
pub use parser::{Cli, Commands, SettingsArgs};
