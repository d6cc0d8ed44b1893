//! Inkboard command line client.
//!
//! `replay` renders a stored event log offline; `join` connects to a live
//! board over STOMP, follows it and saves what it saw.

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands};
