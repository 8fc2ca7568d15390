//! Terminal front end for a lead chat session.
//!
//! Reads the lead form and chat commands from stdin and prints session
//! events as plain text lines. The binary in `bin/terminal.rs` wires these
//! pieces to a running session.

pub mod capture;
pub mod config;
pub mod input;
pub mod render;
