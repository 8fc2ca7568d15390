//! Webhook Stub Library Crate
//!
//! A local stand-in for the chat webhook. It accepts the payloads a chat
//! session posts (text, audio, lead registration), answers with canned
//! replies and keeps everything it received for inspection. The binary in
//! `bin/webhook_stub.rs` is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
