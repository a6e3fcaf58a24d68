//! Relay core contracts and value types.
//!
//! This crate exposes the data structures exchanged between the webhook
//! surface, the dialogue client, and the outbound sender: the inbound event
//! model, the normalized-utterance extraction, the dialogue trace model, and
//! small utilities for platform text limits and retry with backoff.

pub mod event;
pub mod normalize;
pub mod retry;
pub mod text;
pub mod trace;

pub use event::*;
pub use normalize::*;
pub use retry::*;
pub use text::*;
pub use trace::*;
