//! Bot backend plumbing for the voice bridge.
//!
//! Provides the [`BotBackend`] capability used to submit user utterances, a
//! Direct Line REST/WebSocket implementation of it, and the activity stream
//! adapter that turns raw bot events into correlation-ready [`vox_core::Activity`]
//! records.

pub mod activity_stream;
pub mod directline_client;
pub mod directline_types;

pub use activity_stream::*;
pub use directline_client::*;
pub use directline_types::*;
