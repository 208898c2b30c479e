//! Foundational types shared across vox-bridge crates.
//!
//! Provides the canonical bot `Activity` record consumed by the correlation
//! engine and the identity hasher that keeps raw voice-platform user ids out
//! of the bot backend.

pub mod activity;
pub mod identity_hash;

pub use activity::*;
pub use identity_hash::*;
