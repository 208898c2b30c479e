//! Inbound voice-platform surface of the bridge.
//!
//! `POST /messages` accepts one voice request per utterance, routes it through
//! the [`BridgeController`], and answers with the single composed reply the
//! correlation engine hands back. `GET /status` exposes the engine snapshot.

pub mod progressive_response;
pub mod reply_composer;
pub mod voice_bridge;
pub mod voice_request;

pub use progressive_response::*;
pub use reply_composer::*;
pub use voice_bridge::*;
pub use voice_request::*;
