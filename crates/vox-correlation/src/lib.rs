//! Correlation and aggregation engine for the voice bridge.
//!
//! Binds each synchronous voice request to the asynchronous bot replies meant
//! for it. A single actor task owns the [`CorrelationTable`]; HTTP handlers
//! and the bot activity stream talk to it through a cloneable
//! [`CorrelationHandle`], so operations on one correlation key are serialised
//! while different keys never contend on a lock.
//!
//! ```rust
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use std::time::Duration;
//! use vox_core::Activity;
//! use vox_correlation::{reply_channel, CorrelationConfig, CorrelationEngine, TracingEventSink};
//!
//! let engine = CorrelationEngine::spawn(CorrelationConfig::default(), Arc::new(TracingEventSink));
//! engine.on_activity(Activity::reply("reply-1", "bot", "Hello"))?;
//! let (responder, receiver) = reply_channel();
//! engine.register_pending_request("reply-1", responder)?;
//! let reply = receiver.wait(Duration::from_secs(1)).await?;
//! assert_eq!(reply.text, "Hello.  ");
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod aggregation;
pub mod correlation_config;
pub mod correlation_engine;
pub mod correlation_events;
pub mod correlation_table;
pub mod responder;

pub use aggregation::*;
pub use correlation_config::*;
pub use correlation_engine::*;
pub use correlation_events::*;
pub use correlation_table::*;
pub use responder::*;
