//! Observability events emitted by the correlation engine.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `MissedReason` values.
pub enum MissedReason {
    /// Aggregation deadline fired with no request registered for the key.
    WindowExpired,
    /// The waiting request gave up before the bot replied.
    ResponderAbandoned,
    /// A second request registered under a key that already had one.
    ResponderReplaced,
    /// Reply was finalized but the HTTP side was already gone.
    ReceiverGone,
    /// Activity carried no correlation key.
    Unaddressed,
    /// Engine stopped with state still outstanding.
    EngineStopped,
}

impl MissedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WindowExpired => "window_expired",
            Self::ResponderAbandoned => "responder_abandoned",
            Self::ResponderReplaced => "responder_replaced",
            Self::ReceiverGone => "receiver_gone",
            Self::Unaddressed => "unaddressed",
            Self::EngineStopped => "engine_stopped",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
/// Enumerates supported `CorrelationEvent` values.
pub enum CorrelationEvent {
    Registered {
        key: String,
    },
    Buffered {
        key: String,
        parts: usize,
    },
    Dispatched {
        key: String,
        parts: usize,
        waited_ms: u64,
    },
    Missed {
        key: String,
        reason: MissedReason,
        texts: Vec<String>,
    },
}

impl CorrelationEvent {
    pub fn key(&self) -> &str {
        match self {
            Self::Registered { key }
            | Self::Buffered { key, .. }
            | Self::Dispatched { key, .. }
            | Self::Missed { key, .. } => key,
        }
    }

    pub fn is_missed(&self) -> bool {
        matches!(self, Self::Missed { .. })
    }
}

/// Trait contract for `CorrelationEventSink` behavior.
pub trait CorrelationEventSink: Send + Sync {
    fn record(&self, event: &CorrelationEvent);
}

#[derive(Clone, Copy, Default)]
/// Writes correlation events to the `tracing` pipeline.
pub struct TracingEventSink;

impl CorrelationEventSink for TracingEventSink {
    fn record(&self, event: &CorrelationEvent) {
        match event {
            CorrelationEvent::Registered { key } => {
                tracing::debug!(key = %key, "pending request registered");
            }
            CorrelationEvent::Buffered { key, parts } => {
                tracing::debug!(key = %key, parts, "bot activity buffered");
            }
            CorrelationEvent::Dispatched {
                key,
                parts,
                waited_ms,
            } => {
                tracing::info!(
                    key = %key,
                    parts,
                    bridge_response_ms = waited_ms,
                    "bridge reply dispatched"
                );
            }
            CorrelationEvent::Missed { key, reason, texts } => {
                tracing::warn!(
                    key = %key,
                    reason = reason.as_str(),
                    text = %texts.join(" | "),
                    "missed message"
                );
            }
        }
    }
}

#[derive(Default)]
/// Keeps every recorded event in memory; used by tests and status probes.
pub struct MemoryEventSink {
    events: Mutex<Vec<CorrelationEvent>>,
}

impl MemoryEventSink {
    pub fn events(&self) -> Vec<CorrelationEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn missed(&self) -> Vec<CorrelationEvent> {
        self.events()
            .into_iter()
            .filter(CorrelationEvent::is_missed)
            .collect()
    }

    pub fn dispatched_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, CorrelationEvent::Dispatched { .. }))
            .count()
    }
}

impl CorrelationEventSink for MemoryEventSink {
    fn record(&self, event: &CorrelationEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
