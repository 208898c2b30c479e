//! Per-key correlation state machine.
//!
//! Each key is in exactly one of three states: absent, `AwaitingBot` (a
//! request is waiting, no bot output yet) or `AwaitingRequest` (bot output is
//! buffered, no request yet). Any operation that would make both halves exist
//! finalizes and removes the key in the same step, so the two never coexist.
//!
//! The table performs no I/O. Every operation returns [`TableEffect`]s that
//! the owning engine applies: dispatching replies, arming or cancelling
//! deadlines, and recording events.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use vox_core::Activity;

use crate::aggregation::{finalize, ComposedReply};
use crate::correlation_config::{AggregationMode, AggregationWindow, CorrelationConfig};
use crate::correlation_events::{CorrelationEvent, MissedReason};
use crate::responder::ReplyResponder;

#[derive(Debug)]
/// Synchronous side of one correlation key.
pub struct PendingRequest {
    pub responder: ReplyResponder,
    pub created_at: Instant,
}

#[derive(Debug)]
/// Bot output collected for a key whose request has not registered yet.
pub struct AggregationBuffer {
    pub parts: Vec<Activity>,
    pub generation: u64,
    pub opened_at: Instant,
}

#[derive(Debug)]
enum CorrelationSlot {
    AwaitingBot(PendingRequest),
    AwaitingRequest(AggregationBuffer),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `KeyState` values.
pub enum KeyState {
    Empty,
    AwaitingBot,
    AwaitingRequest,
}

#[derive(Debug)]
/// A finalized reply bound to the responder that must carry it.
pub struct Dispatch {
    pub key: String,
    pub responder: ReplyResponder,
    pub reply: ComposedReply,
    pub waited: Duration,
}

#[derive(Debug)]
/// Enumerates supported `TableEffect` values.
pub enum TableEffect {
    Dispatch(Dispatch),
    ArmDeadline {
        key: String,
        generation: u64,
        after: Duration,
    },
    CancelDeadline {
        key: String,
    },
    Event(CorrelationEvent),
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
/// Point-in-time counts of table occupancy.
pub struct TableOccupancy {
    pub pending_requests: usize,
    pub buffered_keys: usize,
}

#[derive(Debug)]
/// Public struct `CorrelationTable` used across vox-bridge components.
pub struct CorrelationTable {
    config: CorrelationConfig,
    slots: HashMap<String, CorrelationSlot>,
    next_generation: u64,
}

impl CorrelationTable {
    pub fn new(config: CorrelationConfig) -> Self {
        Self {
            config,
            slots: HashMap::new(),
            next_generation: 0,
        }
    }

    pub fn config(&self) -> &CorrelationConfig {
        &self.config
    }

    pub fn key_state(&self, key: &str) -> KeyState {
        match self.slots.get(key) {
            None => KeyState::Empty,
            Some(CorrelationSlot::AwaitingBot(_)) => KeyState::AwaitingBot,
            Some(CorrelationSlot::AwaitingRequest(_)) => KeyState::AwaitingRequest,
        }
    }

    pub fn occupancy(&self) -> TableOccupancy {
        let mut occupancy = TableOccupancy::default();
        for slot in self.slots.values() {
            match slot {
                CorrelationSlot::AwaitingBot(_) => occupancy.pending_requests += 1,
                CorrelationSlot::AwaitingRequest(_) => occupancy.buffered_keys += 1,
            }
        }
        occupancy
    }

    /// Registers the synchronous side for `key`, or finalizes at once when
    /// bot output is already buffered.
    pub fn register_pending_request(
        &mut self,
        key: &str,
        responder: ReplyResponder,
        now: Instant,
    ) -> Vec<TableEffect> {
        match self.slots.remove(key) {
            Some(CorrelationSlot::AwaitingRequest(buffer)) => {
                let reply = finalize(&buffer.parts, &self.config);
                vec![
                    TableEffect::CancelDeadline {
                        key: key.to_string(),
                    },
                    TableEffect::Dispatch(Dispatch {
                        key: key.to_string(),
                        responder,
                        reply,
                        waited: now.saturating_duration_since(buffer.opened_at),
                    }),
                ]
            }
            Some(CorrelationSlot::AwaitingBot(previous)) => {
                // Backend reply ids are unique; a repeat means the earlier
                // request can never be answered.
                self.slots.insert(
                    key.to_string(),
                    CorrelationSlot::AwaitingBot(PendingRequest {
                        responder,
                        created_at: now,
                    }),
                );
                drop(previous);
                vec![TableEffect::Event(CorrelationEvent::Missed {
                    key: key.to_string(),
                    reason: MissedReason::ResponderReplaced,
                    texts: Vec::new(),
                })]
            }
            None => {
                self.slots.insert(
                    key.to_string(),
                    CorrelationSlot::AwaitingBot(PendingRequest {
                        responder,
                        created_at: now,
                    }),
                );
                vec![TableEffect::Event(CorrelationEvent::Registered {
                    key: key.to_string(),
                })]
            }
        }
    }

    /// Accepts one bot activity already filtered to the bot's own replies.
    pub fn on_activity(&mut self, activity: Activity, now: Instant) -> Vec<TableEffect> {
        let key = activity.reply_to_id.clone();
        if key.trim().is_empty() {
            return vec![TableEffect::Event(CorrelationEvent::Missed {
                key,
                reason: MissedReason::Unaddressed,
                texts: vec![activity.text],
            })];
        }

        match self.slots.remove(&key) {
            Some(CorrelationSlot::AwaitingBot(pending)) => {
                let reply = finalize(std::slice::from_ref(&activity), &self.config);
                vec![TableEffect::Dispatch(Dispatch {
                    key,
                    responder: pending.responder,
                    reply,
                    waited: now.saturating_duration_since(pending.created_at),
                })]
            }
            Some(CorrelationSlot::AwaitingRequest(mut buffer)) => {
                let mut effects = Vec::new();
                match self.config.mode {
                    // Single-reply bots: the latest reply is the reply.
                    AggregationMode::Immediate => buffer.parts = vec![activity],
                    AggregationMode::Aggregating => {
                        let rearm = self.config.window == AggregationWindow::Sliding
                            && !activity.is_expecting_input();
                        buffer.parts.push(activity);
                        if rearm {
                            buffer.generation = self.allocate_generation();
                            effects.push(TableEffect::ArmDeadline {
                                key: key.clone(),
                                generation: buffer.generation,
                                after: self.config.aggregation_timeout,
                            });
                        }
                    }
                }
                effects.push(TableEffect::Event(CorrelationEvent::Buffered {
                    key: key.clone(),
                    parts: buffer.parts.len(),
                }));
                self.slots
                    .insert(key, CorrelationSlot::AwaitingRequest(buffer));
                effects
            }
            None => {
                // Armed in both modes; see `AggregationMode::Immediate`.
                let generation = self.allocate_generation();
                self.slots.insert(
                    key.clone(),
                    CorrelationSlot::AwaitingRequest(AggregationBuffer {
                        parts: vec![activity],
                        generation,
                        opened_at: now,
                    }),
                );
                vec![
                    TableEffect::ArmDeadline {
                        key: key.clone(),
                        generation,
                        after: self.config.aggregation_timeout,
                    },
                    TableEffect::Event(CorrelationEvent::Buffered { key, parts: 1 }),
                ]
            }
        }
    }

    /// Handles an expired deadline. Deadlines whose generation no longer
    /// matches the live buffer are stale and ignored, which makes a deadline
    /// racing a finalize harmless.
    pub fn on_deadline(&mut self, key: &str, generation: u64) -> Vec<TableEffect> {
        let live = matches!(
            self.slots.get(key),
            Some(CorrelationSlot::AwaitingRequest(buffer)) if buffer.generation == generation
        );
        if !live {
            return Vec::new();
        }
        let Some(CorrelationSlot::AwaitingRequest(buffer)) = self.slots.remove(key) else {
            return Vec::new();
        };
        vec![TableEffect::Event(CorrelationEvent::Missed {
            key: key.to_string(),
            reason: MissedReason::WindowExpired,
            texts: buffer.parts.into_iter().map(|part| part.text).collect(),
        })]
    }

    /// Drops the waiting request for `key` if it is still the one holding
    /// `ticket`.
    pub fn abandon(&mut self, key: &str, ticket: u64) -> Vec<TableEffect> {
        let owned = matches!(
            self.slots.get(key),
            Some(CorrelationSlot::AwaitingBot(pending)) if pending.responder.ticket() == ticket
        );
        if !owned {
            return Vec::new();
        }
        self.slots.remove(key);
        vec![TableEffect::Event(CorrelationEvent::Missed {
            key: key.to_string(),
            reason: MissedReason::ResponderAbandoned,
            texts: Vec::new(),
        })]
    }

    /// Empties the table, reporting every outstanding key.
    pub fn drain(&mut self) -> Vec<TableEffect> {
        let mut keys = self.slots.drain().collect::<Vec<_>>();
        keys.sort_by(|left, right| left.0.cmp(&right.0));
        keys.into_iter()
            .map(|(key, slot)| {
                let texts = match slot {
                    CorrelationSlot::AwaitingBot(_) => Vec::new(),
                    CorrelationSlot::AwaitingRequest(buffer) => {
                        buffer.parts.into_iter().map(|part| part.text).collect()
                    }
                };
                TableEffect::Event(CorrelationEvent::Missed {
                    key,
                    reason: MissedReason::EngineStopped,
                    texts,
                })
            })
            .collect()
    }

    fn allocate_generation(&mut self) -> u64 {
        self.next_generation = self.next_generation.saturating_add(1);
        self.next_generation
    }
}
