//! Table-owning actor and the handle used to drive it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use vox_core::Activity;

use crate::correlation_config::{AggregationMode, CorrelationConfig};
use crate::correlation_events::{CorrelationEvent, CorrelationEventSink, MissedReason};
use crate::correlation_table::{CorrelationTable, Dispatch, TableEffect};
use crate::responder::ReplyResponder;


#[derive(Debug, Error, PartialEq, Eq)]
/// Enumerates supported `CorrelationError` values.
pub enum CorrelationError {
    #[error("correlation engine is stopped")]
    EngineStopped,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Public struct `CorrelationSnapshot` used across vox-bridge components.
pub struct CorrelationSnapshot {
    pub aggregation_mode: String,
    pub pending_requests: usize,
    pub buffered_keys: usize,
    pub armed_deadlines: usize,
    pub dispatched_total: u64,
    pub missed_total: u64,
}

enum CorrelationCommand {
    Register {
        key: String,
        responder: ReplyResponder,
    },
    Activity(Activity),
    Deadline {
        key: String,
        generation: u64,
    },
    Abandon {
        key: String,
        ticket: u64,
    },
    Snapshot(oneshot::Sender<CorrelationSnapshot>),
    Shutdown,
}

/// Spawns the correlation actor.
pub struct CorrelationEngine;

impl CorrelationEngine {
    /// Starts the actor on the current tokio runtime. The engine lives until
    /// [`CorrelationHandle::shutdown`] is called or every handle is dropped.
    pub fn spawn(
        config: CorrelationConfig,
        sink: Arc<dyn CorrelationEventSink>,
    ) -> CorrelationHandle {
        let mode = config.mode;
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = CorrelationActor {
            table: CorrelationTable::new(config),
            sink,
            deadlines: HashMap::new(),
            timer_tx: tx.downgrade(),
            dispatched_total: 0,
            missed_total: 0,
        };
        let task = tokio::spawn(actor.run(rx));
        CorrelationHandle {
            tx,
            mode,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }
}

#[derive(Clone)]
/// Cloneable entry point into the correlation actor.
pub struct CorrelationHandle {
    tx: mpsc::UnboundedSender<CorrelationCommand>,
    mode: AggregationMode,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl CorrelationHandle {
    pub fn mode(&self) -> AggregationMode {
        self.mode
    }

    pub fn register_pending_request(
        &self,
        key: impl Into<String>,
        responder: ReplyResponder,
    ) -> Result<(), CorrelationError> {
        self.send(CorrelationCommand::Register {
            key: key.into(),
            responder,
        })
    }

    pub fn on_activity(&self, activity: Activity) -> Result<(), CorrelationError> {
        self.send(CorrelationCommand::Activity(activity))
    }

    /// Gives up on the request holding `ticket` under `key`. No-op when the
    /// key was already finalized or re-registered.
    pub fn abandon(&self, key: impl Into<String>, ticket: u64) -> Result<(), CorrelationError> {
        self.send(CorrelationCommand::Abandon {
            key: key.into(),
            ticket,
        })
    }

    pub async fn snapshot(&self) -> Result<CorrelationSnapshot, CorrelationError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(CorrelationCommand::Snapshot(reply_tx))?;
        reply_rx.await.map_err(|_| CorrelationError::EngineStopped)
    }

    /// Stops the actor, reporting outstanding keys and aborting deadlines.
    pub async fn shutdown(&self) {
        let _ = self.send(CorrelationCommand::Shutdown);
        let task = self.task.lock().ok().and_then(|mut guard| guard.take());
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    fn send(&self, command: CorrelationCommand) -> Result<(), CorrelationError> {
        self.tx
            .send(command)
            .map_err(|_| CorrelationError::EngineStopped)
    }
}

struct CorrelationActor {
    table: CorrelationTable,
    sink: Arc<dyn CorrelationEventSink>,
    deadlines: HashMap<String, (u64, AbortHandle)>,
    timer_tx: mpsc::WeakUnboundedSender<CorrelationCommand>,
    dispatched_total: u64,
    missed_total: u64,
}

impl CorrelationActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<CorrelationCommand>) {
        while let Some(command) = rx.recv().await {
            let effects = match command {
                CorrelationCommand::Register { key, responder } => {
                    self.table
                        .register_pending_request(&key, responder, Instant::now())
                }
                CorrelationCommand::Activity(activity) => {
                    self.table.on_activity(activity, Instant::now())
                }
                CorrelationCommand::Deadline { key, generation } => {
                    if matches!(self.deadlines.get(&key), Some((armed, _)) if *armed == generation)
                    {
                        self.deadlines.remove(&key);
                    }
                    self.table.on_deadline(&key, generation)
                }
                CorrelationCommand::Abandon { key, ticket } => self.table.abandon(&key, ticket),
                CorrelationCommand::Snapshot(reply_tx) => {
                    let _ = reply_tx.send(self.snapshot());
                    continue;
                }
                CorrelationCommand::Shutdown => break,
            };
            self.apply(effects);
        }

        let remaining = self.table.drain();
        self.apply(remaining);
        for (_, (_, deadline)) in self.deadlines.drain() {
            deadline.abort();
        }
        tracing::debug!(
            dispatched_total = self.dispatched_total,
            missed_total = self.missed_total,
            "correlation engine stopped"
        );
    }

    fn apply(&mut self, effects: Vec<TableEffect>) {
        for effect in effects {
            match effect {
                TableEffect::Dispatch(dispatch) => self.dispatch(dispatch),
                TableEffect::ArmDeadline {
                    key,
                    generation,
                    after,
                } => self.arm_deadline(key, generation, after),
                TableEffect::CancelDeadline { key } => self.cancel_deadline(&key),
                TableEffect::Event(event) => self.record(event),
            }
        }
    }

    fn dispatch(&mut self, dispatch: Dispatch) {
        let Dispatch {
            key,
            responder,
            reply,
            waited,
        } = dispatch;
        self.cancel_deadline(&key);
        let parts = reply.parts;
        match responder.dispatch(reply) {
            Ok(()) => {
                self.dispatched_total = self.dispatched_total.saturating_add(1);
                self.record(CorrelationEvent::Dispatched {
                    key,
                    parts,
                    waited_ms: u64::try_from(waited.as_millis()).unwrap_or(u64::MAX),
                });
            }
            Err(_) => self.record(CorrelationEvent::Missed {
                key,
                reason: MissedReason::ReceiverGone,
                texts: Vec::new(),
            }),
        }
    }

    fn arm_deadline(&mut self, key: String, generation: u64, after: std::time::Duration) {
        let timer_tx = self.timer_tx.clone();
        let deadline_key = key.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(tx) = timer_tx.upgrade() {
                let _ = tx.send(CorrelationCommand::Deadline {
                    key: deadline_key,
                    generation,
                });
            }
        });
        if let Some((_, previous)) = self.deadlines.insert(key, (generation, task.abort_handle())) {
            previous.abort();
        }
    }

    fn cancel_deadline(&mut self, key: &str) {
        if let Some((_, deadline)) = self.deadlines.remove(key) {
            deadline.abort();
        }
    }

    fn record(&mut self, event: CorrelationEvent) {
        if event.is_missed() {
            self.missed_total = self.missed_total.saturating_add(1);
        }
        self.sink.record(&event);
    }

    fn snapshot(&self) -> CorrelationSnapshot {
        let occupancy = self.table.occupancy();
        CorrelationSnapshot {
            aggregation_mode: self.table.config().mode.as_str().to_string(),
            pending_requests: occupancy.pending_requests,
            buffered_keys: occupancy.buffered_keys,
            armed_deadlines: self.deadlines.len(),
            dispatched_total: self.dispatched_total,
            missed_total: self.missed_total,
        }
    }
}
