//! One-shot reply handles binding a waiting HTTP request to its eventual reply.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::aggregation::ComposedReply;

static NEXT_RESPONDER_TICKET: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Error, PartialEq, Eq)]
/// Enumerates supported `ReplyError` values.
pub enum ReplyError {
    #[error("reply receiver for ticket {ticket} was dropped before dispatch")]
    ReceiverDropped { ticket: u64 },
}

#[derive(Debug, Error, PartialEq, Eq)]
/// Enumerates supported `ReplyWaitError` values.
pub enum ReplyWaitError {
    #[error("no reply within {waited_ms}ms")]
    TimedOut { waited_ms: u64 },
    #[error("responder dropped without a reply")]
    ResponderDropped,
}

/// Sending half: completes exactly one reply. Dispatch consumes the handle,
/// so a second write for the same request cannot be expressed.
#[derive(Debug)]
pub struct ReplyResponder {
    ticket: u64,
    sender: oneshot::Sender<ComposedReply>,
}

/// Receiving half held by the HTTP handler.
#[derive(Debug)]
pub struct ReplyReceiver {
    ticket: u64,
    receiver: oneshot::Receiver<ComposedReply>,
}

/// Creates a linked responder/receiver pair sharing a fresh ticket.
pub fn reply_channel() -> (ReplyResponder, ReplyReceiver) {
    let ticket = NEXT_RESPONDER_TICKET.fetch_add(1, Ordering::Relaxed);
    let (sender, receiver) = oneshot::channel();
    (
        ReplyResponder { ticket, sender },
        ReplyReceiver { ticket, receiver },
    )
}

impl ReplyResponder {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub fn dispatch(self, reply: ComposedReply) -> Result<(), ReplyError> {
        let ticket = self.ticket;
        self.sender
            .send(reply)
            .map_err(|_| ReplyError::ReceiverDropped { ticket })
    }
}

impl ReplyReceiver {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Waits up to `timeout` for the reply.
    pub async fn wait(self, timeout: Duration) -> Result<ComposedReply, ReplyWaitError> {
        self.wait_until(Instant::now() + timeout).await
    }

    /// Waits for the reply until the absolute `deadline`.
    pub async fn wait_until(self, deadline: Instant) -> Result<ComposedReply, ReplyWaitError> {
        let started = Instant::now();
        match tokio::time::timeout_at(deadline, self.receiver).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(ReplyWaitError::ResponderDropped),
            Err(_) => Err(ReplyWaitError::TimedOut {
                waited_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}
