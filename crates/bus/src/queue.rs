// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable work queue with manual acknowledgement.
//!
//! Consumers run with prefetch 1: a consumer cannot receive a second message
//! until it settles the first. Settling is explicit (`ack` / `nack`); a
//! delivery dropped without settling is nacked with requeue so a crashing
//! worker never strands its message.

use crate::log::{MessageLog, StoredMessage};
use crate::BusError;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::warn;

struct QueueState {
    log: MessageLog,
    pending: VecDeque<StoredMessage>,
    in_flight: HashMap<String, StoredMessage>,
}

impl QueueState {
    fn maybe_compact(&mut self) {
        if !self.log.needs_compaction() {
            return;
        }
        // In-flight messages are older than anything pending; keep them first
        // so a post-crash replay preserves rough delivery order.
        let live: Vec<StoredMessage> = self
            .in_flight
            .values()
            .cloned()
            .chain(self.pending.iter().cloned())
            .collect();
        if let Err(e) = self.log.compact(&live) {
            warn!(error = %e, "queue log compaction failed");
        }
    }
}

/// A named durable queue. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct WorkQueue {
    name: Arc<String>,
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
}

impl WorkQueue {
    /// Open or create the queue backed by the log at `path`.
    ///
    /// Messages that were unacknowledged at the last shutdown are restored
    /// as pending (at-least-once delivery).
    pub fn open(name: &str, path: &Path) -> Result<Self, BusError> {
        let (log, live) = MessageLog::open(path)?;
        Ok(Self {
            name: Arc::new(name.to_string()),
            state: Arc::new(Mutex::new(QueueState {
                log,
                pending: live.into(),
                in_flight: HashMap::new(),
            })),
            notify: Arc::new(Notify::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a message. Durable before return.
    pub fn push(&self, id: &str, body: Value) -> Result<(), BusError> {
        {
            let mut state = self.state.lock();
            state.log.append_push(id, &body)?;
            state.pending.push_back(StoredMessage {
                id: id.to_string(),
                body,
                redelivered: false,
            });
        }
        self.notify.notify_waiters();
        Ok(())
    }

    /// Messages waiting for a consumer.
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Messages delivered but not yet settled.
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Create a prefetch-1 consumer.
    pub fn consumer(&self) -> Consumer {
        Consumer {
            queue: self.clone(),
            gate: Arc::new(Semaphore::new(1)),
        }
    }

    fn try_pop(&self) -> Option<StoredMessage> {
        let mut state = self.state.lock();
        let msg = state.pending.pop_front()?;
        state.in_flight.insert(msg.id.clone(), msg.clone());
        Some(msg)
    }

    fn settle_ack(&self, id: &str) -> Result<(), BusError> {
        let mut state = self.state.lock();
        state.in_flight.remove(id);
        state.log.append_ack(id)?;
        state.maybe_compact();
        Ok(())
    }

    fn settle_nack(&self, id: &str, requeue: bool) -> Result<(), BusError> {
        {
            let mut state = self.state.lock();
            let msg = state.in_flight.remove(id);
            state.log.append_nack(id, requeue)?;
            if requeue {
                if let Some(mut msg) = msg {
                    msg.redelivered = true;
                    state.pending.push_front(msg);
                }
            }
            state.maybe_compact();
        }
        if requeue {
            self.notify.notify_waiters();
        }
        Ok(())
    }
}

/// Competing consumer over a [`WorkQueue`].
pub struct Consumer {
    queue: WorkQueue,
    gate: Arc<Semaphore>,
}

impl Consumer {
    /// Receive the next message.
    ///
    /// Waits until the previous delivery from this consumer is settled
    /// (prefetch 1) and until a message is available.
    pub async fn recv(&mut self) -> Result<Delivery, BusError> {
        let permit = Arc::clone(&self.gate)
            .acquire_owned()
            .await
            .map_err(|_| BusError::Closed)?;
        loop {
            let notified = self.queue.notify.notified();
            tokio::pin!(notified);
            if let Some(msg) = self.queue.try_pop() {
                return Ok(Delivery {
                    queue: self.queue.clone(),
                    msg,
                    _permit: Some(permit),
                    settled: false,
                });
            }
            notified.await;
        }
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }
}

/// A message handed to a consumer, owned by the broker until settled.
pub struct Delivery {
    queue: WorkQueue,
    msg: StoredMessage,
    _permit: Option<OwnedSemaphorePermit>,
    settled: bool,
}

impl Delivery {
    pub fn message_id(&self) -> &str {
        &self.msg.id
    }

    pub fn body(&self) -> &Value {
        &self.msg.body
    }

    pub fn redelivered(&self) -> bool {
        self.msg.redelivered
    }

    /// Decode the message body.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, BusError> {
        Ok(serde_json::from_value(self.msg.body.clone())?)
    }

    /// Acknowledge: the message is done and removed.
    pub fn ack(mut self) -> Result<(), BusError> {
        self.settled = true;
        self.queue.settle_ack(&self.msg.id)
    }

    /// Reject. With `requeue` the message returns to the head of the queue
    /// flagged as redelivered; without, it is dropped.
    pub fn nack(mut self, requeue: bool) -> Result<(), BusError> {
        self.settled = true;
        self.queue.settle_nack(&self.msg.id, requeue)
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.settled = true;
        warn!(
            queue = self.queue.name(),
            id = %self.msg.id,
            "delivery dropped without settling, requeueing",
        );
        if let Err(e) = self.queue.settle_nack(&self.msg.id, true) {
            warn!(
                queue = self.queue.name(),
                id = %self.msg.id,
                error = %e,
                "failed to requeue dropped delivery",
            );
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
