// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker facade: queue declaration, bindings, publish, and consumption.
//!
//! The broker owns the topic exchange and all named queues under one data
//! directory. Reopening the directory recovers every previously declared
//! queue together with its unacknowledged messages.

use crate::exchange::TopicExchange;
use crate::queue::{Consumer, WorkQueue};
use crate::BusError;
use parking_lot::Mutex;
use serde::Serialize;
use sr_core::{Envelope, IdGen, UuidIdGen};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

struct BrokerState {
    queues: HashMap<String, WorkQueue>,
    exchange: TopicExchange,
}

/// Handle to the message fabric. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Broker {
    dir: PathBuf,
    state: Arc<Mutex<BrokerState>>,
    ids: UuidIdGen,
}

impl Broker {
    /// Open the broker rooted at `dir`, recovering any existing queue logs.
    pub fn open(dir: &Path) -> Result<Self, BusError> {
        let queues_dir = dir.join("queues");
        std::fs::create_dir_all(&queues_dir)?;

        let mut queues = HashMap::new();
        for entry in std::fs::read_dir(&queues_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("log") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let queue = WorkQueue::open(name, &path)?;
            if queue.pending() > 0 {
                info!(
                    queue = name,
                    depth = queue.pending(),
                    "recovered unacknowledged messages",
                );
            }
            queues.insert(name.to_string(), queue);
        }

        Ok(Self {
            dir: dir.to_owned(),
            state: Arc::new(Mutex::new(BrokerState {
                queues,
                exchange: TopicExchange::new(),
            })),
            ids: UuidIdGen,
        })
    }

    fn queue_log_path(&self, name: &str) -> PathBuf {
        self.dir.join("queues").join(format!("{name}.log"))
    }

    /// Declare a durable queue. Idempotent.
    pub fn declare_queue(&self, name: &str) -> Result<WorkQueue, BusError> {
        let mut state = self.state.lock();
        if let Some(queue) = state.queues.get(name) {
            return Ok(queue.clone());
        }
        let queue = WorkQueue::open(name, &self.queue_log_path(name))?;
        state.queues.insert(name.to_string(), queue.clone());
        Ok(queue)
    }

    /// Bind an existing queue to a routing pattern on the exchange.
    pub fn bind(&self, queue: &str, pattern: &str) -> Result<(), BusError> {
        let mut state = self.state.lock();
        if !state.queues.contains_key(queue) {
            return Err(BusError::UnknownQueue(queue.to_string()));
        }
        state.exchange.bind(queue, pattern);
        Ok(())
    }

    /// Publish an envelope to the exchange.
    ///
    /// The message lands in every queue whose binding matches the routing
    /// key; an envelope matching no binding is dropped (topic semantics).
    pub fn publish(&self, envelope: &Envelope) -> Result<(), BusError> {
        let body = serde_json::to_value(envelope)?;
        let routing_key = envelope.routing_key();

        let targets: Vec<WorkQueue> = {
            let state = self.state.lock();
            state
                .exchange
                .routes(routing_key)
                .into_iter()
                .filter_map(|name| state.queues.get(name).cloned())
                .collect()
        };

        debug!(
            exchange = sr_core::EXCHANGE_NAME,
            key = routing_key,
            event_id = %envelope.event_id,
            queues = targets.len(),
            "publish",
        );
        for queue in targets {
            queue.push(envelope.event_id.as_str(), body.clone())?;
        }
        Ok(())
    }

    /// Put a task body directly onto a named work queue.
    ///
    /// Returns the broker-assigned message id.
    pub fn enqueue<T: Serialize>(&self, queue: &str, body: &T) -> Result<String, BusError> {
        let target = {
            let state = self.state.lock();
            state
                .queues
                .get(queue)
                .cloned()
                .ok_or_else(|| BusError::UnknownQueue(queue.to_string()))?
        };
        let id = self.ids.next();
        target.push(&id, serde_json::to_value(body)?)?;
        Ok(id)
    }

    /// Create a prefetch-1 consumer for a queue.
    pub fn consumer(&self, queue: &str) -> Result<Consumer, BusError> {
        let state = self.state.lock();
        state
            .queues
            .get(queue)
            .map(|q| q.consumer())
            .ok_or_else(|| BusError::UnknownQueue(queue.to_string()))
    }

    /// Pending depth of a queue.
    pub fn depth(&self, queue: &str) -> Result<usize, BusError> {
        let state = self.state.lock();
        state
            .queues
            .get(queue)
            .map(|q| q.pending())
            .ok_or_else(|| BusError::UnknownQueue(queue.to_string()))
    }

    pub fn queue_names(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut names: Vec<String> = state.queues.keys().cloned().collect();
        names.sort();
        names
    }

    /// Liveness probe: verify the data directory still accepts writes.
    pub fn ping(&self) -> bool {
        let probe = self.dir.join(".ping");
        let result = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&probe)
            .and_then(|mut f| f.write_all(b"ok"));
        result.is_ok()
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
