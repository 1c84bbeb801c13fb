// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Topic exchange: routing keys → bound queues.

use crate::pattern;

/// A queue binding on the exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub queue: String,
    pub pattern: String,
}

/// Routing table for the `subtitle.events` exchange.
///
/// A queue may hold several bindings; a published message is delivered at
/// most once per queue even when multiple patterns match.
#[derive(Debug, Default)]
pub struct TopicExchange {
    bindings: Vec<Binding>,
}

impl TopicExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `queue` to `pattern`. Duplicate bindings are collapsed.
    pub fn bind(&mut self, queue: &str, pattern: &str) {
        let binding = Binding {
            queue: queue.to_string(),
            pattern: pattern.to_string(),
        };
        if !self.bindings.contains(&binding) {
            self.bindings.push(binding);
        }
    }

    /// Remove all bindings for a queue.
    pub fn unbind_queue(&mut self, queue: &str) {
        self.bindings.retain(|b| b.queue != queue);
    }

    /// Queues a routing key routes to, deduplicated, in binding order.
    pub fn routes(&self, routing_key: &str) -> Vec<&str> {
        let mut queues: Vec<&str> = Vec::new();
        for binding in &self.bindings {
            if pattern::matches(&binding.pattern, routing_key)
                && !queues.contains(&binding.queue.as_str())
            {
                queues.push(&binding.queue);
            }
        }
        queues
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }
}

#[cfg(test)]
#[path = "exchange_tests.rs"]
mod tests;
