// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Audit trail: a `#`-bound consumer logging every envelope on the bus.

use sr_bus::{Broker, BusError, Consumer};
use sr_core::Envelope;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Queue bound to every routing key.
pub const AUDIT_QUEUE: &str = "audit";

/// Start the audit consumer. The queue must already be declared and bound.
pub fn start_audit_logger(
    broker: &Broker,
) -> Result<(oneshot::Sender<()>, JoinHandle<()>), BusError> {
    let consumer = broker.consumer(AUDIT_QUEUE)?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle = tokio::spawn(run(consumer, shutdown_rx));
    Ok((shutdown_tx, handle))
}

async fn run(mut consumer: Consumer, mut shutdown_rx: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            delivery = consumer.recv() => {
                let Ok(delivery) = delivery else { break };
                match delivery.decode::<Envelope>() {
                    Ok(envelope) => info!(target: "audit", event = %envelope.log_summary()),
                    Err(e) => debug!(error = %e, "unloggable message on audit queue"),
                }
                if let Err(e) = delivery.ack() {
                    warn!(error = %e, "cannot ack audit message");
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "audit_tests.rs"]
mod tests;
