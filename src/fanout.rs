//! C10: the broadcaster.
//!
//! Sends a message to one connection, classifying failure as `gone`
//! (transport already closed — callers treat this as a successful delete)
//! versus a retryable/other error. [`broadcast`] fans a send out to many
//! connections with bounded parallelism.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};

use crate::wire::ServerFrame;

/// Outcome of sending to a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Delivered (or at least handed to the transport without error).
    Ok,
    /// The peer transport has already closed; do not retry.
    Gone,
    /// Some other, non-fatal-to-the-batch error occurred.
    Failed,
}

/// Abstraction over "deliver this frame to this connection id", decoupling
/// the fan-out logic in this module from the WebSocket transport layer.
#[async_trait::async_trait]
pub trait Sender: Send + Sync {
    /// Attempt to deliver `frame` to `connection_id`.
    async fn send(&self, connection_id: &str, frame: &ServerFrame) -> SendOutcome;
}

/// Summary of a [`broadcast`] run.
#[derive(Debug, Clone, Default)]
pub struct BroadcastSummary {
    /// Connection ids the frame was delivered to.
    pub sent: Vec<String>,
    /// Connection ids whose transport had already closed.
    pub gone: Vec<String>,
    /// Connection ids that failed for another reason.
    pub failed: Vec<String>,
}

/// Fan a frame out to many connections with at most `max_parallel`
/// in-flight sends at a time. Individual send failures are logged and
/// folded into the summary; they never abort the batch.
pub async fn broadcast(
    sender: Arc<dyn Sender>,
    connection_ids: &[String],
    frame: ServerFrame,
    max_parallel: usize,
) -> BroadcastSummary {
    let frame = Arc::new(frame);
    let mut summary = BroadcastSummary::default();
    let mut in_flight = FuturesUnordered::new();
    let mut remaining = connection_ids.iter();

    for _ in 0..max_parallel {
        let Some(id) = remaining.next() else { break };
        in_flight.push(send_one(sender.clone(), id.clone(), frame.clone()));
    }

    while let Some((id, outcome)) = in_flight.next().await {
        match outcome {
            SendOutcome::Ok => summary.sent.push(id),
            SendOutcome::Gone => summary.gone.push(id),
            SendOutcome::Failed => {
                tracing::warn!(connection_id = %id, "broadcast send failed");
                summary.failed.push(id);
            }
        }
        if let Some(next_id) = remaining.next() {
            in_flight.push(send_one(sender.clone(), next_id.clone(), frame.clone()));
        }
    }

    summary
}

async fn send_one(
    sender: Arc<dyn Sender>,
    connection_id: String,
    frame: Arc<ServerFrame>,
) -> (String, SendOutcome) {
    let outcome = sender.send(&connection_id, &frame).await;
    (connection_id, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct RecordingSender {
        outcomes: std::collections::HashMap<String, SendOutcome>,
        max_concurrent: AtomicUsize,
        current_concurrent: AtomicUsize,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Sender for RecordingSender {
        async fn send(&self, connection_id: &str, _frame: &ServerFrame) -> SendOutcome {
            let now = self.current_concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent.fetch_max(now, Ordering::SeqCst);
            self.calls.lock().unwrap().push(connection_id.to_string());
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            self.current_concurrent.fetch_sub(1, Ordering::SeqCst);
            self.outcomes
                .get(connection_id)
                .copied()
                .unwrap_or(SendOutcome::Ok)
        }
    }

    #[tokio::test]
    async fn classifies_gone_and_failed_separately() {
        let mut outcomes = std::collections::HashMap::new();
        outcomes.insert("c1".to_string(), SendOutcome::Ok);
        outcomes.insert("c2".to_string(), SendOutcome::Gone);
        outcomes.insert("c3".to_string(), SendOutcome::Failed);
        let sender = Arc::new(RecordingSender {
            outcomes,
            max_concurrent: AtomicUsize::new(0),
            current_concurrent: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        });

        let ids = vec!["c1".to_string(), "c2".to_string(), "c3".to_string()];
        let summary = broadcast(sender, &ids, ServerFrame::test_ping(), 8).await;

        assert_eq!(summary.sent, vec!["c1"]);
        assert_eq!(summary.gone, vec!["c2"]);
        assert_eq!(summary.failed, vec!["c3"]);
    }

    #[tokio::test]
    async fn respects_max_parallel_bound() {
        let sender = Arc::new(RecordingSender {
            outcomes: std::collections::HashMap::new(),
            max_concurrent: AtomicUsize::new(0),
            current_concurrent: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        });
        let ids: Vec<String> = (0..20).map(|i| format!("c{i}")).collect();
        broadcast(sender.clone(), &ids, ServerFrame::test_ping(), 4).await;
        assert!(sender.max_concurrent.load(Ordering::SeqCst) <= 4);
        assert_eq!(sender.calls.lock().unwrap().len(), 20);
    }
}
