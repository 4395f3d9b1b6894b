use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};

use loomflow_core::event::EventBus;
use loomflow_core::types::{FlowEvent, ReviewDecision};

/// Manages pending review decisions with oneshot channels.
///
/// The scheduler registers a pending review per node id; an external
/// reviewer collaborator resolves it through `respond`.
pub struct ReviewBroker {
    pending: Mutex<HashMap<String, oneshot::Sender<ReviewDecision>>>,
    bus: Arc<EventBus>,
}

impl ReviewBroker {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            bus,
        }
    }

    /// Register a pending review, publish the request event, and return a
    /// receiver to await the decision.
    pub async fn request(&self, node_id: &str) -> oneshot::Receiver<ReviewDecision> {
        let (tx, rx) = oneshot::channel();

        // Register before publishing so a subscriber reacting to the event
        // always finds the pending entry.
        self.pending.lock().await.insert(node_id.to_string(), tx);

        self.bus.publish(FlowEvent::ReviewRequested {
            node_id: node_id.to_string(),
        });
        rx
    }

    /// Deliver a decision for a pending review.
    /// Returns true if a request was pending for that node.
    pub async fn respond(&self, node_id: &str, decision: ReviewDecision) -> bool {
        let entry = self.pending.lock().await.remove(node_id);
        if let Some(tx) = entry {
            let approved = matches!(decision, ReviewDecision::Approve);
            self.bus.publish(FlowEvent::ReviewResolved {
                node_id: node_id.to_string(),
                approved,
            });
            // Ignore send error (receiver may have been dropped on cancel)
            let _ = tx.send(decision);
            true
        } else {
            false
        }
    }

    /// Node ids with a review currently pending.
    pub async fn pending_nodes(&self) -> Vec<String> {
        self.pending.lock().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn respond_approve() {
        let bus = Arc::new(EventBus::default());
        let broker = ReviewBroker::new(bus);

        let rx = broker.request("node-1").await;
        assert!(broker.respond("node-1", ReviewDecision::Approve).await);

        let decision = rx.await.unwrap();
        assert!(matches!(decision, ReviewDecision::Approve));
    }

    #[tokio::test]
    async fn respond_request_changes() {
        let bus = Arc::new(EventBus::default());
        let broker = ReviewBroker::new(bus);

        let rx = broker.request("node-2").await;
        assert!(
            broker
                .respond(
                    "node-2",
                    ReviewDecision::RequestChanges {
                        feedback: "missing tests".into()
                    }
                )
                .await
        );

        match rx.await.unwrap() {
            ReviewDecision::RequestChanges { feedback } => assert_eq!(feedback, "missing tests"),
            ReviewDecision::Approve => panic!("expected RequestChanges"),
        }
    }

    #[tokio::test]
    async fn respond_unknown_node() {
        let bus = Arc::new(EventBus::default());
        let broker = ReviewBroker::new(bus);
        assert!(!broker.respond("nonexistent", ReviewDecision::Approve).await);
    }

    #[tokio::test]
    async fn pending_nodes_listed() {
        let bus = Arc::new(EventBus::default());
        let broker = ReviewBroker::new(bus);

        let _rx1 = broker.request("node-a").await;
        let _rx2 = broker.request("node-b").await;

        let mut pending = broker.pending_nodes().await;
        pending.sort();
        assert_eq!(pending, vec!["node-a", "node-b"]);
    }

    #[tokio::test]
    async fn review_events_published() {
        let bus = Arc::new(EventBus::default());
        let mut events = bus.subscribe();
        let broker = ReviewBroker::new(bus);

        let _rx = broker.request("node-1").await;
        broker.respond("node-1", ReviewDecision::Approve).await;

        assert!(matches!(
            events.recv().await.unwrap(),
            FlowEvent::ReviewRequested { .. }
        ));
        match events.recv().await.unwrap() {
            FlowEvent::ReviewResolved { node_id, approved } => {
                assert_eq!(node_id, "node-1");
                assert!(approved);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
