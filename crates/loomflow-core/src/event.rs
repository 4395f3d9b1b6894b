//! Fan-out of flow execution events to any number of observers.
//!
//! Built on a tokio broadcast channel: the scheduler publishes, UIs and
//! log collaborators subscribe independently. A slow subscriber lags and
//! drops events for itself only; publishing never blocks.

use tokio::sync::broadcast;

use crate::types::{FlowEvent, NodeStatus, StatusEvent};

const DEFAULT_CAPACITY: usize = 256;

pub struct EventBus {
    tx: broadcast::Sender<FlowEvent>,
}

impl EventBus {
    /// A bus retaining up to `capacity` unconsumed events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: FlowEvent) {
        // A send with zero subscribers is not an error here.
        let _ = self.tx.send(event);
    }

    /// Publish a node status change, wrapped as a `NodeUpdate` event.
    pub fn node_status(
        &self,
        node_id: &str,
        status: NodeStatus,
        progress: u8,
        output: Option<String>,
        error: Option<String>,
    ) {
        let mut event = StatusEvent::new(node_id, status, progress);
        event.output = output;
        event.error = error;
        self.publish(FlowEvent::NodeUpdate(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
