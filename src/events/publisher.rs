use super::notifications::{NotificationDispatcher, NotificationError, OperationNotification};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Broadcast fan-out of operation notifications to in-process subscribers
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<OperationNotification>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, notification: OperationNotification) {
        // send() only fails when nobody is subscribed, which is fine
        let _ = self.sender.send(notification);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<OperationNotification> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl NotificationDispatcher for EventPublisher {
    async fn dispatch(&self, notification: OperationNotification) -> Result<(), NotificationError> {
        self.publish(notification);
        Ok(())
    }
}
