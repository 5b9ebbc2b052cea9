use crate::bus::{BusEvent, Subscription, SubscriptionId};
use crate::control::{FrameWire, ServerMessage};
use crate::core::{CanId, Payload};
use crate::storage::LabelStore;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-client view of the bus. Turns bus events into `can_message` and
/// `overflow` pushes, tracking payload changes as this client saw them.
pub struct ClientFeed {
    subscription: Subscription,
    labels: Arc<dyn LabelStore>,
    last_data: HashMap<CanId, Payload>,
}

impl ClientFeed {
    pub(crate) fn new(subscription: Subscription, labels: Arc<dyn LabelStore>) -> Self {
        Self {
            subscription,
            labels,
            last_data: HashMap::new(),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.subscription.id()
    }

    /// Next message for this client; `None` once the bus has shut down
    pub async fn next(&mut self) -> Option<ServerMessage> {
        let event = self.subscription.recv().await?;
        Some(self.translate(event).await)
    }

    /// Non-blocking variant of [`next`](Self::next)
    pub async fn try_next(&mut self) -> Option<ServerMessage> {
        let event = self.subscription.try_recv()?;
        Some(self.translate(event).await)
    }

    async fn translate(&mut self, event: BusEvent) -> ServerMessage {
        match event {
            BusEvent::Frame(frame) => {
                let change_detected = self
                    .last_data
                    .insert(frame.id, frame.data)
                    .is_some_and(|previous| previous != frame.data);
                let label = match self.labels.find(frame.id, frame.data).await {
                    Ok(label) => label,
                    Err(e) => {
                        tracing::warn!(error = %e, id = %frame.id, "label lookup failed");
                        None
                    }
                };
                ServerMessage::CanMessage(FrameWire::new(&frame, change_detected, label))
            }
            BusEvent::Overflow { dropped } => {
                tracing::debug!(client = %self.subscription.id(), dropped, "client feed overflowed");
                ServerMessage::Overflow { dropped }
            }
        }
    }
}
