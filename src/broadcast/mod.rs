// ABOUTME: Publish/subscribe fan-out of progress events keyed by deployment and artifact.
// ABOUTME: Delivery is at-most-once to current subscribers; full buffers drop, closed ones are pruned.

mod event;
mod transport;

pub use event::{ProgressEvent, Topic};
pub use transport::{NotificationTransport, TracingTransport};

use futures::Stream;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TrySendError};

/// A live view of one topic. Ends when the broadcaster is dropped.
#[derive(Debug)]
pub struct Subscription {
    topic: Topic,
    receiver: mpsc::Receiver<ProgressEvent>,
}

impl Subscription {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.recv().await
    }

    /// Next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

pub struct ProgressBroadcaster {
    capacity: usize,
    subscribers: Mutex<HashMap<Topic, Vec<mpsc::Sender<ProgressEvent>>>>,
    transports: Vec<Arc<dyn NotificationTransport>>,
}

impl fmt::Debug for ProgressBroadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressBroadcaster")
            .field("capacity", &self.capacity)
            .field("topics", &self.subscribers.lock().len())
            .field("transports", &self.transports.len())
            .finish()
    }
}

impl ProgressBroadcaster {
    /// `capacity` is the per-subscriber buffer; at least 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(HashMap::new()),
            transports: Vec::new(),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn NotificationTransport>) -> Self {
        self.transports.push(transport);
        self
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.subscribers
            .lock()
            .entry(topic.clone())
            .or_default()
            .push(sender);
        tracing::debug!(%topic, "subscriber joined");
        Subscription { topic, receiver }
    }

    /// Deliver `event` to everyone currently subscribed to `topic` and to
    /// every transport. Returns how many subscribers received it.
    pub fn publish(&self, topic: &Topic, event: &ProgressEvent) -> usize {
        let delivered = self.fan_out(topic, event);
        self.forward(topic, event);
        delivered
    }

    /// Live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.subscribers
            .lock()
            .get(topic)
            .map_or(0, |senders| senders.iter().filter(|s| !s.is_closed()).count())
    }

    fn fan_out(&self, topic: &Topic, event: &ProgressEvent) -> usize {
        let mut subscribers = self.subscribers.lock();
        let Some(senders) = subscribers.get_mut(topic) else {
            return 0;
        };

        let mut delivered = 0;
        senders.retain(|sender| match sender.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::debug!(%topic, event = event.name(), "subscriber buffer full, event dropped");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });

        if senders.is_empty() {
            subscribers.remove(topic);
        }
        delivered
    }

    fn forward(&self, topic: &Topic, event: &ProgressEvent) {
        if self.transports.is_empty() {
            return;
        }
        let payload = match serde_json::to_value(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(%topic, error = %e, "could not serialize progress event");
                return;
            }
        };
        let topic = topic.to_string();
        for transport in &self.transports {
            transport.publish(&topic, &payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::StepRecord;
    use crate::types::AttemptId;

    fn step_event(n: usize) -> ProgressEvent {
        ProgressEvent::StepChanged {
            attempt_id: AttemptId::new("a"),
            step: StepRecord::pending(format!("step-{n}"), n),
            percent_complete: 0,
        }
    }

    #[tokio::test]
    async fn late_subscriber_sees_only_later_events() {
        let broadcaster = ProgressBroadcaster::new(8);
        let topic = Topic::Deployment(AttemptId::new("a"));

        assert_eq!(broadcaster.publish(&topic, &step_event(0)), 0);
        let mut sub = broadcaster.subscribe(topic.clone());
        assert_eq!(broadcaster.publish(&topic, &step_event(1)), 1);

        assert_eq!(sub.recv().await, Some(step_event(1)));
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn full_buffer_drops_instead_of_blocking() {
        let broadcaster = ProgressBroadcaster::new(1);
        let topic = Topic::Deployment(AttemptId::new("a"));
        let mut slow = broadcaster.subscribe(topic.clone());

        assert_eq!(broadcaster.publish(&topic, &step_event(0)), 1);
        assert_eq!(broadcaster.publish(&topic, &step_event(1)), 0);

        assert_eq!(slow.recv().await, Some(step_event(0)));
        assert!(slow.try_recv().is_none());
        assert_eq!(broadcaster.subscriber_count(&topic), 1);
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let broadcaster = ProgressBroadcaster::new(4);
        let topic = Topic::Deployment(AttemptId::new("a"));
        let sub = broadcaster.subscribe(topic.clone());
        drop(sub);

        assert_eq!(broadcaster.publish(&topic, &step_event(0)), 0);
        assert_eq!(broadcaster.subscriber_count(&topic), 0);
        assert!(broadcaster.subscribers.lock().is_empty());
    }
}
