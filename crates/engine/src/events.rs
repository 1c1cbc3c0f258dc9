// SPDX-License-Identifier: MIT

//! Event publication. `ChannelNotifier` is a bounded, best-effort fan-out:
//! a full buffer is a logged warning, never a backpressure stall on the
//! worker that produced the event.

use async_trait::async_trait;
use tokio::sync::mpsc;
use toil_core::{EventType, ExecutionHistoryEvent};

#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub topic: String,
    pub event: ExecutionHistoryEvent,
}

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn publish(&self, topic: &str, event: ExecutionHistoryEvent);
}

/// The root topic every lifecycle event is published to, in addition to
/// its event-type-specific topic (if any).
pub const ROOT_TOPIC: &str = "tasks";

/// The event-type-specific topic alongside [`ROOT_TOPIC`]: one per
/// {CREATED, STARTED, PROGRESS, COMPLETED, FAILED, STUCK, CANCELLED,
/// RETRYING, DEAD_LETTER}, with PROGRESS and HEARTBEAT sharing a topic.
/// Event types with no dedicated topic publish to the root topic only.
pub(crate) fn topic_for(event_type: EventType) -> Option<&'static str> {
    match event_type {
        EventType::Created => Some("tasks.created"),
        EventType::Started => Some("tasks.started"),
        EventType::Progress | EventType::Heartbeat => Some("tasks.progress"),
        EventType::Completed => Some("tasks.completed"),
        EventType::Failed => Some("tasks.failed"),
        EventType::Stuck => Some("tasks.stuck"),
        EventType::Cancelled => Some("tasks.cancelled"),
        EventType::Retrying => Some("tasks.retrying"),
        EventType::DeadLetter => Some("tasks.dead_letter"),
        EventType::Paused | EventType::Resumed | EventType::Log | EventType::Resource => None,
    }
}

/// Publishes `event` to its event-type-specific topic (if it has one) and
/// always to [`ROOT_TOPIC`], so root subscribers see every event and
/// per-type subscribers only see their own.
pub(crate) async fn publish_routed(notifier: &dyn Notifier, event: ExecutionHistoryEvent) {
    if let Some(topic) = topic_for(event.event_type) {
        notifier.publish(topic, event.clone()).await;
    }
    notifier.publish(ROOT_TOPIC, event).await;
}

/// Bounded `tokio::sync::mpsc`-backed notifier. A full channel falls back
/// to a synchronous (awaited) send, logged as a warning, rather than ever
/// silently dropping an event.
pub struct ChannelNotifier {
    sender: mpsc::Sender<EventEnvelope>,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<EventEnvelope>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn publish(&self, topic: &str, event: ExecutionHistoryEvent) {
        let envelope = EventEnvelope { topic: topic.to_string(), event };
        match self.sender.try_send(envelope) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(envelope)) => {
                tracing::warn!(topic, "event buffer full, falling back to synchronous publish");
                if self.sender.send(envelope).await.is_err() {
                    tracing::warn!(topic, "event channel closed, dropping event");
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(topic, "event channel closed, dropping event");
            }
        }
    }
}

/// A [`Notifier`] that discards everything. Useful for tests and for a
/// daemon configuration with no subscribers attached.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn publish(&self, _topic: &str, _event: ExecutionHistoryEvent) {}
}
