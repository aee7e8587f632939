//! Live upload progress, fanned out per user and streamed as server-sent events.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Mutex;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::debug;
use uuid::Uuid;

use crate::auth::extractor::AuthUser;
use crate::state::AppState;

const DEFAULT_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Allocated,
    Extracted,
    Generated,
    Completed,
    Failed,
}

impl Stage {
    /// Percent complete reported with the stage. Failure keeps no percentage.
    pub fn progress(self) -> Option<u8> {
        match self {
            Stage::Allocated => Some(5),
            Stage::Extracted => Some(25),
            Stage::Generated => Some(60),
            Stage::Completed => Some(100),
            Stage::Failed => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub annotation_id: Uuid,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(annotation_id: Uuid, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            annotation_id,
            stage,
            progress: stage.progress(),
            message: message.into(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(annotation_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(annotation_id, Stage::Failed, "Annotation failed")
        }
    }
}

/// Topic registry: one broadcast channel per user, created on first subscribe.
pub struct ProgressHub {
    topics: Mutex<HashMap<Uuid, broadcast::Sender<ProgressEvent>>>,
    capacity: usize,
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ProgressHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, topic: Uuid) -> broadcast::Receiver<ProgressEvent> {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics
            .entry(topic)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Sends `event` to the topic's subscribers and returns how many received it.
    /// Topics whose subscribers have all gone away are dropped.
    pub fn publish(&self, topic: Uuid, event: ProgressEvent) -> usize {
        let mut topics = self.topics.lock().unwrap_or_else(|e| e.into_inner());
        topics.retain(|_, sender| sender.receiver_count() > 0);
        match topics.get(&topic) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    pub fn topic_count(&self) -> usize {
        self.topics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

/// GET /annotations/progress
pub async fn stream_progress(
    State(state): State<AppState>,
    user: AuthUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!(
        "Progress stream opened for {} ({} active topics)",
        user.email,
        state.progress.topic_count()
    );
    let events = BroadcastStream::new(state.progress.subscribe(user.id)).filter_map(|message| {
        // Lagged receivers skip the events they missed.
        let event = message.ok()?;
        Event::default()
            .event("progress")
            .json_data(&event)
            .ok()
            .map(Ok)
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_progress_values() {
        assert_eq!(Stage::Allocated.progress(), Some(5));
        assert_eq!(Stage::Extracted.progress(), Some(25));
        assert_eq!(Stage::Generated.progress(), Some(60));
        assert_eq!(Stage::Completed.progress(), Some(100));
        assert_eq!(Stage::Failed.progress(), None);
    }

    #[tokio::test]
    async fn test_subscriber_receives_only_its_topic() {
        let hub = ProgressHub::default();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let mut rx = hub.subscribe(alice);
        let _bob_rx = hub.subscribe(bob);

        let id = Uuid::new_v4();
        assert_eq!(hub.publish(bob, ProgressEvent::new(id, Stage::Allocated, "bob")), 1);
        assert_eq!(hub.publish(alice, ProgressEvent::new(id, Stage::Extracted, "alice")), 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.message, "alice");
        assert_eq!(event.progress, Some(25));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_publish_without_subscribers_is_dropped() {
        let hub = ProgressHub::default();
        let delivered = hub.publish(
            Uuid::new_v4(),
            ProgressEvent::new(Uuid::new_v4(), Stage::Completed, "done"),
        );
        assert_eq!(delivered, 0);
        assert_eq!(hub.topic_count(), 0);
    }

    #[test]
    fn test_abandoned_topics_are_pruned() {
        let hub = ProgressHub::default();
        let user = Uuid::new_v4();
        drop(hub.subscribe(user));
        assert_eq!(hub.topic_count(), 1);

        hub.publish(user, ProgressEvent::new(Uuid::new_v4(), Stage::Allocated, "x"));
        assert_eq!(hub.topic_count(), 0);
    }

    #[test]
    fn test_failed_event_serializes_error_without_progress() {
        let event = ProgressEvent::failed(Uuid::nil(), "no text");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["stage"], "failed");
        assert_eq!(json["error"], "no text");
        assert!(json.get("progress").is_none());
    }
}
