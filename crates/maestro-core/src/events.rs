//! Process-local event bus.
//!
//! Fan-out of typed events to every connected dashboard client. Built on a
//! tokio broadcast channel: `emit` never blocks and never fails from the
//! caller's point of view, so store transactions and background workers can
//! fire events without caring whether anyone is listening.

use serde::Serialize;
use tokio::sync::broadcast;

const BUS_CAPACITY: usize = 256;

/// Everything the dashboard can receive. Serialized with a `type` tag and a
/// unix-seconds `time` field injected by [`Event::envelope`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Connected {
        clients: usize,
    },
    Pong,
    Message {
        role: String,
        content: String,
    },
    Heartbeat {
        mode: String,
        reason: String,
        should_message: bool,
    },
    Finding {
        text: String,
    },
    Workspace {
        action: String,
        slug: String,
    },
    Schedule {
        action: String,
        event_id: String,
    },
    Compaction {
        deleted: usize,
        summary_length: usize,
    },
    EngineSwitch {
        from: String,
        to: String,
    },
    PageDescriptionUpdated {
        workspace_slug: String,
        page_name: String,
    },
    PageHighlightStarted {
        workspace_slug: String,
        page_name: String,
        mission: String,
    },
    PageHighlightComplete {
        workspace_slug: String,
        page_name: String,
        highlight_id: i64,
        box_count: usize,
    },
    PageHighlightFailed {
        workspace_slug: String,
        page_name: String,
        highlight_id: i64,
    },
    Status {
        payload: serde_json::Value,
    },
}

impl Event {
    /// Serialize to the wire envelope: `{type, time, ...payload}`.
    pub fn envelope(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}));
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "time".to_string(),
                serde_json::json!(chrono::Utc::now().timestamp()),
            );
        }
        value
    }
}

/// Shared handle — clone freely into the store, tool handlers and workers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<serde_json::Value>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// New dashboard client subscribes to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<serde_json::Value> {
        self.tx.subscribe()
    }

    /// Push an event to all subscribers. Silently drops when nobody listens;
    /// never raises into the caller.
    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(event.envelope());
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_type_and_time() {
        let env = Event::Message {
            role: "user".into(),
            content: "hi".into(),
        }
        .envelope();
        assert_eq!(env["type"], "message");
        assert_eq!(env["role"], "user");
        assert!(env["time"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_a_noop() {
        let bus = EventBus::new();
        bus.emit(Event::Pong); // must not panic or block
    }

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(Event::Workspace {
            action: "created".into(),
            slug: "foundation_framing".into(),
        });
        let got = rx.recv().await.unwrap();
        assert_eq!(got["type"], "workspace");
        assert_eq!(got["slug"], "foundation_framing");
    }
}
