use serde::{Deserialize, Serialize};

/// Broad category of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Request,
    Review,
    System,
}

/// What happened. One event row is appended per lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Initiate,
    Accept,
    Decline,
    Confirmation,
    Expired,
    Cancelled,
}

/// Immutable audit record of a transition on a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    pub id: u64,
    /// Request the event belongs to
    pub target_id: u64,
    pub category: EventCategory,
    pub kind: EventKind,
    /// User whose action produced the event; system events have none
    pub actor_id: Option<String>,
    pub at: i64,
}

impl Event {
    pub fn new(
        id: u64,
        target_id: u64,
        category: EventCategory,
        kind: EventKind,
        actor_id: Option<String>,
        at: i64,
    ) -> Self {
        Event {
            id,
            target_id,
            category,
            kind,
            actor_id,
            at,
        }
    }
}

/// Per-recipient user-facing message referencing an event. Created once;
/// only the read flag ever changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: u64,
    pub message: String,
    pub recipient_id: String,
    pub actor_id: Option<String>,
    pub event_id: u64,
    pub read: bool,
    pub created_at: i64,
}

impl Notification {
    pub fn new(
        id: u64,
        message: String,
        recipient_id: String,
        actor_id: Option<String>,
        event_id: u64,
        created_at: i64,
    ) -> Self {
        Notification {
            id,
            message,
            recipient_id,
            actor_id,
            event_id,
            read: false,
            created_at,
        }
    }

    pub fn mark_read(&mut self) {
        self.read = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_starts_unread() {
        let n = Notification::new(1, "hello".to_string(), "bob".to_string(), None, 9, 1_000);
        assert!(!n.read);
        assert_eq!(n.event_id, 9);
    }

    #[test]
    fn test_mark_read() {
        let mut n = Notification::new(1, "hello".to_string(), "bob".to_string(), None, 9, 1_000);
        n.mark_read();
        assert!(n.read);
    }
}
