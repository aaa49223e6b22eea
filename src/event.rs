use uuid::Uuid;

use crate::types::EventType;

/// An application-level event exchanged with the daemon
///
/// Events popped from a [`Client`](crate::Client) are owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Event {
    event_type: EventType,
    string: Option<String>,
    project: Option<String>,
    client_id: Uuid,
}

impl Event {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            ..Self::default()
        }
    }

    /// Create an event carrying a string payload
    pub fn with_string(event_type: EventType, string: impl Into<String>) -> Self {
        Self {
            event_type,
            string: Some(string.into()),
            ..Self::default()
        }
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn set_event_type(&mut self, event_type: EventType) {
        self.event_type = event_type;
    }

    pub fn string(&self) -> Option<&str> {
        self.string.as_deref()
    }

    pub fn set_string(&mut self, string: Option<String>) {
        self.string = string;
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    pub fn set_project(&mut self, project: Option<String>) {
        self.project = project;
    }

    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    pub fn set_client_id(&mut self, client_id: Uuid) {
        self.client_id = client_id;
    }
}
