use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::Event;

/// Envelope for an event, carrying the stream it belongs to.
///
/// For invoice approvals the stream id is the invoice number, so every audit
/// fact about one invoice can be correlated regardless of which line items
/// it touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,

    stream_id: String,
    stream_type: String,

    event_type: String,
    event_version: u32,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        stream_id: impl Into<String>,
        stream_type: impl Into<String>,
        event_type: impl Into<String>,
        event_version: u32,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            stream_id: stream_id.into(),
            stream_type: stream_type.into(),
            event_type: event_type.into(),
            event_version,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn stream_type(&self) -> &str {
        &self.stream_type
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> u32 {
        self.event_version
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

impl<E: Event> EventEnvelope<E> {
    /// Wrap a typed event, taking its type name and schema version from the event itself.
    pub fn wrap(stream_id: impl Into<String>, stream_type: impl Into<String>, event: E) -> Self {
        Self::new(
            Uuid::now_v7(),
            stream_id,
            stream_type,
            event.event_type(),
            event.version(),
            event,
        )
    }
}
