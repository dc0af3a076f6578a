//! Server event types, envelope schema, and event bus for real-time notifications.
//!
//! The ingestion pipeline pushes document lifecycle events through a single
//! [`EventBus`]. Consumers either take a broadcast stream of enveloped events
//! (SSE) or register a handler for one [`EventKind`] and keep the returned
//! [`SubscriptionToken`] to unregister later.
//!
//! Delivery is at-most-once: there is no replay, and a stream receiver that
//! falls behind the buffer misses events. For a given document id the bus
//! always carries `document.created` before any `document.updated`, because the
//! pipeline emits them in that order on one channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::Document;

// ============================================================================
// Event Envelope
// ============================================================================

/// Versioned wrapper around a [`ServerEvent`].
///
/// ## Wire Format (SSE)
///
/// ```text
/// event: document.updated
/// id: 019508a0-1234-7def-8000-abcdef123456
/// data: {"event_id":"...","event_type":"document.updated","occurred_at":"...","payload":{...}}
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    /// Unique event identifier (UUIDv7 for temporal ordering).
    pub event_id: Uuid,
    /// Namespaced event type (e.g., `"document.created"`).
    pub event_type: String,
    /// When the event occurred (UTC).
    pub occurred_at: DateTime<Utc>,
    /// ID of the document this event relates to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<Uuid>,
    /// Payload schema version.
    pub payload_version: u32,
    /// Domain-specific event data.
    pub payload: ServerEvent,
}

impl EventEnvelope {
    pub fn new(event: ServerEvent) -> Self {
        Self {
            event_id: crate::uuid_utils::new_v7(),
            event_type: event.kind().namespaced().to_string(),
            occurred_at: Utc::now(),
            entity_id: event.entity_id(),
            payload_version: 1,
            payload: event,
        }
    }
}

// ============================================================================
// Server Event (domain payloads)
// ============================================================================

/// Event kinds a handler can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DocumentCreated,
    DocumentUpdated,
    Warning,
}

impl EventKind {
    /// Namespaced event name used on the wire.
    pub fn namespaced(&self) -> &'static str {
        match self {
            EventKind::DocumentCreated => "document.created",
            EventKind::DocumentUpdated => "document.updated",
            EventKind::Warning => "notice.warning",
        }
    }
}

/// Events pushed from the pipeline to subscribers.
///
/// Serialized with a `type` tag, e.g.
/// `{"type":"DocumentCreated","document":{...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// A document was staged and is now `processing`.
    DocumentCreated { document: Document },
    /// A document's status or persisted state changed.
    DocumentUpdated { document: Document },
    /// A non-fatal problem the user should see (e.g. a skipped duplicate).
    Warning { message: String },
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::DocumentCreated { .. } => EventKind::DocumentCreated,
            ServerEvent::DocumentUpdated { .. } => EventKind::DocumentUpdated,
            ServerEvent::Warning { .. } => EventKind::Warning,
        }
    }

    pub fn entity_id(&self) -> Option<Uuid> {
        self.document().map(|d| d.id)
    }

    pub fn document(&self) -> Option<&Document> {
        match self {
            ServerEvent::DocumentCreated { document } | ServerEvent::DocumentUpdated { document } => {
                Some(document)
            }
            ServerEvent::Warning { .. } => None,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Handle returned by [`EventBus::on`], used to unregister the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

type Handler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

/// Broadcast-based event bus with optional per-kind handlers.
///
/// Handlers run synchronously inside [`EventBus::emit`], in registration
/// order, before the envelope is broadcast. They must not block.
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
    handlers: RwLock<Vec<(SubscriptionToken, EventKind, Handler)>>,
    next_token: AtomicU64,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    ///
    /// Recommended: 256 for production, 32 for tests.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            handlers: RwLock::new(Vec::new()),
            next_token: AtomicU64::new(1),
        }
    }

    /// Emit an event to handlers and stream subscribers.
    ///
    /// With no subscribers the event is silently dropped.
    pub fn emit(&self, event: ServerEvent) {
        let kind = event.kind();
        let matching: Vec<Handler> = self
            .handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, h)| h.clone())
            .collect();
        for handler in matching {
            handler(&event);
        }

        let envelope = EventEnvelope::new(event);
        tracing::debug!(
            event_type = %envelope.event_type,
            event_id = %envelope.event_id,
            subscriber_count = self.tx.receiver_count(),
            "EventBus emit"
        );
        let _ = self.tx.send(envelope);
    }

    pub fn document_created(&self, document: &Document) {
        self.emit(ServerEvent::DocumentCreated {
            document: document.clone(),
        });
    }

    pub fn document_updated(&self, document: &Document) {
        self.emit(ServerEvent::DocumentUpdated {
            document: document.clone(),
        });
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.emit(ServerEvent::Warning {
            message: message.into(),
        });
    }

    /// Subscribe to receive enveloped events. Each subscriber gets its own independent stream.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Register a handler for one event kind.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionToken
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((token, kind, Arc::new(handler)));
        token
    }

    /// Remove a handler. Returns false when the token was unknown.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = handlers.len();
        handlers.retain(|(t, _, _)| *t != token);
        handlers.len() != before
    }

    /// Number of stream subscribers plus registered handlers.
    pub fn subscriber_count(&self) -> usize {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len();
        self.tx.receiver_count() + handlers
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_BUS_CAPACITY)
    }
}

// ============================================================================
// Tests
// ============================================================================
