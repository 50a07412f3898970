//! Event bus abstraction for coterie relationship change notifications.
//!
//! This crate defines the EventBus trait that allows different implementations
//! for event broadcasting:
//! - Memory (single process, tokio broadcast channels)
//! - Anything distributed (Redis pub/sub, Postgres LISTEN/NOTIFY) behind the
//!   same trait

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;
use coterie_storage::GroupId;

/// Unique identifier for an event (UUID v7, time-ordered).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type of relationship change event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    Updated,
    Deleted,
}

/// Event representing a change to a relationship within a group.
///
/// IDs are carried as raw values so the payload stays serializable across
/// process boundaries without schema coupling.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationshipChangeEvent {
    pub id: EventId,
    pub event_type: EventType,
    pub relationship_id: i64,
    pub content_type: String,
    pub timestamp: i64,
}

/// Error type for event bus operations
#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("backend error: {0}")]
    Backend(String),
}

/// Stream of relationship change events
pub type EventStream = Pin<Box<dyn Stream<Item = RelationshipChangeEvent> + Send>>;

/// Event bus trait for publishing and subscribing to relationship change
/// events, keyed by group.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a relationship change event to all watchers of this group.
    ///
    /// Called after a relationship is created, updated, or deleted.
    async fn publish(
        &self,
        group_id: &GroupId,
        event: RelationshipChangeEvent,
    ) -> Result<(), EventBusError>;

    /// Subscribe to relationship change events for a group.
    ///
    /// Returns a stream that yields events as they occur, until dropped.
    async fn subscribe(&self, group_id: &GroupId) -> Result<EventStream, EventBusError>;
}
