//! In-memory event bus implementation using tokio broadcast channels.
//!
//! Events are only broadcast within a single process; multiple workers will
//! NOT receive each other's events. Suitable for single-process deployments
//! and tests. For multi-worker setups, put a distributed implementation
//! behind the same trait.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use coterie_events::{EventBus, EventBusError, EventStream, RelationshipChangeEvent};
use coterie_storage::GroupId;

const CHANNEL_CAPACITY: usize = 100;

/// In-memory event bus using tokio broadcast channels, one per group.
pub struct MemoryEventBus {
    channels: Arc<DashMap<GroupId, broadcast::Sender<RelationshipChangeEvent>>>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
        }
    }

    /// Get or create a broadcast channel for a group
    fn get_or_create_channel(
        &self,
        group_id: &GroupId,
    ) -> broadcast::Sender<RelationshipChangeEvent> {
        self.channels
            .entry(*group_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for MemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(
        &self,
        group_id: &GroupId,
        event: RelationshipChangeEvent,
    ) -> Result<(), EventBusError> {
        let tx = self.get_or_create_channel(group_id);

        // Ignore error if no receivers (this is fine)
        let _ = tx.send(event);

        Ok(())
    }

    async fn subscribe(&self, group_id: &GroupId) -> Result<EventStream, EventBusError> {
        let tx = self.get_or_create_channel(group_id);
        let rx = tx.subscribe();

        // Filter out lagged errors (receiver fell behind and should resync)
        let stream = BroadcastStream::new(rx).filter_map(|result| result.ok());

        Ok(Box::pin(stream))
    }
}
