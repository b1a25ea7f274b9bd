//! Queue store
//!
//! Ordered dial targets per session. Ordering and the single-DIALING guard
//! live in the repository (one transaction per dequeue); this layer adds
//! validation, item transitions by name and live notifications.

use crate::bus::{DialerEvent, EventBus};
use dialer_core::{
    models::{EnqueueResult, ItemPatch, QueueItem, QueueItemStatus, QueueOutcome},
    traits::QueueRepository,
    AppError, AppResult,
};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

pub struct QueueStore {
    repo: Arc<dyn QueueRepository>,
    bus: EventBus,
}

impl QueueStore {
    pub fn new(repo: Arc<dyn QueueRepository>, bus: EventBus) -> Self {
        Self { repo, bus }
    }

    /// Add contacts to a session queue
    ///
    /// Contacts already queued in the session are returned in `rejected`.
    /// Without a priority the batch dials ahead of everything already queued.
    #[instrument(skip(self, contact_ids), fields(count = contact_ids.len()))]
    pub async fn enqueue(
        &self,
        session_id: Uuid,
        contact_ids: &[i64],
        priority: Option<i32>,
    ) -> AppResult<EnqueueResult> {
        if contact_ids.is_empty() {
            return Err(AppError::Validation("No contacts to enqueue".to_string()));
        }

        let result = self.repo.insert_items(session_id, contact_ids, priority).await?;

        info!(
            "Enqueued {} contacts in session {} ({} already present)",
            result.added.len(),
            session_id,
            result.rejected.len()
        );
        for item in &result.added {
            self.bus.publish(DialerEvent::QueueItemUpdated(item.clone()));
        }

        Ok(result)
    }

    /// Move the next pending item to DIALING
    #[instrument(skip(self))]
    pub async fn dequeue_next(&self, session_id: Uuid) -> AppResult<QueueItem> {
        let item = self.repo.dequeue_next(session_id).await?;
        debug!(
            "Dequeued contact {} (priority {}, attempt {})",
            item.contact_id, item.priority, item.attempts
        );
        Ok(self.published(item))
    }

    /// Close a DIALING item with the call outcome
    #[instrument(skip(self))]
    pub async fn complete(&self, item_id: Uuid, outcome: QueueOutcome) -> AppResult<QueueItem> {
        self.move_to(item_id, QueueItemStatus::Completed, Some(outcome))
            .await
    }

    pub async fn fail(&self, item_id: Uuid) -> AppResult<QueueItem> {
        self.move_to(item_id, QueueItemStatus::Failed, None).await
    }

    pub async fn skip(&self, item_id: Uuid) -> AppResult<QueueItem> {
        self.move_to(item_id, QueueItemStatus::Skipped, None).await
    }

    /// Return a DIALING item to PENDING after an origination that never
    /// reached the provider
    pub async fn requeue(&self, item_id: Uuid) -> AppResult<QueueItem> {
        let item = self.get(item_id).await?;
        if item.status != QueueItemStatus::Dialing {
            return Err(AppError::InvalidItemState(format!(
                "only a dialing item can be requeued, item {} is {}",
                item_id, item.status
            )));
        }
        self.move_to(item_id, QueueItemStatus::Pending, None).await
    }

    pub async fn get(&self, item_id: Uuid) -> AppResult<QueueItem> {
        self.repo
            .find_by_id(item_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Queue item {}", item_id)))
    }

    pub async fn list(&self, session_id: Uuid) -> AppResult<Vec<QueueItem>> {
        self.repo.list(session_id).await
    }

    /// Remove pending or skipped contacts; anything else stays queued
    #[instrument(skip(self, contact_ids))]
    pub async fn remove(&self, session_id: Uuid, contact_ids: &[i64]) -> AppResult<u64> {
        let removed = self.repo.remove(session_id, contact_ids).await?;
        info!("Removed {} contacts from session {}", removed, session_id);
        Ok(removed)
    }

    /// Apply an operator edit to a queue item
    ///
    /// Status edits are limited to skipping a pending item and putting a
    /// skipped or failed item back in line.
    #[instrument(skip(self))]
    pub async fn update_item(&self, item_id: Uuid, patch: ItemPatch) -> AppResult<QueueItem> {
        let mut item = self.get(item_id).await?;

        if let Some(target) = patch.status {
            let allowed = matches!(
                (item.status, target),
                (QueueItemStatus::Pending, QueueItemStatus::Skipped)
                    | (QueueItemStatus::Skipped, QueueItemStatus::Pending)
                    | (QueueItemStatus::Failed, QueueItemStatus::Pending)
            );
            if !allowed && item.status != target {
                return Err(AppError::InvalidItemState(format!(
                    "item {} cannot be set from {} to {}",
                    item_id, item.status, target
                )));
            }
            if item.status != target {
                item = self.move_to(item_id, target, None).await?;
            }
        }

        if let Some(priority) = patch.priority {
            item = self.published(self.repo.update_priority(item_id, priority).await?);
        }

        Ok(item)
    }

    async fn move_to(
        &self,
        item_id: Uuid,
        to: QueueItemStatus,
        outcome: Option<QueueOutcome>,
    ) -> AppResult<QueueItem> {
        let item = self.repo.transition(item_id, to, outcome).await?;
        info!("Queue item {} -> {}", item_id, to);
        Ok(self.published(item))
    }

    fn published(&self, item: QueueItem) -> QueueItem {
        self.bus.publish(DialerEvent::QueueItemUpdated(item.clone()));
        item
    }
}
