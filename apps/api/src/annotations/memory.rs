//! In-process `AnnotationStore` used by the orchestrator and router tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::models::{Annotation, AnnotationFilter, AnnotationPatch, AnnotationStatus, PageWindow};
use super::store::{AnnotationStore, StoreError};

#[derive(Default)]
pub struct MemoryAnnotationStore {
    records: Mutex<HashMap<Uuid, Annotation>>,
    reject_completed: AtomicBool,
}

impl MemoryAnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later save of a `completed` outcome fail, as a database
    /// rejecting the row would.
    pub fn reject_completed_saves(&self) {
        self.reject_completed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AnnotationStore for MemoryAnnotationStore {
    async fn insert(&self, annotation: &Annotation) -> Result<(), StoreError> {
        self.records
            .lock()
            .await
            .insert(annotation.id, annotation.clone());
        Ok(())
    }

    async fn save_outcome(&self, annotation: &Annotation) -> Result<(), StoreError> {
        if annotation.status == AnnotationStatus::Completed
            && self.reject_completed.load(Ordering::SeqCst)
        {
            return Err(StoreError::Corrupt("completed row rejected".into()));
        }
        let mut records = self.records.lock().await;
        if let Some(existing) = records.get_mut(&annotation.id) {
            existing.text_content = annotation.text_content.clone();
            existing.annotation = annotation.annotation.clone();
            existing.genre = annotation.genre.clone();
            existing.status = annotation.status;
            existing.error_message = annotation.error_message.clone();
            existing.updated_at = annotation.updated_at;
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Annotation>, StoreError> {
        Ok(self.records.lock().await.get(&id).cloned())
    }

    async fn update(
        &self,
        id: Uuid,
        patch: AnnotationPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<Annotation>, StoreError> {
        let mut records = self.records.lock().await;
        Ok(records.get_mut(&id).map(|existing| {
            patch.apply_to(existing, now);
            existing.clone()
        }))
    }

    async fn set_tts_url(
        &self,
        id: Uuid,
        url: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Annotation>, StoreError> {
        let mut records = self.records.lock().await;
        Ok(records.get_mut(&id).map(|existing| {
            existing.tts_url = Some(url.to_string());
            existing.updated_at = now;
            existing.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Annotation>, StoreError> {
        Ok(self.records.lock().await.remove(&id))
    }

    async fn list(
        &self,
        filter: &AnnotationFilter,
        window: PageWindow,
    ) -> Result<Vec<Annotation>, StoreError> {
        let records = self.records.lock().await;
        let mut matching: Vec<Annotation> =
            records.values().filter(|a| filter.matches(a)).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching
            .into_iter()
            .skip(window.offset as usize)
            .take(window.limit as usize)
            .collect())
    }

    async fn count_by_status(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<(AnnotationStatus, i64)>, StoreError> {
        let records = self.records.lock().await;
        let mut counts: HashMap<&'static str, (AnnotationStatus, i64)> = HashMap::new();
        for a in records.values().filter(|a| a.owner_id == Some(owner_id)) {
            counts.entry(a.status.as_str()).or_insert((a.status, 0)).1 += 1;
        }
        Ok(counts.into_values().collect())
    }
}
