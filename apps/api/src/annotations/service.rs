//! Annotation orchestrator: drives extraction → generation → persistence for an
//! upload, and owns the record's status transitions.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::annotations::generator::AnnotationGenerator;
use crate::annotations::models::{
    Annotation, AnnotationFilter, AnnotationPatch, AnnotationStats, PageWindow, Patch,
    TransitionError,
};
use crate::annotations::store::{AnnotationStore, StoreError};
use crate::extraction::{ExtractError, ExtractorRegistry};
use crate::llm_client::LlmError;
use crate::progress::{ProgressEvent, ProgressHub, Stage};
use crate::publisher::{clean_text_for_speech, PublishError, Publisher};

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("annotation {0} not found")]
    NotFound(Uuid),

    #[error("annotation {0} has no text to convert to speech")]
    EmptyBody(Uuid),

    #[error("{0}")]
    Validation(String),

    #[error("speech and storage publisher is not configured")]
    PublisherUnavailable,

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("annotation {id} failed: {source}")]
    Extraction { id: Uuid, source: ExtractError },

    #[error("annotation {id} failed: {source}")]
    Generation { id: Uuid, source: LlmError },

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Image attached to an upload.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    None,
    Url(String),
    Upload { bytes: Vec<u8>, content_type: String },
}

#[derive(Debug, Clone)]
pub struct NewAnnotation {
    pub owner_id: Option<Uuid>,
    pub title: String,
    pub image: ImageSource,
    pub file: Vec<u8>,
    pub file_type: String,
}

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendStatus {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub models: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BackendStatus {
    pub const OK: &'static str = "OK";
    pub const ERROR: &'static str = "Error";
    pub const NOT_CONFIGURED: &'static str = "Not Configured";

    fn ok(models: Option<Vec<String>>) -> Self {
        Self {
            status: Self::OK,
            models,
            error: None,
        }
    }

    fn error(message: String) -> Self {
        Self {
            status: Self::ERROR,
            models: None,
            error: Some(message),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Self::OK
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServicesStatus {
    pub generator: BackendStatus,
    pub publisher: BackendStatus,
}

impl ServicesStatus {
    pub fn all_ok(&self) -> bool {
        self.generator.is_ok() && self.publisher.is_ok()
    }
}

pub struct AnnotationService {
    store: Arc<dyn AnnotationStore>,
    generator: AnnotationGenerator,
    extractors: ExtractorRegistry,
    publisher: Option<Arc<dyn Publisher>>,
    progress: Arc<ProgressHub>,
    cleanup_assets: bool,
}

impl AnnotationService {
    pub fn new(
        store: Arc<dyn AnnotationStore>,
        generator: AnnotationGenerator,
        extractors: ExtractorRegistry,
        publisher: Option<Arc<dyn Publisher>>,
        progress: Arc<ProgressHub>,
    ) -> Self {
        Self {
            store,
            generator,
            extractors,
            publisher,
            progress,
            cleanup_assets: false,
        }
    }

    /// Best-effort removal of published audio/image objects when a record is deleted.
    pub fn with_asset_cleanup(mut self, enabled: bool) -> Self {
        self.cleanup_assets = enabled;
        self
    }

    fn publisher(&self) -> Result<&Arc<dyn Publisher>, AnnotationError> {
        self.publisher
            .as_ref()
            .ok_or(AnnotationError::PublisherUnavailable)
    }

    fn notify(&self, owner_id: Option<Uuid>, event: ProgressEvent) {
        if let Some(owner) = owner_id {
            self.progress.publish(owner, event);
        }
    }

    /// Runs the full upload pipeline synchronously. Extraction and generation
    /// failures are persisted on the record before the error is returned.
    pub async fn create_annotation(
        &self,
        input: NewAnnotation,
    ) -> Result<Annotation, AnnotationError> {
        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(AnnotationError::Validation("title is required".into()));
        }

        let id = Uuid::new_v4();
        let image = match input.image {
            ImageSource::None => None,
            ImageSource::Url(url) => Some(url),
            ImageSource::Upload {
                bytes,
                content_type,
            } => Some(
                self.publisher()?
                    .publish_image(id, bytes, &content_type)
                    .await?,
            ),
        };

        let mut record = Annotation::processing(
            id,
            input.owner_id,
            title,
            image,
            input.file_type.trim().to_lowercase(),
            Utc::now(),
        );
        self.store.insert(&record).await?;
        info!("Allocated annotation {id} for '{}'", record.title);
        self.notify(
            record.owner_id,
            ProgressEvent::new(id, Stage::Allocated, "Upload received"),
        );

        let text = match self.extract(&input.file_type, input.file).await {
            Ok(text) => text,
            Err(source) => {
                self.record_failure(&mut record, source.to_string()).await;
                return Err(AnnotationError::Extraction { id, source });
            }
        };
        info!("Extracted {} chars of text for annotation {id}", text.len());
        record.text_content = text;
        self.notify(
            record.owner_id,
            ProgressEvent::new(id, Stage::Extracted, "Text extracted"),
        );

        let generated = match self.generator.generate(&record.text_content, &record.title).await {
            Ok(generated) => generated,
            Err(source) => {
                self.record_failure(&mut record, source.to_string()).await;
                return Err(AnnotationError::Generation { id, source });
            }
        };
        self.notify(
            record.owner_id,
            ProgressEvent::new(id, Stage::Generated, "Annotation generated"),
        );

        let mut completed = record.clone();
        completed.complete(generated.body, generated.genre, Utc::now())?;
        if let Err(e) = self.store.save_outcome(&completed).await {
            self.record_failure(&mut record, format!("failed to save annotation: {e}"))
                .await;
            return Err(e.into());
        }
        let record = completed;
        info!("Annotation {id} completed (genre: {})", record.genre);
        self.notify(
            record.owner_id,
            ProgressEvent::new(id, Stage::Completed, "Annotation ready"),
        );
        Ok(record)
    }

    async fn extract(&self, file_type: &str, file: Vec<u8>) -> Result<String, ExtractError> {
        let extractor = self.extractors.get(file_type)?;
        tokio::task::spawn_blocking(move || extractor.extract(&file))
            .await
            .map_err(|e| ExtractError::ExtractionFailed(format!("extraction task failed: {e}")))?
    }

    /// Marks the record failed and persists it. A persistence error here is
    /// logged; the caller still reports the pipeline error.
    async fn record_failure(&self, record: &mut Annotation, message: String) {
        warn!("Annotation {} failed: {message}", record.id);
        if let Err(e) = record.fail(message.clone(), Utc::now()) {
            error!("Annotation {} could not be marked failed: {e}", record.id);
            return;
        }
        if let Err(e) = self.store.save_outcome(record).await {
            error!("Failed to persist failure of annotation {}: {e}", record.id);
        }
        self.notify(record.owner_id, ProgressEvent::failed(record.id, message));
    }

    pub async fn get(&self, id: Uuid) -> Result<Annotation, AnnotationError> {
        self.store
            .get(id)
            .await?
            .ok_or(AnnotationError::NotFound(id))
    }

    /// Synthesizes the annotation body and stores the new audio URL on the record.
    /// Every call publishes a fresh object and overwrites the stored URL.
    pub async fn generate_speech(&self, id: Uuid) -> Result<Annotation, AnnotationError> {
        let record = self.get(id).await?;
        if clean_text_for_speech(&record.annotation).is_empty() {
            return Err(AnnotationError::EmptyBody(id));
        }
        let publisher = self.publisher()?;

        let url = publisher.publish_speech(id, &record.annotation).await?;
        let updated = self
            .store
            .set_tts_url(id, &url, Utc::now())
            .await?
            .ok_or(AnnotationError::NotFound(id))?;
        info!("Stored speech URL for annotation {id}: {url}");
        Ok(updated)
    }

    pub async fn update_annotation(
        &self,
        id: Uuid,
        mut patch: AnnotationPatch,
        image: Option<ImageUpload>,
    ) -> Result<Annotation, AnnotationError> {
        patch.validate().map_err(AnnotationError::Validation)?;

        if let Some(upload) = image {
            // Check the record first so a missing ID never leaves an orphaned object.
            self.get(id).await?;
            let url = self
                .publisher()?
                .publish_image(id, upload.bytes, &upload.content_type)
                .await?;
            patch.image = Patch::Set(Some(url));
        }

        self.store
            .update(id, patch, Utc::now())
            .await?
            .ok_or(AnnotationError::NotFound(id))
    }

    pub async fn delete_annotation(&self, id: Uuid) -> Result<Annotation, AnnotationError> {
        let deleted = self
            .store
            .delete(id)
            .await?
            .ok_or(AnnotationError::NotFound(id))?;
        info!("Deleted annotation {id}");

        if self.cleanup_assets {
            if let Some(publisher) = &self.publisher {
                spawn_asset_cleanup(publisher.clone(), &deleted);
            }
        }
        Ok(deleted)
    }

    pub async fn list_annotations(
        &self,
        filter: &AnnotationFilter,
        window: PageWindow,
    ) -> Result<Vec<Annotation>, AnnotationError> {
        Ok(self.store.list(filter, window).await?)
    }

    pub async fn stats(&self, owner_id: Uuid) -> Result<AnnotationStats, AnnotationError> {
        let counts = self.store.count_by_status(owner_id).await?;
        Ok(AnnotationStats::from_counts(counts))
    }

    /// Probes the text-generation backend and, when configured, the publisher.
    pub async fn check_services(&self) -> ServicesStatus {
        let generator = match self.generator.backend().available_models().await {
            Ok(models) => BackendStatus::ok(Some(models)),
            Err(e) => BackendStatus::error(e.to_string()),
        };

        let publisher = match &self.publisher {
            None => BackendStatus {
                status: BackendStatus::NOT_CONFIGURED,
                models: None,
                error: None,
            },
            Some(publisher) => match publisher.probe().await {
                Ok(()) => BackendStatus::ok(None),
                Err(e) => BackendStatus::error(e.to_string()),
            },
        };

        ServicesStatus {
            generator,
            publisher,
        }
    }
}

/// Deletes the record's published objects on a detached task. Only the outcome
/// is logged; URLs outside the publisher's base are left alone.
fn spawn_asset_cleanup(publisher: Arc<dyn Publisher>, deleted: &Annotation) {
    let keys: Vec<String> = [deleted.tts_url.as_deref(), deleted.image.as_deref()]
        .into_iter()
        .flatten()
        .filter_map(|url| publisher.key_from_url(url))
        .collect();
    if keys.is_empty() {
        return;
    }

    let id = deleted.id;
    tokio::spawn(async move {
        for key in keys {
            match publisher.delete_object(&key).await {
                Ok(()) => info!("Removed asset {key} of deleted annotation {id}"),
                Err(e) => warn!("Could not remove asset {key} of deleted annotation {id}: {e}"),
            }
        }
    });
}
