use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::annotation::AnnotationRow;

/// Genre used when the model output carries no usable `GENRE:` line.
pub const DEFAULT_GENRE: &str = "Other";

pub const DEFAULT_PAGE_LIMIT: i64 = 10;
pub const MAX_PAGE_LIMIT: i64 = 100;

// ────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationStatus {
    Processing,
    Completed,
    Failed,
}

impl AnnotationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationStatus::Processing => "processing",
            AnnotationStatus::Completed => "completed",
            AnnotationStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for AnnotationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnnotationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(AnnotationStatus::Processing),
            "completed" => Ok(AnnotationStatus::Completed),
            "failed" => Ok(AnnotationStatus::Failed),
            other => Err(format!("unknown annotation status '{other}'")),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("annotation is already {0}; only processing records can change status")]
pub struct TransitionError(pub AnnotationStatus);

// ────────────────────────────────────────────────────────────────────────────
// Entity
// ────────────────────────────────────────────────────────────────────────────

/// A generated study-note record derived from an uploaded document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub source_type: String,
    /// Extracted source text. Kept server-side for regeneration; not returned to clients.
    #[serde(skip_serializing)]
    pub text_content: String,
    pub annotation: String,
    pub genre: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts_url: Option<String>,
    pub status: AnnotationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Annotation {
    /// A freshly allocated record: processing, with no text, body or genre yet.
    pub fn processing(
        id: Uuid,
        owner_id: Option<Uuid>,
        title: String,
        image: Option<String>,
        source_type: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            title,
            image,
            source_type,
            text_content: String::new(),
            annotation: String::new(),
            genre: String::new(),
            tts_url: None,
            status: AnnotationStatus::Processing,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// processing → completed. Body and genre must be non-empty.
    pub fn complete(
        &mut self,
        body: String,
        genre: String,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.ensure_processing()?;
        debug_assert!(!body.trim().is_empty() && !genre.trim().is_empty());
        self.annotation = body;
        self.genre = genre;
        self.status = AnnotationStatus::Completed;
        self.error_message = None;
        self.updated_at = now;
        Ok(())
    }

    /// processing → failed, recording why.
    pub fn fail(&mut self, message: String, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.ensure_processing()?;
        self.status = AnnotationStatus::Failed;
        self.error_message = Some(message);
        self.updated_at = now;
        Ok(())
    }

    fn ensure_processing(&self) -> Result<(), TransitionError> {
        match self.status {
            AnnotationStatus::Processing => Ok(()),
            other => Err(TransitionError(other)),
        }
    }
}

impl TryFrom<AnnotationRow> for Annotation {
    type Error = String;

    fn try_from(row: AnnotationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            status: row.status.parse()?,
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            image: row.image,
            source_type: row.source_type,
            text_content: row.text_content,
            annotation: row.annotation,
            genre: row.genre,
            tts_url: row.tts_url,
            error_message: row.error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Partial updates
// ────────────────────────────────────────────────────────────────────────────

/// A field in a partial update: either left alone or replaced.
///
/// Deserializes from a present JSON value as `Set`; pair with `#[serde(default)]`
/// so that an absent key becomes `Unset`. For `Patch<Option<T>>`, an explicit
/// `null` is `Set(None)` (clear the field), distinct from omitting the key.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Patch<T> {
    #[default]
    Unset,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Patch::Set(_))
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            Patch::Set(v) => Some(v),
            Patch::Unset => None,
        }
    }

    pub fn apply(self, target: &mut T) {
        if let Patch::Set(v) = self {
            *target = v;
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Patch::Set)
    }
}

/// Editable fields of an annotation. Status, text and audio are not editable here.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnnotationPatch {
    #[serde(default)]
    pub title: Patch<String>,
    #[serde(default)]
    pub image: Patch<Option<String>>,
    #[serde(default)]
    pub annotation: Patch<String>,
    #[serde(default)]
    pub genre: Patch<String>,
}

impl AnnotationPatch {
    pub fn is_empty(&self) -> bool {
        !(self.title.is_set() || self.image.is_set() || self.annotation.is_set() || self.genre.is_set())
    }

    /// Text fields may be replaced but never blanked.
    pub fn validate(&self) -> Result<(), String> {
        for (name, field) in [
            ("title", &self.title),
            ("annotation", &self.annotation),
            ("genre", &self.genre),
        ] {
            if let Patch::Set(value) = field {
                if value.trim().is_empty() {
                    return Err(format!("{name} cannot be empty"));
                }
            }
        }
        Ok(())
    }

    /// Applies every `Set` field and advances `updated_at`.
    pub fn apply_to(self, annotation: &mut Annotation, now: DateTime<Utc>) {
        self.title.apply(&mut annotation.title);
        self.image.apply(&mut annotation.image);
        self.annotation.apply(&mut annotation.annotation);
        self.genre.apply(&mut annotation.genre);
        annotation.updated_at = now;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Listing and stats
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationFilter {
    pub owner_id: Option<Uuid>,
    pub status: Option<AnnotationStatus>,
    pub genre: Option<String>,
}

impl AnnotationFilter {
    pub fn matches(&self, annotation: &Annotation) -> bool {
        self.owner_id.map_or(true, |o| annotation.owner_id == Some(o))
            && self.status.map_or(true, |s| annotation.status == s)
            && self
                .genre
                .as_deref()
                .map_or(true, |g| annotation.genre == g)
    }
}

/// Limit/offset window. Invalid limits fall back to the default; offsets clamp at 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageWindow {
    pub limit: i64,
    pub offset: i64,
}

impl PageWindow {
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        let limit = match limit {
            Some(l) if l > 0 => l.min(MAX_PAGE_LIMIT),
            _ => DEFAULT_PAGE_LIMIT,
        };
        let offset = offset.filter(|o| *o >= 0).unwrap_or(0);
        Self { limit, offset }
    }
}

impl Default for PageWindow {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AnnotationStats {
    pub total: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

impl AnnotationStats {
    pub fn from_counts(counts: impl IntoIterator<Item = (AnnotationStatus, i64)>) -> Self {
        let mut stats = Self::default();
        for (status, count) in counts {
            match status {
                AnnotationStatus::Processing => stats.processing += count,
                AnnotationStatus::Completed => stats.completed += count,
                AnnotationStatus::Failed => stats.failed += count,
            }
            stats.total += count;
        }
        stats
    }
}
