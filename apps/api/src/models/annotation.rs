use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct AnnotationRow {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub title: String,
    pub image: Option<String>,
    pub source_type: String,
    pub text_content: String,
    pub annotation: String,
    pub genre: String,
    pub tts_url: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One `GROUP BY status` bucket.
#[derive(Debug, Clone, FromRow)]
pub struct StatusCountRow {
    pub status: String,
    pub count: i64,
}
