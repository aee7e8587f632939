use axum::{
    async_trait,
    extract::{multipart::Field, FromRequest, Multipart, Path, Query, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::annotations::models::{
    Annotation, AnnotationFilter, AnnotationPatch, AnnotationStats, AnnotationStatus, PageWindow,
    Patch,
};
use crate::annotations::service::{ImageSource, ImageUpload, NewAnnotation};
use crate::auth::extractor::AuthUser;
use crate::auth::roles::Capability;
use crate::errors::AppError;
use crate::publisher::image_content_type;
use crate::response::{self, ApiResult};
use crate::state::AppState;

fn bad_multipart(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::Validation(format!("Malformed multipart body: {e}"))
}

async fn read_text(field: Field<'_>) -> Result<String, AppError> {
    field.text().await.map_err(bad_multipart)
}

/// Reads an image part. Empty parts (no file chosen) yield `None`.
async fn read_image(field: Field<'_>) -> Result<Option<ImageUpload>, AppError> {
    let file_name = field.file_name().unwrap_or_default().to_string();
    let bytes = field.bytes().await.map_err(bad_multipart)?;
    if bytes.is_empty() {
        return Ok(None);
    }
    let content_type = image_content_type(&file_name).ok_or_else(|| {
        AppError::Validation(
            "Only image files are allowed (jpg, jpeg, png, gif, webp)".to_string(),
        )
    })?;
    Ok(Some(ImageUpload {
        bytes: bytes.to_vec(),
        content_type: content_type.to_string(),
    }))
}

// ────────────────────────────────────────────────────────────────────────────
// Upload
// ────────────────────────────────────────────────────────────────────────────

/// POST /annotations/upload
///
/// Multipart fields: `title`, `file` (.pdf), and optionally `image` (file) or `image_url`.
/// Holds the connection open until extraction and generation finish.
pub async fn upload(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> ApiResult<Annotation> {
    user.require(Capability::CreateAnnotations)?;

    let mut title = None;
    let mut image_url = None;
    let mut image = None;
    let mut document = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => title = Some(read_text(field).await?),
            "image_url" => image_url = Some(read_text(field).await?),
            "image" => image = read_image(field).await?,
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                document = Some((file_name, bytes));
            }
            _ => {}
        }
    }

    let title = title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Validation("Title is required".into()))?;
    let (file_name, bytes) = document
        .filter(|(_, bytes)| !bytes.is_empty())
        .ok_or_else(|| AppError::Validation("A PDF file is required".into()))?;
    let file_type = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| ext == "pdf")
        .ok_or_else(|| AppError::Validation("Only PDF files are allowed".into()))?;

    let image = match (image, image_url.filter(|u| !u.trim().is_empty())) {
        (Some(upload), _) => ImageSource::Upload {
            bytes: upload.bytes,
            content_type: upload.content_type,
        },
        (None, Some(url)) => ImageSource::Url(url.trim().to_string()),
        (None, None) => ImageSource::None,
    };

    let annotation = state
        .annotations
        .create_annotation(NewAnnotation {
            owner_id: Some(user.id),
            title,
            image,
            file: bytes.to_vec(),
            file_type,
        })
        .await?;

    response::created("Annotation created successfully", annotation)
}

// ────────────────────────────────────────────────────────────────────────────
// Read
// ────────────────────────────────────────────────────────────────────────────

/// Raw query parameters; malformed paging values fall back to defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub status: Option<String>,
    pub genre: Option<String>,
    pub owner_id: Option<String>,
}

impl ListQuery {
    fn into_parts(self) -> Result<(AnnotationFilter, PageWindow), AppError> {
        let window = PageWindow::new(
            self.limit.and_then(|l| l.trim().parse().ok()),
            self.offset.and_then(|o| o.trim().parse().ok()),
        );

        let status = non_blank(self.status)
            .map(|s| s.parse::<AnnotationStatus>())
            .transpose()
            .map_err(AppError::Validation)?;
        let owner_id = non_blank(self.owner_id)
            .map(|id| Uuid::parse_str(&id))
            .transpose()
            .map_err(|_| AppError::Validation("owner_id must be a UUID".into()))?;

        Ok((
            AnnotationFilter {
                owner_id,
                status,
                genre: non_blank(self.genre),
            },
            window,
        ))
    }
}

fn form_patch(value: String) -> Patch<String> {
    match non_blank(Some(value)) {
        Some(v) => Patch::Set(v),
        None => Patch::Unset,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct AnnotationList {
    pub annotations: Vec<Annotation>,
    pub pagination: Pagination,
}

/// GET /annotations
pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<AnnotationList> {
    user.require(Capability::ViewAnnotations)?;
    let (filter, window) = query.into_parts()?;

    let annotations = state.annotations.list_annotations(&filter, window).await?;
    let pagination = Pagination {
        limit: window.limit,
        offset: window.offset,
        count: annotations.len(),
    };
    response::ok(
        "Annotations retrieved successfully",
        AnnotationList {
            annotations,
            pagination,
        },
    )
}

/// GET /annotations/:id
pub async fn get_one(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Annotation> {
    user.require(Capability::ViewAnnotations)?;
    let annotation = state.annotations.get(id).await?;
    response::ok("Annotation retrieved successfully", annotation)
}

/// GET /annotations/stats
pub async fn stats(State(state): State<AppState>, user: AuthUser) -> ApiResult<AnnotationStats> {
    user.require(Capability::ViewStats)?;
    let stats = state.annotations.stats(user.id).await?;
    response::ok("Stats retrieved successfully", stats)
}

// ────────────────────────────────────────────────────────────────────────────
// Update / delete
// ────────────────────────────────────────────────────────────────────────────

/// PATCH body: JSON `AnnotationPatch`, or multipart with `title`, `annotation`,
/// `genre`, `image_url` and an `image` file.
pub struct PatchBody {
    pub patch: AnnotationPatch,
    pub image: Option<ImageUpload>,
}

#[async_trait]
impl FromRequest<AppState> for PatchBody {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(false, |ct| ct.starts_with("multipart/form-data"));

        if !is_multipart {
            let Json(patch) = Json::<AnnotationPatch>::from_request(req, state)
                .await
                .map_err(|e| AppError::Validation(e.body_text()))?;
            return Ok(PatchBody { patch, image: None });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        let mut body = PatchBody {
            patch: AnnotationPatch::default(),
            image: None,
        };
        while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
            let name = field.name().unwrap_or_default().to_string();
            // Forms submit every input; a blank one leaves the field unchanged.
            match name.as_str() {
                "title" => body.patch.title = form_patch(read_text(field).await?),
                "annotation" => body.patch.annotation = form_patch(read_text(field).await?),
                "genre" => body.patch.genre = form_patch(read_text(field).await?),
                "image_url" => {
                    if let Patch::Set(url) = form_patch(read_text(field).await?) {
                        body.patch.image = Patch::Set(Some(url));
                    }
                }
                "image" => body.image = read_image(field).await?,
                _ => {}
            }
        }
        Ok(body)
    }
}

/// PATCH /annotations/:id
pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    body: PatchBody,
) -> ApiResult<Annotation> {
    user.require(Capability::EditAnnotations)?;
    let annotation = state
        .annotations
        .update_annotation(id, body.patch, body.image)
        .await?;
    response::ok("Annotation updated successfully", annotation)
}

/// DELETE /annotations/:id
pub async fn delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Value> {
    user.require(Capability::DeleteAnnotations)?;
    state.annotations.delete_annotation(id).await?;
    response::ok("Annotation deleted successfully", json!({ "id": id }))
}

// ────────────────────────────────────────────────────────────────────────────
// Speech
// ────────────────────────────────────────────────────────────────────────────

/// POST /annotations/:id/tts
pub async fn generate_speech(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Annotation> {
    user.require(Capability::GenerateSpeech)?;
    let annotation = state.annotations.generate_speech(id).await?;
    response::ok("Speech generated successfully", annotation)
}

/// GET /annotations/:id/audio
/// Redirects (302) to the stored audio URL.
pub async fn audio(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    user.require(Capability::ViewAnnotations)?;
    let annotation = state.annotations.get(id).await?;
    let url = annotation
        .tts_url
        .ok_or_else(|| AppError::NotFound(format!("No audio has been generated for annotation {id}")))?;
    Ok((StatusCode::FOUND, [(header::LOCATION, url)]).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> ListQuery {
        let mut q = ListQuery::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "limit" => q.limit = v,
                "offset" => q.offset = v,
                "status" => q.status = v,
                "genre" => q.genre = v,
                "owner_id" => q.owner_id = v,
                _ => unreachable!(),
            }
        }
        q
    }

    #[test]
    fn test_list_query_defaults() {
        let (filter, window) = query(&[]).into_parts().unwrap();
        assert_eq!(filter, AnnotationFilter::default());
        assert_eq!(window, PageWindow { limit: 10, offset: 0 });
    }

    #[test]
    fn test_list_query_malformed_paging_falls_back() {
        let (_, window) = query(&[("limit", "lots"), ("offset", "-3")])
            .into_parts()
            .unwrap();
        assert_eq!(window, PageWindow { limit: 10, offset: 0 });
    }

    #[test]
    fn test_list_query_filters() {
        let owner = Uuid::new_v4();
        let owner_text = owner.to_string();
        let (filter, window) = query(&[
            ("limit", "5"),
            ("status", "failed"),
            ("genre", "Academic"),
            ("owner_id", owner_text.as_str()),
        ])
        .into_parts()
        .unwrap();
        assert_eq!(window.limit, 5);
        assert_eq!(filter.status, Some(AnnotationStatus::Failed));
        assert_eq!(filter.genre.as_deref(), Some("Academic"));
        assert_eq!(filter.owner_id, Some(owner));
    }

    #[test]
    fn test_list_query_rejects_unknown_status() {
        assert!(query(&[("status", "done")]).into_parts().is_err());
        assert!(query(&[("owner_id", "me")]).into_parts().is_err());
    }
}
