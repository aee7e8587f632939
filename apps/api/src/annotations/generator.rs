//! Annotation generator: prompt the text model and parse `(genre, body)` from its output.
//!
//! Parsing never fails: output without a leading `GENRE:` line keeps the whole
//! response as the body and falls back to the default genre.

use std::sync::Arc;

use tracing::info;

use crate::annotations::models::DEFAULT_GENRE;
use crate::annotations::prompts::{annotation_prompt, GENRE_PREFIX};
use crate::llm_client::{LlmError, TextGenerator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedAnnotation {
    pub genre: String,
    pub body: String,
}

#[derive(Clone)]
pub struct AnnotationGenerator {
    backend: Arc<dyn TextGenerator>,
}

impl AnnotationGenerator {
    pub fn new(backend: Arc<dyn TextGenerator>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn TextGenerator> {
        &self.backend
    }

    pub async fn generate(&self, text: &str, title: &str) -> Result<GeneratedAnnotation, LlmError> {
        let prompt = annotation_prompt(title, text);
        let response = self.backend.complete(&prompt).await?;
        if response.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        let parsed = parse_response(&response);
        info!(
            "Generated annotation of {} chars, genre: {}",
            parsed.body.len(),
            parsed.genre
        );
        Ok(parsed)
    }
}

/// Splits a model response into genre label and body.
pub fn parse_response(response: &str) -> GeneratedAnnotation {
    let response = response.trim();
    let fallback = || GeneratedAnnotation {
        genre: DEFAULT_GENRE.to_string(),
        body: response.to_string(),
    };

    let (first_line, rest) = response.split_once('\n').unwrap_or((response, ""));
    let Some(label) = first_line.trim().strip_prefix(GENRE_PREFIX) else {
        return fallback();
    };

    let genre = match label.trim() {
        "" => DEFAULT_GENRE.to_string(),
        label => label.to_string(),
    };
    let body = rest.trim();
    if body.is_empty() {
        // A bare genre line is all the model produced; keep it rather than store nothing.
        return GeneratedAnnotation {
            genre,
            body: response.to_string(),
        };
    }

    GeneratedAnnotation {
        genre,
        body: body.to_string(),
    }
}
