//! Speech/asset publisher: turns annotation text into audio and stores audio and
//! image bytes in object storage, handing back public URLs.

pub mod aws;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Longest text a single synthesis request accepts.
pub const MAX_SPEECH_CHARS: usize = 3000;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("object storage request failed: {0}")]
    Storage(String),

    #[error("no speakable text after cleanup")]
    EmptyText,

    #[error("unsupported image type: {0}")]
    UnsupportedImage(String),
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Synthesizes MP3 audio for `text`, which must fit in one request.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, PublishError>;

    /// Stores `bytes` under `key` and returns the object's public URL.
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, PublishError>;

    async fn delete_object(&self, key: &str) -> Result<(), PublishError>;

    /// Cheap reachability check for the status endpoint.
    async fn probe(&self) -> Result<(), PublishError>;

    /// Prefix every public URL produced by `put_object` starts with.
    fn public_base(&self) -> &str;

    /// Maps a public URL back to its object key, if it was published here.
    fn key_from_url(&self, url: &str) -> Option<String> {
        let base = self.public_base().trim_end_matches('/');
        url.strip_prefix(base)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }

    /// Cleans `text`, synthesizes it chunk by chunk and stores the joined MP3.
    async fn publish_speech(&self, id: Uuid, text: &str) -> Result<String, PublishError> {
        let cleaned = clean_text_for_speech(text);
        if cleaned.is_empty() {
            return Err(PublishError::EmptyText);
        }

        let chunks = split_for_speech(&cleaned, MAX_SPEECH_CHARS);
        let mut audio = Vec::new();
        for chunk in &chunks {
            audio.extend(self.synthesize(chunk).await?);
        }

        let key = speech_key(id, Utc::now());
        let url = self.put_object(&key, audio, "audio/mpeg").await?;
        info!(
            "Published speech for annotation {id}: {} chunk(s) -> {url}",
            chunks.len()
        );
        Ok(url)
    }

    async fn publish_image(
        &self,
        id: Uuid,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, PublishError> {
        let ext = image_extension(content_type)
            .ok_or_else(|| PublishError::UnsupportedImage(content_type.to_string()))?;
        let key = image_key(id, ext, Utc::now());
        let url = self.put_object(&key, bytes, content_type).await?;
        info!("Published image for annotation {id} -> {url}");
        Ok(url)
    }
}

pub fn speech_key(id: Uuid, at: DateTime<Utc>) -> String {
    format!("tts/{id}_{}.mp3", at.timestamp_micros())
}

pub fn image_key(id: Uuid, ext: &str, at: DateTime<Utc>) -> String {
    format!("images/{id}_{}.{ext}", at.timestamp_micros())
}

pub fn image_extension(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// Content type for an uploaded image, judged by file name.
pub fn image_content_type(file_name: &str) -> Option<&'static str> {
    let ext = file_name.rsplit_once('.')?.1.to_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Prepares annotation text for a speech engine: markdown-ish line prefixes are
/// dropped, whitespace collapses, and every line ends as a terminated sentence
/// so paragraph breaks are read as pauses.
pub fn clean_text_for_speech(text: &str) -> String {
    text.lines()
        .map(|line| {
            let line = line
                .trim()
                .trim_start_matches('#')
                .trim_start_matches(['-', '*', '•'])
                .trim();
            line.split_whitespace().collect::<Vec<_>>().join(" ")
        })
        .filter(|line| !line.is_empty())
        .map(|mut line| {
            if !line.ends_with(['.', '!', '?', ':', ';']) {
                line.push('.');
            }
            line
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits `text` into chunks of at most `max_chars` characters, breaking on
/// sentence ends where possible and on word boundaries otherwise.
pub fn split_for_speech(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in sentences(text) {
        for piece in wrap_words(sentence, max_chars) {
            append_bounded(&mut chunks, &mut current, &piece, max_chars);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') && chars.peek().map_or(true, |(_, n)| n.is_whitespace()) {
            let end = i + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            start = end;
        }
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        out.push(rest);
    }
    out
}

fn wrap_words(sentence: &str, max_chars: usize) -> Vec<String> {
    if sentence.chars().count() <= max_chars {
        return vec![sentence.to_string()];
    }
    let mut pieces = Vec::new();
    let mut current = String::new();
    for word in sentence.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        for part in chars.chunks(max_chars) {
            let part: String = part.iter().collect();
            append_bounded(&mut pieces, &mut current, &part, max_chars);
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Appends `piece` to `current` (space separated), first flushing `current`
/// into `out` if the result would exceed `max_chars`.
fn append_bounded(out: &mut Vec<String>, current: &mut String, piece: &str, max_chars: usize) {
    let len = current.chars().count();
    if len > 0 && len + 1 + piece.chars().count() > max_chars {
        out.push(std::mem::take(current));
    }
    if !current.is_empty() {
        current.push(' ');
    }
    current.push_str(piece);
}

#[cfg(test)]
pub mod testing {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    pub const BASE: &str = "https://assets.test";

    /// Records every call; synthesis returns the chunk text as bytes.
    #[derive(Default)]
    pub struct RecordingPublisher {
        pub synth_calls: AtomicUsize,
        pub stored: Mutex<Vec<(String, usize, String)>>,
        pub deleted: Mutex<Vec<String>>,
        pub fail_synthesis: bool,
    }

    impl RecordingPublisher {
        pub fn failing() -> Self {
            Self {
                fail_synthesis: true,
                ..Default::default()
            }
        }

        pub fn synth_count(&self) -> usize {
            self.synth_calls.load(Ordering::SeqCst)
        }

        pub fn stored_keys(&self) -> Vec<String> {
            self.stored
                .lock()
                .unwrap()
                .iter()
                .map(|(k, _, _)| k.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn synthesize(&self, text: &str) -> Result<Vec<u8>, PublishError> {
            self.synth_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_synthesis {
                return Err(PublishError::Synthesis("voice unavailable".into()));
            }
            Ok(text.as_bytes().to_vec())
        }

        async fn put_object(
            &self,
            key: &str,
            bytes: Vec<u8>,
            content_type: &str,
        ) -> Result<String, PublishError> {
            self.stored
                .lock()
                .unwrap()
                .push((key.to_string(), bytes.len(), content_type.to_string()));
            Ok(format!("{BASE}/{key}"))
        }

        async fn delete_object(&self, key: &str) -> Result<(), PublishError> {
            self.deleted.lock().unwrap().push(key.to_string());
            Ok(())
        }

        async fn probe(&self) -> Result<(), PublishError> {
            Ok(())
        }

        fn public_base(&self) -> &str {
            BASE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingPublisher;
    use super::*;

    #[test]
    fn test_clean_text_terminates_lines_and_strips_markers() {
        let cleaned = clean_text_for_speech("# Overview\n\n- cats   purr\nDogs bark!\n");
        assert_eq!(cleaned, "Overview. cats purr. Dogs bark!");
    }

    #[test]
    fn test_clean_text_of_blank_input_is_empty() {
        assert_eq!(clean_text_for_speech(" \n\n\t"), "");
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        assert_eq!(
            split_for_speech("One. Two.", MAX_SPEECH_CHARS),
            vec!["One. Two.".to_string()]
        );
    }

    #[test]
    fn test_chunks_break_on_sentences_and_respect_limit() {
        let text = "Alpha beta. Gamma delta. Epsilon zeta.";
        let chunks = split_for_speech(text, 25);
        assert_eq!(chunks, vec!["Alpha beta. Gamma delta.", "Epsilon zeta."]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 25));
    }

    #[test]
    fn test_overlong_sentence_is_wrapped_on_words() {
        let chunks = split_for_speech("aaaa bbbb cccc dddd", 9);
        assert_eq!(chunks, vec!["aaaa bbbb", "cccc dddd"]);
    }

    #[test]
    fn test_overlong_word_is_cut() {
        let chunks = split_for_speech("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_keys_are_namespaced_and_timestamped() {
        let id = Uuid::nil();
        let at = DateTime::from_timestamp(1_700_000_000, 123_456_000).unwrap();
        assert_eq!(
            speech_key(id, at),
            format!("tts/{id}_1700000000123456.mp3")
        );
        assert_eq!(
            image_key(id, "png", at),
            format!("images/{id}_1700000000123456.png")
        );
    }

    #[test]
    fn test_image_types() {
        assert_eq!(image_content_type("cover.JPEG"), Some("image/jpeg"));
        assert_eq!(image_content_type("cover.bmp"), None);
        assert_eq!(image_content_type("cover"), None);
        assert_eq!(image_extension("image/webp"), Some("webp"));
    }

    #[test]
    fn test_key_from_url_only_accepts_own_base() {
        let publisher = RecordingPublisher::default();
        assert_eq!(
            publisher.key_from_url("https://assets.test/tts/a.mp3"),
            Some("tts/a.mp3".to_string())
        );
        assert_eq!(publisher.key_from_url("https://elsewhere.test/tts/a.mp3"), None);
        assert_eq!(publisher.key_from_url("https://assets.test/"), None);
    }

    #[tokio::test]
    async fn test_publish_speech_stores_mp3_under_tts_prefix() {
        let publisher = RecordingPublisher::default();
        let id = Uuid::new_v4();
        let url = publisher.publish_speech(id, "Cats purr").await.unwrap();

        assert!(url.starts_with(&format!("https://assets.test/tts/{id}_")));
        assert!(url.ends_with(".mp3"));
        assert_eq!(publisher.synth_count(), 1);
        let stored = publisher.stored.lock().unwrap();
        assert_eq!(stored[0].2, "audio/mpeg");
        assert_eq!(stored[0].1, "Cats purr.".len());
    }

    #[tokio::test]
    async fn test_publish_speech_synthesizes_each_chunk() {
        let publisher = RecordingPublisher::default();
        let sentence = format!("{}.", "word ".repeat(400).trim_end());
        let text = vec![sentence; 4].join(" ");
        publisher.publish_speech(Uuid::new_v4(), &text).await.unwrap();
        assert!(publisher.synth_count() >= 2);
    }

    #[tokio::test]
    async fn test_publish_speech_rejects_blank_text() {
        let publisher = RecordingPublisher::default();
        let err = publisher
            .publish_speech(Uuid::new_v4(), "  \n ")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::EmptyText));
        assert_eq!(publisher.synth_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_image_rejects_unknown_type() {
        let publisher = RecordingPublisher::default();
        let err = publisher
            .publish_image(Uuid::new_v4(), vec![1, 2, 3], "image/bmp")
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::UnsupportedImage(_)));
        assert!(publisher.stored_keys().is_empty());
    }
}
