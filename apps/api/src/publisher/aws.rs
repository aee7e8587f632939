use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_polly::types::{Engine, OutputFormat, VoiceId};
use aws_sdk_s3::{config::Credentials, primitives::ByteStream};
use tracing::debug;

use super::{PublishError, Publisher};
use crate::config::AwsConfig;

/// S3 object storage + Polly speech synthesis.
pub struct AwsPublisher {
    s3: aws_sdk_s3::Client,
    polly: aws_sdk_polly::Client,
    bucket: String,
    public_base: String,
    voice_id: String,
    engine: String,
}

impl AwsPublisher {
    pub async fn new(config: &AwsConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "annotator-static",
        );

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        // A custom endpoint (MinIO, localstack) applies to object storage only.
        let mut s3_config = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.s3_endpoint {
            s3_config = s3_config.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            s3: aws_sdk_s3::Client::from_conf(s3_config.build()),
            polly: aws_sdk_polly::Client::new(&sdk_config),
            bucket: config.bucket.clone(),
            public_base: public_base_url(config),
            voice_id: config.polly_voice_id.clone(),
            engine: config.polly_engine.clone(),
        }
    }
}

/// Explicit base URL, else `{endpoint}/{bucket}` for custom endpoints, else
/// the bucket's virtual-hosted AWS URL.
pub fn public_base_url(config: &AwsConfig) -> String {
    if let Some(base) = &config.public_base_url {
        return base.trim_end_matches('/').to_string();
    }
    match &config.s3_endpoint {
        Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), config.bucket),
        None => format!(
            "https://{}.s3.{}.amazonaws.com",
            config.bucket, config.region
        ),
    }
}

#[async_trait]
impl Publisher for AwsPublisher {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, PublishError> {
        let output = self
            .polly
            .synthesize_speech()
            .text(text)
            .output_format(OutputFormat::Mp3)
            .voice_id(VoiceId::from(self.voice_id.as_str()))
            .engine(Engine::from(self.engine.as_str()))
            .send()
            .await
            .map_err(|e| {
                PublishError::Synthesis(format!(
                    "{}",
                    aws_sdk_polly::error::DisplayErrorContext(&e)
                ))
            })?;

        let audio = output
            .audio_stream
            .collect()
            .await
            .map_err(|e| PublishError::Synthesis(format!("failed to read audio stream: {e}")))?
            .into_bytes();
        debug!("Synthesized {} bytes of audio", audio.len());
        Ok(audio.to_vec())
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, PublishError> {
        self.s3
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                PublishError::Storage(format!(
                    "failed to upload {key}: {}",
                    aws_sdk_s3::error::DisplayErrorContext(&e)
                ))
            })?;

        debug!("Uploaded s3://{}/{}", self.bucket, key);
        Ok(format!("{}/{}", self.public_base, key))
    }

    async fn delete_object(&self, key: &str) -> Result<(), PublishError> {
        self.s3
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                PublishError::Storage(format!(
                    "failed to delete {key}: {}",
                    aws_sdk_s3::error::DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }

    async fn probe(&self) -> Result<(), PublishError> {
        self.s3
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                PublishError::Storage(format!(
                    "bucket {} is not reachable: {}",
                    self.bucket,
                    aws_sdk_s3::error::DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }

    fn public_base(&self) -> &str {
        &self.public_base
    }
}
