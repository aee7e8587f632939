use anyhow::{Context, Result};

const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_MODEL: &str = "mistral";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub port: u16,
    pub rust_log: String,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub ollama_timeout_secs: u64,
    pub max_upload_bytes: usize,
    /// Present only when bucket and credentials are all set.
    pub aws: Option<AwsConfig>,
    pub cleanup_assets_on_delete: bool,
}

/// Object storage + speech synthesis settings.
#[derive(Debug, Clone)]
pub struct AwsConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
    pub bucket: String,
    /// MinIO / local S3 endpoint. Applies to object storage only.
    pub s3_endpoint: Option<String>,
    pub public_base_url: Option<String>,
    pub polly_voice_id: String,
    pub polly_engine: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            jwt_secret: require_env("JWT_SECRET")?,
            port: parse_env("PORT", 8080u16).context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            ollama_base_url: env_or("OLLAMA_BASE_URL", DEFAULT_OLLAMA_BASE_URL),
            ollama_model: env_or("OLLAMA_MODEL", DEFAULT_OLLAMA_MODEL),
            ollama_timeout_secs: parse_env("OLLAMA_TIMEOUT_SECS", 300u64)
                .context("OLLAMA_TIMEOUT_SECS must be a number of seconds")?,
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)
                .context("MAX_UPLOAD_BYTES must be a byte count")?,
            aws: AwsConfig::from_env(),
            cleanup_assets_on_delete: parse_env("CLEANUP_ASSETS_ON_DELETE", false)
                .context("CLEANUP_ASSETS_ON_DELETE must be true or false")?,
        })
    }
}

impl AwsConfig {
    fn from_env() -> Option<Self> {
        let bucket = optional_env("S3_BUCKET")?;
        let access_key_id = optional_env("AWS_ACCESS_KEY_ID")?;
        let secret_access_key = optional_env("AWS_SECRET_ACCESS_KEY")?;

        Some(AwsConfig {
            access_key_id,
            secret_access_key,
            region: env_or("AWS_REGION", "us-east-1"),
            bucket,
            s3_endpoint: optional_env("S3_ENDPOINT"),
            public_base_url: optional_env("S3_PUBLIC_BASE_URL"),
            polly_voice_id: env_or("POLLY_VOICE_ID", "Joanna"),
            polly_engine: env_or("POLLY_ENGINE", "neural"),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Unset and empty are treated the same.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    optional_env(key).unwrap_or_else(|| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Invalid value '{raw}' for '{key}'")),
        None => Ok(default),
    }
}
