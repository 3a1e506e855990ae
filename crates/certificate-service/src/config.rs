//! Configuration management for the Certificate Service
//!
//! Loads configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use std::env;

use crate::artifact_store::S3Config;
use crate::notifier::{DEFAULT_FROM, DEFAULT_POSTMARK_URL};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis connection URL
    pub redis_url: String,

    /// API server host
    pub api_host: String,

    /// API server port
    pub api_port: u16,

    /// Keep records and certificates in memory instead of Redis and S3
    pub mock_mode: bool,

    /// Number of concurrent pipeline workers
    pub num_workers: usize,

    /// Bucket holding generated certificates
    pub certificate_bucket: Option<String>,

    /// S3 region override
    pub aws_region: Option<String>,

    /// S3-compatible endpoint override
    pub s3_endpoint: Option<String>,

    /// Use path-style bucket addressing
    pub s3_force_path_style: bool,

    /// Postmark server token. Unset means email delivery is not configured.
    pub postmark_api_key: Option<String>,

    /// Postmark API base URL
    pub postmark_api_url: String,

    /// Sender for certificate emails
    pub email_from: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        let config = Config {
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),

            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),

            api_port: env::var("API_PORT")
                .unwrap_or_else(|_| "8090".to_string())
                .parse()
                .context("Invalid API_PORT")?,

            mock_mode: env::var("MOCK_MODE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .context("Invalid MOCK_MODE (expected true/false)")?,

            num_workers: env::var("NUM_WORKERS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .context("Invalid NUM_WORKERS")?,

            certificate_bucket: non_empty_var("CERTIFICATE_BUCKET"),
            aws_region: non_empty_var("AWS_REGION"),
            s3_endpoint: non_empty_var("S3_ENDPOINT"),

            s3_force_path_style: env::var("S3_FORCE_PATH_STYLE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .context("Invalid S3_FORCE_PATH_STYLE (expected true/false)")?,

            postmark_api_key: non_empty_var("POSTMARK_API_KEY"),

            postmark_api_url: env::var("POSTMARK_API_URL")
                .unwrap_or_else(|_| DEFAULT_POSTMARK_URL.to_string()),

            email_from: env::var("EMAIL_FROM").unwrap_or_else(|_| DEFAULT_FROM.to_string()),
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.api_port == 0 {
            anyhow::bail!("API_PORT must be greater than 0");
        }

        if self.num_workers == 0 {
            anyhow::bail!("NUM_WORKERS must be greater than 0");
        }

        if !self.mock_mode && self.certificate_bucket.is_none() {
            anyhow::bail!("CERTIFICATE_BUCKET is required when MOCK_MODE=false");
        }

        Ok(())
    }

    /// Get the API server address
    pub fn api_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    /// Object store settings, when a bucket is configured
    pub fn s3(&self) -> Option<S3Config> {
        self.certificate_bucket.as_ref().map(|bucket| S3Config {
            bucket: bucket.clone(),
            region: self.aws_region.clone(),
            endpoint: self.s3_endpoint.clone(),
            force_path_style: self.s3_force_path_style,
        })
    }
}

/// Blank values count as unset
fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
