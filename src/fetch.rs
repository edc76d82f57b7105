//! Resolve an invoice URL to bytes plus declared content type.

use crate::document::{ContentType, Document};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to fetch image from URL ({0})")]
    Status(reqwest::StatusCode),

    #[error("File type '{content_type}' not allowed. Please provide an image of type: {allowed}", allowed = ContentType::allowed_list())]
    DisallowedContentType { content_type: String },

    #[error("Fetched document exceeds the {limit} byte limit")]
    TooLarge { limit: usize },

    #[error("Failed to fetch image from URL: {0}")]
    Request(#[from] reqwest::Error),
}

/// Downloads caller-supplied document URLs.
#[derive(Clone)]
pub struct UrlFetcher {
    client: Client,
    max_bytes: usize,
}

impl UrlFetcher {
    /// `max_bytes` caps the body, matching the multipart upload limit.
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self, FetchError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            max_bytes,
        })
    }

    pub async fn fetch(&self, url: &str) -> Result<Document, FetchError> {
        info!("Fetching document from {}", url);

        let mut response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if ContentType::from_mime(&content_type).is_none() {
            return Err(FetchError::DisallowedContentType { content_type });
        }

        let limit = self.max_bytes;
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(FetchError::TooLarge { limit });
        }

        let filename = filename_from_url(response.url());

        // Content-Length may be absent or wrong; enforce the cap while reading.
        let mut data = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if data.len() + chunk.len() > limit {
                return Err(FetchError::TooLarge { limit });
            }
            data.extend_from_slice(&chunk);
        }

        debug!("Fetched {} bytes ({})", data.len(), content_type);

        Ok(Document::new(data, content_type, filename))
    }
}

/// Last non-empty path segment of the URL, if any.
fn filename_from_url(url: &reqwest::Url) -> Option<String> {
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(str::to_string)
}
