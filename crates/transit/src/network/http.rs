//! HTTP feed source backed by `reqwest`.

use std::future::Future;
use std::pin::Pin;

use bytes::{Bytes, BytesMut};

use crate::config::FeedGroup;
use crate::models::types::FeedError;
use crate::network::traits::FeedSource;

/// Upper bound on a single payload (32 MB)
const MAX_FEED_BYTES: usize = 32 * 1024 * 1024;

const API_KEY_HEADER: &str = "x-api-key";

pub struct HttpFeedSource {
    client: reqwest::Client,
    api_key: Option<String>,
    max_bytes: usize,
}

impl HttpFeedSource {
    pub fn new(api_key: Option<String>) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("subway-transit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FeedError::Fetch(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, api_key))
    }

    pub fn with_client(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key: api_key.filter(|key| !key.is_empty()),
            max_bytes: MAX_FEED_BYTES,
        }
    }

    /// Caps the size of a single payload.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    async fn fetch_bytes(&self, group: &FeedGroup) -> Result<Bytes, FeedError> {
        let mut request = self.client.get(&group.url);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let mut response = request
            .send()
            .await
            .map_err(|e| FeedError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Fetch(format!("HTTP {status}")));
        }

        let max = self.max_bytes;
        if let Some(declared) = response.content_length() {
            if declared > max as u64 {
                return Err(FeedError::Fetch(format!(
                    "payload too large: {declared} bytes (max {max})"
                )));
            }
        }

        // Content-Length may be absent or understated.
        let mut body = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FeedError::Fetch(e.to_string()))?
        {
            if body.len() + chunk.len() > max {
                return Err(FeedError::Fetch(format!(
                    "payload too large: over {max} bytes"
                )));
            }
            body.extend_from_slice(&chunk);
        }

        tracing::debug!(group = %group.id, bytes = body.len(), "fetched feed");
        Ok(body.freeze())
    }
}

impl FeedSource for HttpFeedSource {
    fn fetch<'a>(
        &'a self,
        group: &'a FeedGroup,
    ) -> Pin<Box<dyn Future<Output = Result<Bytes, FeedError>> + Send + 'a>> {
        Box::pin(self.fetch_bytes(group))
    }
}
