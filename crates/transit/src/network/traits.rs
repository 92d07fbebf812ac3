//! Pluggable feed fetching.
//!
//! The façade only sees this trait, so tests and alternative transports
//! supply their own implementation.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use crate::config::FeedGroup;
use crate::models::types::FeedError;

/// Fetch the raw realtime payload for one feed group
pub trait FeedSource: Send + Sync {
    fn fetch<'a>(
        &'a self,
        group: &'a FeedGroup,
    ) -> Pin<Box<dyn Future<Output = Result<Bytes, FeedError>> + Send + 'a>>;
}
