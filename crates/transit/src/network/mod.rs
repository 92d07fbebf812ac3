//! Upstream feed fetching.

pub mod http;
pub mod traits;

pub use http::HttpFeedSource;
pub use traits::FeedSource;
