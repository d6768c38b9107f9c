//! ghdir: fetch a single folder of a GitHub repository
//!
//! Resolves a browsing URL to a branch snapshot, downloads it only when the
//! cached `ETag` no longer matches, and streams the tarball through a
//! selective extractor that writes just the requested folder.

pub mod cache;
pub mod config;
pub mod download;
pub mod error;
pub mod interaction;
pub mod pipeline;
pub mod resolve;

pub use cache::FreshnessCache;
pub use config::GhdirConfig;
pub use error::{ExtractionError, FetchError, GhdirError};
pub use pipeline::{Outcome, Pipeline, Stage};
pub use resolve::{RepositoryCoordinates, parse_repository_url};
