//! Branch snapshot download and selective extraction
//!
//! ## Module Organization
//!
//! - `github` - Conditional HEAD/GET of the `archive/refs/heads/<branch>.tar.gz` snapshot
//! - `extract` - Streaming gzip + tar extraction of a single folder

mod extract;
mod github;

pub use extract::{ExtractPlan, ExtractSummary, Placement, extract_archive, extract_stream};
pub use github::{ArchiveDownload, ArchiveFetcher, Freshness, Retrieval};
