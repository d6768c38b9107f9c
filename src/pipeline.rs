//! Resolve → check → download → extract → cache
//!
//! The pipeline is strictly sequential and aborts on the first error. Its
//! progress is tracked as a [`Stage`] so callers and logs can tell where a
//! failure happened.

use std::path::PathBuf;

use log::{debug, info, warn};
use url::Url;

use crate::cache::FreshnessCache;
use crate::config::GhdirConfig;
use crate::download::{
    ArchiveFetcher, ExtractPlan, ExtractSummary, Freshness, Retrieval, extract_stream,
};
use crate::error::{FetchError, GhdirError};
use crate::interaction::Interaction;
use crate::resolve::{RepositoryCoordinates, parse_repository_url};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Resolving,
    CheckingFreshness,
    UpToDate,
    Downloading,
    Extracting,
    CachingResult,
    Done,
    Failed,
}

/// What a successful run did
#[derive(Debug)]
pub enum Outcome {
    /// The server reported the cached snapshot unchanged. Nothing was written.
    UpToDate { coordinates: RepositoryCoordinates },
    /// The user declined a large download
    Aborted {
        coordinates: RepositoryCoordinates,
        declared_size: u64,
    },
    Extracted {
        coordinates: RepositoryCoordinates,
        summary: ExtractSummary,
        destination: PathBuf,
        /// A new validator was recorded in the cache
        validator_cached: bool,
    },
}

pub struct Pipeline<'a> {
    fetcher: ArchiveFetcher,
    cache: FreshnessCache,
    destination: PathBuf,
    default_branch: String,
    large_download_threshold: u64,
    interaction: &'a dyn Interaction,
    stage: Stage,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &GhdirConfig,
        cache: FreshnessCache,
        destination: PathBuf,
        interaction: &'a dyn Interaction,
    ) -> Result<Self, GhdirError> {
        let host = Url::parse(&config.archive_host).map_err(|e| GhdirError::InvalidUrl {
            url: config.archive_host.clone(),
            reason: e.to_string(),
        })?;
        let fetcher = ArchiveFetcher::new(host, &config.user_agent)?;

        Ok(Self {
            fetcher,
            cache,
            destination,
            default_branch: config.default_branch.clone(),
            large_download_threshold: config.large_download_threshold,
            interaction,
            stage: Stage::Init,
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn cache(&self) -> &FreshnessCache {
        &self.cache
    }

    /// Fetch the folder named by `url` into the destination
    pub async fn run(&mut self, url: &str) -> Result<Outcome, GhdirError> {
        match self.run_stages(url).await {
            Ok(outcome) => {
                self.advance(Stage::Done, None);
                Ok(outcome)
            }
            Err(e) => {
                warn!("Pipeline failed during {:?}: {}", self.stage, e);
                self.advance(Stage::Failed, None);
                Err(e)
            }
        }
    }

    async fn run_stages(&mut self, url: &str) -> Result<Outcome, GhdirError> {
        self.advance(Stage::Resolving, None);
        let coordinates = parse_repository_url(url, &self.default_branch)?;

        self.advance(Stage::CheckingFreshness, Some(&coordinates));
        let archive_url = self.fetcher.archive_url(&coordinates)?;
        let key = coordinates.cache_key();
        let validator = self.cache.get(&key).map(str::to_owned);
        debug!("Cache key {key} -> {validator:?}");

        match self.fetcher.check(&archive_url, validator.as_deref()).await? {
            Freshness::NotModified => {
                self.advance(Stage::UpToDate, Some(&coordinates));
                return Ok(Outcome::UpToDate { coordinates });
            }
            Freshness::Changed {
                content_length: Some(size),
            } if size > self.large_download_threshold => {
                if !self.interaction.confirm_large_download(size)? {
                    info!("Large download of {size} bytes declined");
                    return Ok(Outcome::Aborted {
                        coordinates,
                        declared_size: size,
                    });
                }
            }
            Freshness::Changed { .. } => {}
        }

        self.advance(Stage::Downloading, Some(&coordinates));
        let download = match self.fetcher.retrieve(&archive_url, validator.as_deref()).await? {
            Retrieval::NotModified => {
                self.advance(Stage::UpToDate, Some(&coordinates));
                return Ok(Outcome::UpToDate { coordinates });
            }
            Retrieval::Download(download) => download,
        };

        self.advance(Stage::Extracting, Some(&coordinates));
        let new_validator = download.validator.clone();
        let progress = self.interaction.download_progress(download.content_length);
        let plan = ExtractPlan::from_coordinates(&coordinates);
        let summary = extract_stream(
            download.into_reader(),
            plan,
            self.destination.clone(),
            progress,
        )
        .await
        .map_err(|e| match e.into_transfer_failure() {
            Ok(source) => GhdirError::from(FetchError::Body {
                url: archive_url.to_string(),
                source,
            }),
            Err(other) => GhdirError::from(other),
        })?;

        if summary.materialized() == 0 {
            warn!(
                "Nothing matched folder {:?} in {}/{}@{}",
                coordinates.subfolder, coordinates.owner, coordinates.repository, coordinates.branch
            );
        }

        let validator_cached = match new_validator {
            Some(tag) => {
                self.advance(Stage::CachingResult, Some(&coordinates));
                self.cache.insert(key, tag);
                self.cache.save();
                true
            }
            None => false,
        };

        Ok(Outcome::Extracted {
            coordinates,
            summary,
            destination: self.destination.clone(),
            validator_cached,
        })
    }

    fn advance(&mut self, next: Stage, coordinates: Option<&RepositoryCoordinates>) {
        debug!("Stage {:?} -> {:?}", self.stage, next);
        self.stage = next;
        if let Some(coordinates) = coordinates {
            self.interaction.stage_entered(next, coordinates);
        }
    }
}
