//! Conditional retrieval of GitHub branch snapshots

use futures_util::{StreamExt, TryStreamExt};
use reqwest::header::{CONTENT_LENGTH, ETAG, HeaderMap, IF_NONE_MATCH};
use reqwest::{Method, RequestBuilder, StatusCode};
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use url::Url;

use crate::error::{FetchError, FetchPhase, GhdirError};
use crate::resolve::RepositoryCoordinates;

/// Result of the metadata-only check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Server confirmed the cached validator still matches
    NotModified,
    /// A (possibly) newer snapshot exists
    Changed { content_length: Option<u64> },
}

/// Result of the full conditional GET
#[derive(Debug)]
pub enum Retrieval {
    NotModified,
    Download(ArchiveDownload),
}

/// A successful snapshot response whose body has not been read yet
#[derive(Debug)]
pub struct ArchiveDownload {
    /// `ETag` of the response, if the server sent a non-empty one
    pub validator: Option<String>,
    /// Declared body length. Only used to size the progress bar.
    pub content_length: Option<u64>,
    response: reqwest::Response,
}

impl ArchiveDownload {
    /// Body as a lazily pulled byte stream
    pub fn into_reader(self) -> impl AsyncRead + Send + Unpin + 'static {
        let stream = self
            .response
            .bytes_stream()
            .map_err(std::io::Error::other)
            .boxed();
        StreamReader::new(stream)
    }
}

/// Issues the check and retrieve requests against an archive host
#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    client: reqwest::Client,
    host: Url,
}

impl ArchiveFetcher {
    pub fn new(host: Url, user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client, host })
    }

    /// `{host}/{owner}/{repo}/archive/refs/heads/{branch}.tar.gz`, each segment percent-encoded
    pub fn archive_url(&self, coords: &RepositoryCoordinates) -> Result<Url, GhdirError> {
        let mut url = self.host.clone();
        url.path_segments_mut()
            .map_err(|()| GhdirError::InvalidUrl {
                url: self.host.to_string(),
                reason: "archive host cannot be a base URL".into(),
            })?
            .pop_if_empty()
            .extend(coords.archive_segments());
        Ok(url)
    }

    /// HEAD the snapshot, carrying `validator` as `If-None-Match`
    pub async fn check(&self, url: &Url, validator: Option<&str>) -> Result<Freshness, FetchError> {
        let response = self
            .request(Method::HEAD, url, validator)
            .send()
            .await
            .map_err(|source| transport(url, source))?;

        match response.status() {
            StatusCode::NOT_MODIFIED => Ok(Freshness::NotModified),
            status if status.is_success() => Ok(Freshness::Changed {
                content_length: declared_length(response.headers()),
            }),
            status => Err(FetchError::Status {
                url: url.to_string(),
                phase: FetchPhase::Check,
                status,
            }),
        }
    }

    /// GET the snapshot, carrying `validator` as `If-None-Match`
    pub async fn retrieve(&self, url: &Url, validator: Option<&str>) -> Result<Retrieval, FetchError> {
        let response = self
            .request(Method::GET, url, validator)
            .send()
            .await
            .map_err(|source| transport(url, source))?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(Retrieval::NotModified);
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                phase: FetchPhase::Retrieve,
                status,
            });
        }

        let validator = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned);
        let content_length = declared_length(response.headers());
        log::info!(
            "Downloading {} ({} bytes declared, etag {:?})",
            url,
            content_length.map_or_else(|| "unknown".to_string(), |n| n.to_string()),
            validator
        );

        Ok(Retrieval::Download(ArchiveDownload {
            validator,
            content_length,
            response,
        }))
    }

    fn request(&self, method: Method, url: &Url, validator: Option<&str>) -> RequestBuilder {
        let builder = self.client.request(method, url.clone());
        match validator {
            Some(tag) => builder.header(IF_NONE_MATCH, tag),
            None => builder,
        }
    }
}

fn transport(url: &Url, source: reqwest::Error) -> FetchError {
    FetchError::Transport {
        url: url.to_string(),
        source,
    }
}

/// `Content-Length` header, read directly so HEAD responses report it too
fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
