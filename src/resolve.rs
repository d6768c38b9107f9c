//! Repository URL resolution
//!
//! Turns a GitHub browsing URL such as
//! `https://github.com/owner/repo/tree/main/docs/guide` into the coordinates
//! needed to request the branch snapshot and to unwrap the requested folder.
//! Nothing in here touches the network or the filesystem.

use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::GhdirError;

/// Branch used when the URL does not name one
pub const FALLBACK_BRANCH: &str = "main";

/// Path segment that precedes the branch name in a browsing URL
const BRANCH_MARKER: &str = "tree";

/// Owner, repository, branch and folder named by a browsing URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryCoordinates {
    pub owner: String,
    pub repository: String,
    pub branch: String,
    /// Slash separated, without leading or trailing slash. Empty for the repository root.
    pub subfolder: String,
}

impl RepositoryCoordinates {
    /// Segments of the requested folder, empty for the repository root
    pub fn subfolder_segments(&self) -> Vec<&str> {
        self.subfolder.split('/').filter(|s| !s.is_empty()).collect()
    }

    /// Number of leading archive path segments removed on extraction.
    ///
    /// One for the `repo-branch/` wrapper the snapshot adds, plus one per
    /// folder segment so the folder's contents land at the output root.
    pub fn strip_depth(&self) -> usize {
        1 + self.subfolder_segments().len()
    }

    /// Key under which the validator of this folder is cached
    pub fn cache_key(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.owner, self.repository, self.branch, self.subfolder
        )
    }

    /// Unencoded path segments of the branch snapshot relative to the archive host.
    ///
    /// A branch such as `feature/login` spans several segments.
    pub fn archive_segments(&self) -> Vec<String> {
        let mut segments = vec![
            self.owner.clone(),
            self.repository.clone(),
            "archive".to_string(),
            "refs".to_string(),
            "heads".to_string(),
        ];
        segments.extend(self.branch.split('/').map(str::to_owned));
        if let Some(last) = segments.last_mut() {
            last.push_str(".tar.gz");
        }
        segments
    }

    /// Requested folder as an absolute path inside the repository, `/` for the root
    pub fn folder_path(&self) -> String {
        format!("/{}", self.subfolder)
    }
}

impl std::fmt::Display for RepositoryCoordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} • {}", self.owner, self.repository, self.branch)
    }
}

/// Parse a browsing URL into repository coordinates.
///
/// Accepted shapes are `.../<owner>/<repo>` and
/// `.../<owner>/<repo>/tree/<branch>/<folder...>`. A missing scheme is
/// treated as `https://`. When no branch is encoded `fallback_branch` is used.
pub fn parse_repository_url(
    raw: &str,
    fallback_branch: &str,
) -> Result<RepositoryCoordinates, GhdirError> {
    let trimmed = raw.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let invalid = |reason: &str| GhdirError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(&with_scheme).map_err(|e| invalid(&e.to_string()))?;
    // Segments come back percent-encoded; archive entry names are not.
    let parts: Vec<String> = url
        .path_segments()
        .map(|segments| {
            segments
                .filter(|s| !s.is_empty())
                .map(|s| percent_decode_str(s).decode_utf8().map(|d| d.into_owned()))
                .collect::<Result<Vec<String>, _>>()
        })
        .transpose()
        .map_err(|e| invalid(&format!("path is not valid UTF-8 once decoded: {e}")))?
        .unwrap_or_default();

    if parts.len() < 2 {
        return Err(invalid("expected at least an owner and a repository"));
    }

    let owner = parts[0].clone();
    let repository = parts[1].trim_end_matches(".git").to_string();
    if repository.is_empty() {
        return Err(invalid("repository name is empty"));
    }

    let rest = &parts[2..];
    let marker = rest
        .iter()
        .enumerate()
        .find(|(i, segment)| segment.as_str() == BRANCH_MARKER && rest.len() > i + 1);

    let (branch, subfolder) = match marker {
        Some((i, _)) => (rest[i + 1].clone(), rest[i + 2..].join("/")),
        None => (fallback_branch.to_string(), String::new()),
    };

    log::debug!("Resolved {raw} to {owner}/{repository} branch={branch} folder={subfolder:?}");

    Ok(RepositoryCoordinates {
        owner,
        repository,
        branch,
        subfolder,
    })
}
