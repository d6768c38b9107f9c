//! Selective extraction of a single folder from a branch snapshot
//!
//! Snapshots are gzip compressed tarballs whose entries all sit under a
//! `repo-branch/` wrapper. Only entries below the requested folder are
//! written, with the wrapper and folder prefix stripped so the folder's
//! contents appear directly in the destination.

use std::fs::OpenOptions;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use indicatif::ProgressBar;
use log::{debug, warn};
use tar::{Archive, EntryType};
use tokio::io::AsyncRead;
use tokio_util::io::SyncIoBridge;

use crate::error::ExtractionError;
use crate::resolve::RepositoryCoordinates;

/// Which entries to keep and how far to unwrap them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractPlan {
    folder: Vec<String>,
}

/// Where a single archive entry goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Wrapper, ancestor of the folder, or outside the folder
    Skip,
    /// Would resolve outside the destination
    Unsafe,
    Target(PathBuf),
}

impl ExtractPlan {
    pub fn new<S: AsRef<str>>(folder: &[S]) -> Self {
        Self {
            folder: folder.iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }

    pub fn from_coordinates(coords: &RepositoryCoordinates) -> Self {
        Self::new(&coords.subfolder_segments())
    }

    /// Wrapper directory plus every folder segment
    pub fn strip_depth(&self) -> usize {
        1 + self.folder.len()
    }

    /// Map a stored archive path to a path relative to the destination
    pub fn locate(&self, stored: &str) -> Placement {
        let segments: Vec<&str> = stored.split('/').filter(|s| !s.is_empty()).collect();
        let strip = self.strip_depth();
        if segments.len() <= strip {
            return Placement::Skip;
        }
        if segments[1..strip]
            .iter()
            .zip(&self.folder)
            .any(|(seg, want)| *seg != want.as_str())
        {
            return Placement::Skip;
        }

        let relative: PathBuf = segments[strip..].iter().collect();
        if relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            Placement::Target(relative)
        } else {
            Placement::Unsafe
        }
    }
}

/// Counts of what an extraction wrote
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    pub directories: usize,
    pub links: usize,
    /// Entries below the folder that were not written (unsafe paths, special files)
    pub skipped: usize,
}

impl ExtractSummary {
    /// Filesystem objects created or overwritten
    pub fn materialized(&self) -> usize {
        self.files + self.directories + self.links
    }
}

/// Extract a gzip compressed tarball read from `reader` into `destination`.
///
/// Entries are processed strictly in stream order. Parent directories are
/// created on demand, so files may precede their directory entries. The
/// first filesystem failure aborts; anything already written stays.
pub fn extract_archive<R: Read>(
    reader: R,
    plan: &ExtractPlan,
    destination: &Path,
) -> Result<ExtractSummary, ExtractionError> {
    let mut archive = Archive::new(GzDecoder::new(reader));
    let mut summary = ExtractSummary::default();

    for entry in archive.entries().map_err(ExtractionError::Archive)? {
        let mut entry = entry.map_err(ExtractionError::Archive)?;
        let stored = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let kind = entry.header().entry_type();

        let relative = match plan.locate(&stored) {
            Placement::Skip => continue,
            Placement::Unsafe => {
                warn!("Skipping archive entry with unsafe path: {stored}");
                summary.skipped += 1;
                continue;
            }
            Placement::Target(relative) => relative,
        };
        let target = destination.join(&relative);

        match kind {
            EntryType::Directory => {
                std::fs::create_dir_all(&target)
                    .map_err(|e| ExtractionError::materialize(&target, e))?;
                summary.directories += 1;
            }
            EntryType::Regular | EntryType::Continuous => {
                ensure_parent(&target)?;
                let mode = entry.header().mode().unwrap_or(0o644);
                write_file(&mut entry, &target, mode)?;
                summary.files += 1;
            }
            EntryType::Symlink => {
                let link = entry
                    .link_name()
                    .map_err(ExtractionError::Archive)?
                    .map(|l| l.into_owned());
                match link {
                    Some(link) if link_stays_inside(&relative, &link) => {
                        ensure_parent(&target)?;
                        entry
                            .unpack(&target)
                            .map_err(|e| ExtractionError::materialize(&target, e))?;
                        summary.links += 1;
                    }
                    _ => {
                        warn!("Skipping symlink {stored} pointing outside the folder");
                        summary.skipped += 1;
                    }
                }
            }
            other => {
                debug!("Skipping {other:?} entry {stored}");
                summary.skipped += 1;
            }
        }
    }

    Ok(summary)
}

/// Bridge an async body into [`extract_archive`] on the blocking pool.
///
/// Bytes flow from `body` through `progress` into the decoder without the
/// archive ever being buffered whole.
pub async fn extract_stream<R>(
    body: R,
    plan: ExtractPlan,
    destination: PathBuf,
    progress: ProgressBar,
) -> Result<ExtractSummary, ExtractionError>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let bridge = SyncIoBridge::new(body);
    tokio::task::spawn_blocking(move || {
        let result = extract_archive(progress.wrap_read(bridge), &plan, &destination);
        progress.finish_and_clear();
        result
    })
    .await
    .map_err(ExtractionError::Worker)?
}

fn ensure_parent(target: &Path) -> Result<(), ExtractionError> {
    match target.parent() {
        Some(parent) => {
            std::fs::create_dir_all(parent).map_err(|e| ExtractionError::materialize(parent, e))
        }
        None => Ok(()),
    }
}

fn write_file(content: &mut impl Read, target: &Path, mode: u32) -> Result<(), ExtractionError> {
    let mut options = OpenOptions::new();
    options.create(true).write(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode & 0o777);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options
        .open(target)
        .map_err(|e| ExtractionError::materialize(target, e))?;
    std::io::copy(content, &mut file).map_err(|e| ExtractionError::Write {
        path: target.to_path_buf(),
        source: e,
    })?;

    // open() only applies the mode to new files
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(target, std::fs::Permissions::from_mode(mode & 0o777))
            .map_err(|e| ExtractionError::materialize(target, e))?;
    }
    Ok(())
}

/// Whether `link` (relative to the link's own directory) stays within the destination
fn link_stays_inside(relative: &Path, link: &Path) -> bool {
    let mut depth = relative.components().count().saturating_sub(1) as isize;
    for component in link.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tar::{Builder, Header};

    enum Item<'a> {
        Dir(&'a str),
        File(&'a str, &'a [u8], u32),
        Link(&'a str, &'a str),
    }

    fn tarball(items: &[Item<'_>]) -> Vec<u8> {
        let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for item in items {
            let mut header = Header::new_gnu();
            match item {
                Item::Dir(path) => {
                    header.set_entry_type(EntryType::Directory);
                    header.set_mode(0o755);
                    header.set_size(0);
                    builder.append_data(&mut header, path, std::io::empty()).unwrap();
                }
                Item::File(path, data, mode) => {
                    header.set_entry_type(EntryType::Regular);
                    header.set_mode(*mode);
                    header.set_size(data.len() as u64);
                    builder.append_data(&mut header, path, *data).unwrap();
                }
                Item::Link(path, target) => {
                    header.set_entry_type(EntryType::Symlink);
                    header.set_size(0);
                    builder.append_link(&mut header, path, target).unwrap();
                }
            }
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn plan(folder: &str) -> ExtractPlan {
        let segments: Vec<&str> = folder.split('/').filter(|s| !s.is_empty()).collect();
        ExtractPlan::new(&segments)
    }

    #[test]
    fn locate_strips_wrapper_and_folder() {
        let plan = plan("a/b/c");
        assert_eq!(plan.strip_depth(), 4);
        assert_eq!(
            plan.locate("repo-main/a/b/c/file.txt"),
            Placement::Target(PathBuf::from("file.txt"))
        );
        assert_eq!(
            plan.locate("repo-main/a/b/c/sub/x.rs"),
            Placement::Target(PathBuf::from("sub/x.rs"))
        );
        assert_eq!(plan.locate("repo-main/a/b/c"), Placement::Skip);
        assert_eq!(plan.locate("repo-main/a/b/c/"), Placement::Skip);
        assert_eq!(plan.locate("repo-main/a/b"), Placement::Skip);
        assert_eq!(plan.locate("repo-main/"), Placement::Skip);
        assert_eq!(plan.locate("pax_global_header"), Placement::Skip);
    }

    #[test]
    fn locate_discards_siblings_of_the_folder() {
        let plan = plan("docs");
        assert_eq!(plan.locate("repo-main/src/lib.rs"), Placement::Skip);
        assert_eq!(plan.locate("repo-main/docsx/a.md"), Placement::Skip);
        assert_eq!(
            plan.locate("repo-main/docs/a.md"),
            Placement::Target(PathBuf::from("a.md"))
        );
    }

    #[test]
    fn locate_root_keeps_everything_below_wrapper() {
        let plan = plan("");
        assert_eq!(plan.strip_depth(), 1);
        assert_eq!(
            plan.locate("repo-main/README.md"),
            Placement::Target(PathBuf::from("README.md"))
        );
    }

    #[test]
    fn locate_rejects_parent_components() {
        let plan = plan("docs");
        assert_eq!(plan.locate("repo-main/docs/../../etc/passwd"), Placement::Unsafe);
        assert_eq!(plan.locate("repo-main/docs/./a"), Placement::Unsafe);
    }

    #[test]
    fn extracts_only_the_requested_folder() {
        let data = tarball(&[
            Item::Dir("repo-main/"),
            Item::File("repo-main/README.md", b"root readme", 0o644),
            Item::Dir("repo-main/a/"),
            Item::Dir("repo-main/a/b/"),
            Item::Dir("repo-main/a/b/c/"),
            Item::File("repo-main/a/b/c/file.txt", b"hello", 0o644),
            Item::Dir("repo-main/a/b/c/nested/"),
            Item::File("repo-main/a/b/c/nested/deep.txt", b"deep", 0o644),
            Item::File("repo-main/a/b/other.txt", b"sibling", 0o644),
        ]);
        let dest = tempfile::tempdir().unwrap();

        let summary = extract_archive(data.as_slice(), &plan("a/b/c"), dest.path()).unwrap();

        assert_eq!(summary.files, 2);
        assert_eq!(summary.directories, 1);
        assert_eq!(summary.materialized(), 3);
        assert_eq!(std::fs::read(dest.path().join("file.txt")).unwrap(), b"hello");
        assert_eq!(std::fs::read(dest.path().join("nested/deep.txt")).unwrap(), b"deep");
        assert!(!dest.path().join("README.md").exists());
        assert!(!dest.path().join("other.txt").exists());
        assert!(!dest.path().join("c").exists());
    }

    #[test]
    fn files_before_their_directories_get_parents_created() {
        let data = tarball(&[
            Item::File("repo-main/docs/x/y/z.md", b"z", 0o644),
            Item::Dir("repo-main/docs/x/"),
            Item::Dir("repo-main/docs/x/y/"),
        ]);
        let dest = tempfile::tempdir().unwrap();

        let summary = extract_archive(data.as_slice(), &plan("docs"), dest.path()).unwrap();

        assert_eq!(summary.files, 1);
        assert_eq!(summary.directories, 2);
        assert_eq!(std::fs::read(dest.path().join("x/y/z.md")).unwrap(), b"z");
    }

    #[test]
    fn content_is_copied_byte_for_byte() {
        let blob: Vec<u8> = (0..200_000u32).map(|i| (i.wrapping_mul(31) % 251) as u8).collect();
        let data = tarball(&[Item::File("repo-main/bin/blob.dat", &blob, 0o644)]);
        let dest = tempfile::tempdir().unwrap();

        extract_archive(data.as_slice(), &plan("bin"), dest.path()).unwrap();

        let written = std::fs::read(dest.path().join("blob.dat")).unwrap();
        assert_eq!(written.len(), blob.len());
        assert_eq!(written, blob);
    }

    #[test]
    fn existing_files_are_truncated() {
        let dest = tempfile::tempdir().unwrap();
        std::fs::write(dest.path().join("a.txt"), b"a much longer previous version").unwrap();
        let data = tarball(&[Item::File("repo-main/a.txt", b"new", 0o644)]);

        extract_archive(data.as_slice(), &plan(""), dest.path()).unwrap();

        assert_eq!(std::fs::read(dest.path().join("a.txt")).unwrap(), b"new");
    }

    #[cfg(unix)]
    #[test]
    fn permission_bits_are_applied() {
        use std::os::unix::fs::PermissionsExt;

        let data = tarball(&[
            Item::File("repo-main/tools/run.sh", b"#!/bin/sh\n", 0o755),
            Item::File("repo-main/tools/notes.txt", b"n", 0o600),
        ]);
        let dest = tempfile::tempdir().unwrap();

        extract_archive(data.as_slice(), &plan("tools"), dest.path()).unwrap();

        let mode = |name: &str| {
            std::fs::metadata(dest.path().join(name)).unwrap().permissions().mode() & 0o777
        };
        assert_eq!(mode("run.sh"), 0o755);
        assert_eq!(mode("notes.txt"), 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_inside_the_folder_are_recreated() {
        let data = tarball(&[
            Item::File("repo-main/docs/real.md", b"real", 0o644),
            Item::Link("repo-main/docs/alias.md", "real.md"),
            Item::Link("repo-main/docs/escape", "../../../etc"),
        ]);
        let dest = tempfile::tempdir().unwrap();

        let summary = extract_archive(data.as_slice(), &plan("docs"), dest.path()).unwrap();

        assert_eq!(summary.links, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(std::fs::read(dest.path().join("alias.md")).unwrap(), b"real");
        assert!(std::fs::symlink_metadata(dest.path().join("escape")).is_err());
    }

    #[test]
    fn unknown_folder_extracts_nothing() {
        let data = tarball(&[Item::File("repo-main/src/lib.rs", b"fn main() {}", 0o644)]);
        let dest = tempfile::tempdir().unwrap();

        let summary = extract_archive(data.as_slice(), &plan("nope"), dest.path()).unwrap();

        assert_eq!(summary.materialized(), 0);
        assert_eq!(std::fs::read_dir(dest.path()).unwrap().count(), 0);
    }

    #[test]
    fn encoded_folder_in_url_matches_plain_entry_names() {
        let coords = crate::resolve::parse_repository_url(
            "https://github.com/o/r/tree/main/my%20docs",
            crate::resolve::FALLBACK_BRANCH,
        )
        .unwrap();
        let data = tarball(&[
            Item::Dir("r-main/my docs/"),
            Item::File("r-main/my docs/a.txt", b"spaced", 0o644),
            Item::File("r-main/other/b.txt", b"other", 0o644),
        ]);
        let dest = tempfile::tempdir().unwrap();

        let summary =
            extract_archive(data.as_slice(), &ExtractPlan::from_coordinates(&coords), dest.path())
                .unwrap();

        assert_eq!(summary.files, 1);
        assert_eq!(summary.materialized(), 1);
        assert_eq!(std::fs::read(dest.path().join("a.txt")).unwrap(), b"spaced");
    }

    #[test]
    fn corrupt_gzip_is_an_archive_error() {
        let dest = tempfile::tempdir().unwrap();
        let err = extract_archive(&b"definitely not gzip"[..], &plan(""), dest.path()).unwrap_err();
        assert!(matches!(err, ExtractionError::Archive(_)), "{err:?}");
    }

    /// Serves `data` up to `limit` bytes, then fails every read
    struct FailAfter {
        data: Vec<u8>,
        pos: usize,
        limit: usize,
    }

    impl Read for FailAfter {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.limit {
                return Err(std::io::Error::other("connection reset"));
            }
            let n = buf.len().min(self.limit - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn read_failure_inside_file_content_is_a_write_error() {
        let blob = vec![7u8; 256 * 1024];
        let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::none()));
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_mode(0o644);
        header.set_size(blob.len() as u64);
        builder.append_data(&mut header, "repo-main/big.bin", blob.as_slice()).unwrap();
        let data = builder.into_inner().unwrap().finish().unwrap();
        let limit = data.len() / 2;
        let dest = tempfile::tempdir().unwrap();

        let err = extract_archive(FailAfter { data, pos: 0, limit }, &plan(""), dest.path())
            .unwrap_err();

        match err {
            ExtractionError::Write { ref path, .. } => assert!(path.ends_with("big.bin")),
            ref other => panic!("unexpected error {other:?}"),
        }
        assert!(err.into_transfer_failure().is_err());
    }

    #[test]
    fn blocked_destination_is_a_materialize_error() {
        let dest = tempfile::tempdir().unwrap();
        std::fs::write(dest.path().join("sub"), b"a file where a directory should go").unwrap();
        let data = tarball(&[Item::File("repo-main/sub/inner.txt", b"x", 0o644)]);

        let err = extract_archive(data.as_slice(), &plan(""), dest.path()).unwrap_err();
        assert!(matches!(err, ExtractionError::Materialize { .. }), "{err:?}");
    }

    #[test]
    fn link_escape_detection() {
        assert!(link_stays_inside(Path::new("a/link"), Path::new("../b")));
        assert!(link_stays_inside(Path::new("link"), Path::new("target")));
        assert!(!link_stays_inside(Path::new("link"), Path::new("../x")));
        assert!(!link_stays_inside(Path::new("a/link"), Path::new("/etc/passwd")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn extract_stream_reads_async_body() {
        let data = tarball(&[Item::File("repo-main/docs/a.md", b"async", 0o644)]);
        let dest = tempfile::tempdir().unwrap();

        let summary = extract_stream(
            std::io::Cursor::new(data),
            plan("docs"),
            dest.path().to_path_buf(),
            ProgressBar::hidden(),
        )
        .await
        .unwrap();

        assert_eq!(summary.files, 1);
        assert_eq!(std::fs::read(dest.path().join("a.md")).unwrap(), b"async");
    }
}
