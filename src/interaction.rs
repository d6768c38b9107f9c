//! Terminal presentation: confirmation prompt, progress bar and messages
//!
//! The pipeline only talks to the [`Interaction`] trait and returns a
//! structured [`Outcome`]; everything that colours or prompts lives here.

use std::io::Write;
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Confirm, InquireError};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::error::GhdirError;
use crate::pipeline::{Outcome, Stage};
use crate::resolve::RepositoryCoordinates;

/// Callbacks the pipeline needs from its front end
pub trait Interaction: Send + Sync {
    /// Called when the pipeline enters `stage`, once coordinates are known
    fn stage_entered(&self, _stage: Stage, _coordinates: &RepositoryCoordinates) {}

    /// Ask whether to continue with a download of `declared_bytes`
    fn confirm_large_download(&self, declared_bytes: u64) -> Result<bool, GhdirError>;

    /// Progress bar fed with the compressed bytes as they are read
    fn download_progress(&self, declared_bytes: Option<u64>) -> ProgressBar;
}

/// Interactive terminal front end
#[derive(Debug, Clone, Default)]
pub struct TerminalInteraction {
    /// Answer "yes" to the large download prompt without asking
    pub assume_yes: bool,
}

impl TerminalInteraction {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl Interaction for TerminalInteraction {
    fn stage_entered(&self, stage: Stage, coordinates: &RepositoryCoordinates) {
        let mut stdout = StandardStream::stdout(ColorChoice::Auto);
        match stage {
            Stage::CheckingFreshness => {
                let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true));
                let _ = writeln!(stdout, " ghdir • GitHub folder download ");
                let _ = stdout.reset();
                let _ = writeln!(stdout, " {coordinates}");
                if !coordinates.subfolder.is_empty() {
                    let _ = writeln!(stdout, " Folder: {}", coordinates.subfolder);
                }
                let _ = writeln!(stdout, "\nChecking repository...");
            }
            Stage::Downloading => {
                let _ = writeln!(stdout, "\nDownloading archive...");
            }
            Stage::Extracting => {
                let _ = writeln!(stdout, "Extracting files...");
            }
            _ => {}
        }
    }

    fn confirm_large_download(&self, declared_bytes: u64) -> Result<bool, GhdirError> {
        warning(&format!(
            "Warning: the archive is large ({} MB). This may take a long time and use a lot of bandwidth.",
            declared_bytes / (1024 * 1024)
        ));
        if self.assume_yes {
            return Ok(true);
        }

        match Confirm::new("Continue?").with_default(false).prompt() {
            Ok(answer) => Ok(answer),
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(false),
            Err(e) => Err(GhdirError::Prompt(e.to_string())),
        }
    }

    fn download_progress(&self, declared_bytes: Option<u64>) -> ProgressBar {
        match declared_bytes {
            Some(total) => {
                let pb = ProgressBar::new(total);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("   [{bar:40.green/blue}] {bytes}/{total_bytes} {bytes_per_sec}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("█▓░"),
                );
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("   {spinner} {bytes} {bytes_per_sec}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                pb
            }
        }
    }
}

/// Non-interactive front end: no output, fixed answer to the prompt
#[derive(Debug, Clone, Copy)]
pub struct SilentInteraction {
    pub confirm: bool,
}

impl Interaction for SilentInteraction {
    fn confirm_large_download(&self, _declared_bytes: u64) -> Result<bool, GhdirError> {
        Ok(self.confirm)
    }

    fn download_progress(&self, _declared_bytes: Option<u64>) -> ProgressBar {
        ProgressBar::hidden()
    }
}

/// Print the final line for a successful run
pub fn render_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::UpToDate { .. } => success("Folder is up to date. No changes."),
        Outcome::Aborted { .. } => {
            let _ = writeln!(std::io::stdout(), "Aborted.");
        }
        Outcome::Extracted {
            coordinates,
            summary,
            destination,
            ..
        } => {
            success(&format!(
                "\nDone! Fetched {} files/folders",
                summary.materialized()
            ));
            let _ = writeln!(
                std::io::stdout(),
                "{}",
                destination_line(coordinates, destination)
            );
        }
    }
}

/// The folder's contents land directly in `destination`, so name the source
/// folder rather than a subdirectory that is never created.
fn destination_line(coordinates: &RepositoryCoordinates, destination: &Path) -> String {
    format!(
        " → {} (contents of {}:{})",
        destination.display(),
        coordinates,
        coordinates.folder_path()
    )
}

/// Print a fatal error and its cause chain
pub fn render_error(error: &anyhow::Error) {
    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    let _ = stderr.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true));
    let _ = writeln!(stderr, "Error: {error:#}");
    let _ = stderr.reset();
}

fn success(message: &str) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true));
    let _ = writeln!(stdout, "{message}");
    let _ = stdout.reset();
}

fn warning(message: &str) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)).set_bold(true));
    let _ = writeln!(stdout, "{message}");
    let _ = stdout.reset();
}
