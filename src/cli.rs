use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Download a single folder from a GitHub repository",
    long_about = "ghdir - fetch only the chosen folder of a GitHub repository without cloning the whole project."
)]
pub struct Args {
    /// Browsing URL, e.g. https://github.com/owner/repo/tree/main/path/to/folder
    pub url: String,

    /// Extract into this directory instead of the current one
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Do not ask before large downloads
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Ignore and do not update the ETag cache
    #[arg(long)]
    pub no_cache: bool,

    /// Path to configuration file
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}
