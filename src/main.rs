mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use ghdir::interaction::{self, TerminalInteraction};
use ghdir::{FreshnessCache, GhdirConfig, Pipeline};
use log::error;

fn main() {
    let args = cli::Args::parse();

    let level = if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(level)
        .parse_default_env()
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FATAL: Failed to create Tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(real_main(args)) {
        error!("{e:#}");
        interaction::render_error(&e);
        std::process::exit(1);
    }
}

async fn real_main(args: cli::Args) -> Result<()> {
    let cfg = GhdirConfig::load(args.config.as_deref())?;

    let cache = if cfg.cache && !args.no_cache {
        FreshnessCache::default_path()
            .map(FreshnessCache::load)
            .unwrap_or_else(FreshnessCache::disabled)
    } else {
        FreshnessCache::disabled()
    };

    let destination = match args.output {
        Some(dir) => dir,
        None => std::env::current_dir().context("Could not determine current directory")?,
    };

    let front_end = TerminalInteraction::new(args.yes);
    let mut pipeline = Pipeline::new(&cfg, cache, destination, &front_end)?;
    let outcome = pipeline.run(&args.url).await?;
    interaction::render_outcome(&outcome);
    Ok(())
}
