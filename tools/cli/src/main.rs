//! Folio CLI - offline corpus export for the mobile clients.
//!
//! Runs full, incremental and single-book exports, publishes the shared
//! documents, and answers bundle requests against an exported directory.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use folio_app::ExportOrchestrator;
use folio_common::ExportConfig;
use folio_library::{CatalogSource, MemoryLibrary, TocNode};
use folio_sync::CacheInvalidator;

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Folio - offline corpus export and bundling")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Export configuration (JSON). Defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Library dump (JSON) to export from.
    #[arg(short, long, global = true)]
    library: Option<PathBuf>,

    /// Log alerts instead of sending them.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export every book and shared document, then rebuild the bundles.
    ExportAll {
        /// Keep books that already have an archive.
        #[arg(long)]
        skip_existing: bool,
    },

    /// Export books changed since the last run, then rebuild the bundles.
    ExportUpdated,

    /// Export a single book.
    ExportText {
        title: String,

        /// Record the book in `last_updated.json`.
        #[arg(long)]
        update: bool,
    },

    /// Write the table of contents and search filter tree, then purge the edge cache.
    ExportToc,

    /// Write the Hebrew category names.
    ExportCategories,

    /// Write the calendar.
    ExportCalendar,

    /// Write the author list.
    ExportAuthors,

    /// Resolve and publish the curated packages.
    ExportPackages,

    /// Write the shared documents into the configured app source trees.
    ExportBaseFiles,

    /// Record archive times; purges the edge cache when configured.
    WriteLastUpdated {
        /// Titles to record (all archives when empty).
        titles: Vec<String>,

        /// Merge into the existing document instead of replacing it.
        #[arg(long)]
        merge: bool,
    },

    /// Rebuild the bundles, then purge titles (everything when empty) from the edge cache.
    PurgeCdn { titles: Vec<String> },

    /// Delete all bundles and rebuild the curated packages.
    RebuildBundles,

    /// Build or reuse a bundle of the given books and print its parts.
    Bundle {
        #[arg(required = true)]
        books: Vec<String>,
    },

    /// Print the parts of a curated package bundle.
    PackageParts { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &cli.config {
        Some(path) => ExportConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ExportConfig::default(),
    };
    config.debug_mode |= cli.debug;
    config.validate().context("Invalid configuration")?;

    let library = match &cli.library {
        Some(path) => MemoryLibrary::load(path)
            .with_context(|| format!("Failed to load library {}", path.display()))?,
        None => MemoryLibrary::new(),
    };

    let orchestrator =
        ExportOrchestrator::new(&library, &config).context("Failed to set up export")?;

    // Bundle queries leave the published state alone; purge-cdn and
    // rebuild-bundles rebuild on their own.
    let finishes = !matches!(
        cli.command,
        Commands::Bundle { .. }
            | Commands::PackageParts { .. }
            | Commands::RebuildBundles
            | Commands::PurgeCdn { .. }
    );

    run(cli.command, &orchestrator, &library, &config).await?;
    if finishes {
        finish(&orchestrator).await?;
    }
    Ok(())
}

async fn run(
    command: Commands,
    orchestrator: &ExportOrchestrator<'_, MemoryLibrary>,
    library: &MemoryLibrary,
    config: &ExportConfig,
) -> Result<()> {
    match command {
        Commands::ExportAll { skip_existing } => {
            let report = orchestrator
                .export_all(skip_existing)
                .await
                .context("Full export failed")?;
            print_report(&report.exported, &report.failed);
            Ok(())
        }

        Commands::ExportUpdated => {
            let report = orchestrator
                .export_updated()
                .await
                .context("Incremental export failed")?;
            print_report(&report.exported, &report.failed);
            Ok(())
        }

        Commands::ExportText { title, update } => {
            let archive = orchestrator
                .export_text(&title, update)
                .await
                .with_context(|| format!("Failed to export {}", title))?;
            println!("{}", archive.display());
            Ok(())
        }

        Commands::ExportToc => {
            let shared = orchestrator.shared();
            shared
                .export_toc(&shared.export_targets())
                .await
                .context("Failed to export table of contents")?;
            shared
                .export_topic_toc(&shared.export_targets())
                .await
                .context("Failed to export topic table of contents")?;
            orchestrator
                .purge_cdn(&[])
                .await
                .context("Failed to purge the edge cache")?;
            Ok(())
        }

        Commands::ExportCategories => {
            let shared = orchestrator.shared();
            let categories = shared
                .export_categories(&shared.export_targets())
                .await
                .context("Failed to export categories")?;
            info!("Wrote {} categories", categories.len());
            Ok(())
        }

        Commands::ExportCalendar => {
            let shared = orchestrator.shared();
            shared
                .export_calendar(&shared.export_targets(), orchestrator.today())
                .await
                .context("Failed to export calendar")
        }

        Commands::ExportAuthors => {
            let shared = orchestrator.shared();
            shared
                .export_authors(&shared.export_targets())
                .await
                .context("Failed to export authors")
        }

        Commands::ExportPackages => {
            let toc = TocNode::clean(&library.toc().await?);
            let resolution = orchestrator
                .export_packages(&toc)
                .await
                .context("Failed to export packages")?;
            for package in &resolution.packages {
                println!("{:<40} {:>12} bytes", package.en, package.size);
            }
            Ok(())
        }

        Commands::ExportBaseFiles => orchestrator
            .export_base_files_to_sources()
            .await
            .context("Failed to export base files"),

        Commands::WriteLastUpdated { titles, merge } => {
            let snapshot = orchestrator
                .write_last_updated(&titles, merge)
                .await
                .context("Failed to write last_updated.json")?;
            println!("Recorded {} titles", snapshot.titles.len());
            Ok(())
        }

        Commands::PurgeCdn { titles } => {
            orchestrator
                .rebuild_bundles()
                .await
                .context("Failed to rebuild bundles")?;
            let invalidator = CacheInvalidator::from_config(config)
                .context("No CDN configured")?;
            let report = invalidator
                .purge_titles(library, &titles)
                .await
                .context("Failed to list titles to purge")?;
            println!(
                "Purged {} files in {} batches ({} failed)",
                report.files, report.batches, report.failed_batches
            );
            orchestrator.announce_completion().await;
            Ok(())
        }

        Commands::RebuildBundles => orchestrator
            .rebuild_bundles()
            .await
            .context("Failed to rebuild bundles"),

        Commands::Bundle { books } => {
            let parts = orchestrator
                .bundles()
                .make_bundle(&books)
                .await
                .context("Failed to build bundle")?;
            println!("{}", serde_json::to_string_pretty(&parts)?);
            Ok(())
        }

        Commands::PackageParts { name } => {
            let parts = orchestrator
                .bundles()
                .package_parts(&name)
                .await
                .with_context(|| format!("No bundle for package {}", name))?;
            println!("{}", serde_json::to_string_pretty(&parts)?);
            Ok(())
        }
    }
}

/// Rebuild the curated bundles once and announce the finished run.
async fn finish(orchestrator: &ExportOrchestrator<'_, MemoryLibrary>) -> Result<()> {
    orchestrator
        .rebuild_bundles()
        .await
        .context("Failed to rebuild bundles")?;
    orchestrator.announce_completion().await;
    Ok(())
}

fn print_report(exported: &[String], failed: &[String]) {
    println!("Exported {} books", exported.len());
    if !failed.is_empty() {
        println!("Failed ({}):", failed.len());
        for title in failed {
            println!("  {}", title);
        }
    }
}
