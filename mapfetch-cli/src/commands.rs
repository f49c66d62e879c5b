//! CLI command implementations

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use clap::Subcommand;
use mapfetch_core::catalog::{CatalogClient, HttpCatalogClient, ResultEntry};
use mapfetch_core::config::MapfetchConfig;
use mapfetch_core::download::{DownloadPhase, DownloadSession};
use mapfetch_core::extract::ZipExtractor;
use mapfetch_core::preview::PREVIEW_DIR;
use mapfetch_core::{MapfetchError, PreviewCache};
use mapfetch_search::SearchCoordinator;
use tracing::warn;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Search the catalog and list matching maps
    Search {
        /// Search terms
        query: String,
        /// Result page, starting at 1
        #[arg(short, long, default_value = "1")]
        page: u32,
        /// Seconds to wait for all results before showing what arrived
        #[arg(short, long)]
        timeout: Option<u64>,
        /// Also cache preview images under the destination folder
        #[arg(long)]
        previews: bool,
    },
    /// Search the catalog and install one of the results
    Download {
        /// Search terms
        query: String,
        /// Result number as listed by `search`
        #[arg(short, long, default_value = "1")]
        item: usize,
        /// Release tag; the latest release when omitted
        #[arg(short, long)]
        release: Option<String>,
        /// Folder that receives installed maps
        #[arg(short, long)]
        dest: Option<PathBuf>,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns the first error of the command that fails
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    let config = MapfetchConfig::from_env();
    let client: Arc<dyn CatalogClient> = Arc::new(
        HttpCatalogClient::new(&config.catalog)
            .map_err(|e| anyhow!(MapfetchError::from(e).user_message()))?,
    );

    match command {
        Commands::Search {
            query,
            page,
            timeout,
            previews,
        } => search(client, config, &query, page, timeout, previews).await,
        Commands::Download {
            query,
            item,
            release,
            dest,
        } => {
            let mut config = config;
            if let Some(dest) = dest {
                config.download.destination = dest;
            }
            download(client, config, &query, item, release.as_deref()).await
        }
    }
}

/// List one page of search results
///
/// # Errors
/// - `SearchError::InvalidQuery` - Query is blank
pub async fn search(
    client: Arc<dyn CatalogClient>,
    config: MapfetchConfig,
    query: &str,
    page: u32,
    timeout: Option<u64>,
    previews: bool,
) -> anyhow::Result<()> {
    let coordinator = SearchCoordinator::new(Arc::clone(&client), &config);
    let timeout = timeout.map_or(coordinator.default_timeout(), Duration::from_secs);
    let results = coordinator.start_search_page(query, page, timeout).await?;

    if results.is_empty() {
        println!("No maps found for '{query}'.");
        return Ok(());
    }

    println!("Results for '{query}' (page {page})");
    println!("{:-<60}", "");
    for (index, entry) in results.iter().enumerate() {
        print_entry(index + 1, entry);
    }

    if previews {
        let cache = PreviewCache::new(client, config.download.destination.join(PREVIEW_DIR));
        for entry in &results {
            match cache.fetch(entry).await {
                Ok(Some(path)) => println!("Preview for '{}': {}", entry.name, path.display()),
                Ok(None) => {}
                Err(e) => warn!("Preview for '{}' unavailable: {e}", entry.name),
            }
        }
    }

    Ok(())
}

/// Search, pick a result and install it while showing progress
///
/// # Errors
/// - `SearchError::InvalidQuery` - Query is blank
/// - Item number or release tag does not match the results
/// - `DownloadError` - Transfer, write or extraction failed
pub async fn download(
    client: Arc<dyn CatalogClient>,
    config: MapfetchConfig,
    query: &str,
    item: usize,
    release_tag: Option<&str>,
) -> anyhow::Result<()> {
    let coordinator = SearchCoordinator::new(Arc::clone(&client), &config);
    let results = coordinator
        .start_search(query, coordinator.default_timeout())
        .await?;

    let Some(entry) = item.checked_sub(1).and_then(|index| results.get(index)).cloned() else {
        bail!("No result #{item} for '{query}' ({} results)", results.len());
    };
    let release = match release_tag {
        Some(tag) => entry.release(tag),
        None => entry.latest_release(),
    }
    .cloned()
    .with_context(|| format!("'{}' has no matching release", entry.name))?;

    println!("Installing '{}' {} ({})", entry.name, release.tag, entry.format_size());

    let session = DownloadSession::new(client, Arc::new(ZipExtractor), config.download);
    let mut worker = {
        let session = session.clone();
        tokio::spawn(async move { session.start(&entry, &release).await })
    };

    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    let outcome = loop {
        tokio::select! {
            joined = &mut worker => break joined.context("download task panicked")?,
            _ = ticker.tick() => render_progress(&session),
        }
    };
    render_progress(&session);
    println!();

    let installed = outcome.map_err(|e| anyhow!(MapfetchError::from(e).user_message()))?;
    println!("Installed to {}", installed.display());
    Ok(())
}

fn print_entry(number: usize, entry: &ResultEntry) {
    println!(
        "{number:>3}. {} by {} ({})",
        entry.name,
        entry.author.as_deref().unwrap_or("unknown"),
        entry.format_size()
    );
    if !entry.description.is_empty() {
        println!("     {}", entry.description);
    }
    for release in &entry.releases {
        println!("     - {} [{}]", release.name, release.tag);
    }
}

fn render_progress(session: &DownloadSession) {
    let snapshot = session.progress_snapshot();
    let line = match snapshot.phase {
        DownloadPhase::Downloading => format!(
            "Downloading {:>3}% ({} / {} bytes)",
            snapshot.percent(),
            snapshot.bytes_transferred,
            snapshot.bytes_total
        ),
        phase => format!("{phase:<40}"),
    };
    print!("\r{line:<60}");
    let _ = std::io::stdout().flush();
}
