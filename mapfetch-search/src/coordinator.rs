//! Concurrent catalog search with stale-result rejection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use mapfetch_core::catalog::wire::{parse_projects, parse_releases};
use mapfetch_core::catalog::{CatalogClient, CatalogEndpoints, CatalogError, ProjectSummary, ResultEntry};
use mapfetch_core::config::MapfetchConfig;
use tracing::{debug, info, warn};

use crate::aggregator::{ResultAggregator, SearchProgress, WaitOutcome};
use crate::errors::SearchError;
use crate::generation::{Epoch, GenerationTracker};

/// Runs catalog searches, one epoch per request.
///
/// Cheap to clone; clones share the same epoch counter and result state, so
/// a search started through any clone supersedes searches started through
/// the others.
#[derive(Debug, Clone)]
pub struct SearchCoordinator {
    inner: Arc<CoordinatorInner>,
}

#[derive(Debug)]
struct CoordinatorInner {
    client: Arc<dyn CatalogClient>,
    endpoints: CatalogEndpoints,
    per_page: usize,
    default_timeout: Duration,
    tracker: GenerationTracker,
    aggregator: ResultAggregator,
}

impl SearchCoordinator {
    pub fn new(client: Arc<dyn CatalogClient>, config: &MapfetchConfig) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                client,
                endpoints: CatalogEndpoints::new(config.catalog.base_url.clone()),
                per_page: config.catalog.per_page,
                default_timeout: config.search.timeout,
                tracker: GenerationTracker::new(),
                aggregator: ResultAggregator::new(),
            }),
        }
    }

    /// Barrier bound taken from configuration.
    pub fn default_timeout(&self) -> Duration {
        self.inner.default_timeout
    }

    /// Searches the first result page for `query`.
    ///
    /// # Errors
    /// - `SearchError::InvalidQuery` - Query is empty or whitespace
    pub async fn start_search(
        &self,
        query: &str,
        timeout: Duration,
    ) -> crate::Result<Vec<ResultEntry>> {
        self.start_search_page(query, 1, timeout).await
    }

    /// Searches result page `page` (1-based) for `query`.
    ///
    /// Starting a search immediately supersedes any search still in flight.
    /// Returns the entries collected for this search once all of its probes
    /// have reported, or whatever arrived before `timeout` elapsed. A search
    /// that gets superseded while waiting returns no entries.
    ///
    /// # Errors
    /// - `SearchError::InvalidQuery` - Query is empty or whitespace
    pub async fn start_search_page(
        &self,
        query: &str,
        page: u32,
        timeout: Duration,
    ) -> crate::Result<Vec<ResultEntry>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::InvalidQuery {
                query: query.to_string(),
                reason: "query is empty".to_string(),
            });
        }

        let inner = &self.inner;
        let epoch = inner.tracker.next_epoch();
        if !inner.aggregator.reset(epoch) {
            debug!("Search {epoch} superseded before it started");
            return Ok(Vec::new());
        }

        info!("Search {epoch} started for '{query}' (page {page})");
        let started = Instant::now();
        let url = inner.endpoints.search_url(query, page, inner.per_page);
        tokio::spawn(Arc::clone(inner).count_probe(epoch, url));

        let results = match inner.aggregator.wait_for_completion(epoch, timeout).await {
            WaitOutcome::Completed => inner.aggregator.snapshot_for(epoch).unwrap_or_default(),
            WaitOutcome::Superseded => {
                debug!("Search {epoch} for '{query}' superseded");
                Vec::new()
            }
            WaitOutcome::TimedOut => {
                let progress = inner.aggregator.progress();
                warn!(
                    "Search {epoch} for '{query}' timed out after {:?} ({} of {} probes reported), returning partial results",
                    timeout,
                    progress.completed,
                    progress
                        .expected
                        .map_or_else(|| "?".to_string(), |n| n.to_string())
                );
                inner.aggregator.snapshot_for(epoch).unwrap_or_default()
            }
        };

        info!(
            "Search {epoch} for '{query}' returned {} results in {:?}",
            results.len(),
            started.elapsed()
        );
        Ok(results)
    }

    /// Whether the latest search still has probes outstanding.
    pub fn is_searching(&self) -> bool {
        let progress = self.inner.aggregator.progress();
        progress.epoch != Epoch::INITIAL && !progress.is_settled()
    }

    pub fn progress(&self) -> SearchProgress {
        self.inner.aggregator.progress()
    }

    /// Entries collected so far for the latest search.
    pub fn snapshot(&self) -> Vec<ResultEntry> {
        self.inner.aggregator.snapshot()
    }

    /// Abandons the search in flight.
    ///
    /// Outstanding probes keep running but their results are discarded, and
    /// a caller blocked in [`start_search`](Self::start_search) returns empty.
    pub fn cancel(&self) {
        let epoch = self.inner.tracker.next_epoch();
        if self.inner.aggregator.reset(epoch) {
            self.inner.aggregator.set_expected(epoch, 0);
            info!("Search cancelled, now at epoch {epoch}");
        }
    }
}

impl CoordinatorInner {
    /// Lists the matching projects and fans out one detail probe per project.
    ///
    /// A failed listing settles the epoch with zero expected probes.
    async fn count_probe(self: Arc<Self>, epoch: Epoch, url: String) {
        let mut projects = match self.list_projects(&url).await {
            Ok(projects) => projects,
            Err(e) => {
                warn!("Count probe for search {epoch} failed: {e}");
                Vec::new()
            }
        };
        projects.truncate(self.per_page);

        // Publish the expected count before any detail probe can report.
        if !self.aggregator.set_expected(epoch, projects.len()) {
            debug!("Count probe for search {epoch} arrived after it was superseded");
            return;
        }
        debug!("Search {epoch} dispatching {} detail probes", projects.len());

        for project in projects {
            tokio::spawn(Arc::clone(&self).detail_probe(epoch, project));
        }
    }

    async fn detail_probe(self: Arc<Self>, epoch: Epoch, project: ProjectSummary) {
        let id = project.id;
        let entry = match self.fetch_entry(project).await {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Detail probe for project {id} in search {epoch} failed: {e}");
                None
            }
        };

        let entry = entry.filter(|_| self.tracker.is_current(epoch));
        let outcome = self.aggregator.try_commit(epoch, entry);
        debug!("Detail probe for project {id} in search {epoch}: {outcome:?}");
    }

    async fn list_projects(&self, url: &str) -> Result<Vec<ProjectSummary>, CatalogError> {
        let response = self.client.send(url).await?;
        if !response.is_success() {
            return Err(CatalogError::Parse {
                reason: format!("project list answered HTTP {}", response.status),
            });
        }
        parse_projects(&response.body)
    }

    async fn fetch_entry(&self, project: ProjectSummary) -> Result<ResultEntry, CatalogError> {
        let url = self.endpoints.releases_url(project.id);
        let response = self.client.send(&url).await?;
        if !response.is_success() {
            return Err(CatalogError::Parse {
                reason: format!("release list answered HTTP {}", response.status),
            });
        }
        let releases = parse_releases(&response.body)?;
        Ok(project.into_entry(releases))
    }
}
