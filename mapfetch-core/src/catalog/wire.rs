//! Catalog URL building and payload decoding.
//!
//! The catalog speaks the GitLab v4 projects API: a project is a map, a
//! project release is a downloadable version of it.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;

use super::CatalogError;
use super::types::{Release, ResultEntry};

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));

/// Builds request URLs against a catalog base URL.
#[derive(Debug, Clone)]
pub struct CatalogEndpoints {
    base_url: String,
}

impl CatalogEndpoints {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    /// Count probe: one page of projects matching `query`.
    pub fn search_url(&self, query: &str, page: u32, per_page: usize) -> String {
        format!(
            "{}/projects?search={}&page={}&per_page={}",
            self.base_url,
            urlencoding::encode(query),
            page.max(1),
            per_page
        )
    }

    /// Detail probe: releases of one project.
    pub fn releases_url(&self, project_id: u64) -> String {
        format!("{}/projects/{}/releases", self.base_url, project_id)
    }
}

/// Project summary returned by the count probe.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSummary {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    namespace: Option<Namespace>,
    #[serde(default)]
    statistics: Option<Statistics>,
}

#[derive(Debug, Clone, Deserialize)]
struct Namespace {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Statistics {
    #[serde(default)]
    repository_size: u64,
}

#[derive(Debug, Deserialize)]
struct WireRelease {
    #[serde(default)]
    name: Option<String>,
    tag_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    released_at: Option<DateTime<Utc>>,
    #[serde(default)]
    assets: WireAssets,
}

#[derive(Debug, Default, Deserialize)]
struct WireAssets {
    #[serde(default)]
    links: Vec<WireLink>,
}

#[derive(Debug, Deserialize)]
struct WireLink {
    name: String,
    url: String,
}

impl ProjectSummary {
    /// Author shown for the map, taken from the owning namespace.
    pub fn author(&self) -> Option<&str> {
        self.namespace.as_ref().map(|n| n.name.as_str())
    }

    /// Combines the summary with its fetched releases into a result entry.
    pub fn into_entry(self, releases: Vec<Release>) -> ResultEntry {
        let author = self.author().map(str::to_string);
        ResultEntry {
            id: self.id,
            name: self.name,
            author,
            size: self.statistics.map(|s| s.repository_size).unwrap_or(0),
            description: clean_html(self.description.as_deref().unwrap_or_default()),
            preview_url: self.avatar_url,
            releases,
        }
    }
}

/// Decodes the count probe payload.
///
/// # Errors
/// - `CatalogError::Parse` - Payload is not a JSON array of projects
pub fn parse_projects(body: &[u8]) -> Result<Vec<ProjectSummary>, CatalogError> {
    serde_json::from_slice(body).map_err(|e| CatalogError::Parse {
        reason: format!("project list: {e}"),
    })
}

/// Decodes the detail probe payload.
///
/// Releases without any asset link cannot be downloaded and are dropped.
///
/// # Errors
/// - `CatalogError::Parse` - Payload is not a JSON array of releases
pub fn parse_releases(body: &[u8]) -> Result<Vec<Release>, CatalogError> {
    let wire: Vec<WireRelease> = serde_json::from_slice(body).map_err(|e| CatalogError::Parse {
        reason: format!("release list: {e}"),
    })?;

    Ok(wire
        .into_iter()
        .filter_map(|release| {
            let link = release
                .assets
                .links
                .iter()
                .find(|l| l.name.to_ascii_lowercase().ends_with(".zip"))
                .or_else(|| release.assets.links.first())?;
            let download_url = link.url.clone();

            Some(Release {
                name: release.name.unwrap_or_else(|| release.tag_name.clone()),
                tag: release.tag_name,
                description: clean_html(release.description.as_deref().unwrap_or_default()),
                download_url,
                released_at: release.released_at,
            })
        })
        .collect())
}

/// Strips markup from catalog descriptions.
pub fn clean_html(html: &str) -> String {
    let stripped = TAG_PATTERN.replace_all(html, "");
    stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}
