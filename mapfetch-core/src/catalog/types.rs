//! Catalog item types surfaced by search.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::preview::PREVIEW_DIR;

/// One catalog item with its downloadable releases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub id: u64,
    pub name: String,
    pub author: Option<String>,
    pub size: u64,
    pub description: String,
    pub preview_url: Option<String>,
    pub releases: Vec<Release>,
}

/// A downloadable release artifact of a catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub name: String,
    pub tag: String,
    pub description: String,
    pub download_url: String,
    pub released_at: Option<DateTime<Utc>>,
}

impl ResultEntry {
    /// Format item size in human-readable format.
    pub fn format_size(&self) -> String {
        const GB: u64 = 1024 * 1024 * 1024;
        const MB: u64 = 1024 * 1024;

        if self.size >= GB {
            format!("{:.1} GB", self.size as f64 / GB as f64)
        } else if self.size >= MB {
            format!("{:.1} MB", self.size as f64 / MB as f64)
        } else {
            format!("{:.1} KB", self.size as f64 / 1024.0)
        }
    }

    /// Finds a release by its version tag.
    pub fn release(&self, tag: &str) -> Option<&Release> {
        self.releases.iter().find(|r| r.tag == tag)
    }

    /// Most recent release, falling back to catalog order when dates are missing.
    pub fn latest_release(&self) -> Option<&Release> {
        self.releases
            .iter()
            .filter(|r| r.released_at.is_some())
            .max_by_key(|r| r.released_at)
            .or_else(|| self.releases.first())
    }

    /// Folder name usable on every supported file system.
    ///
    /// Names that collide with folders Mapfetch keeps beside the installs get
    /// the item id appended.
    pub fn folder_name(&self) -> String {
        let sanitized: String = self
            .name
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect();
        let trimmed = sanitized.trim().trim_matches('.');

        if trimmed.is_empty() {
            format!("map-{}", self.id)
        } else if trimmed.eq_ignore_ascii_case(PREVIEW_DIR) {
            format!("{trimmed}-{}", self.id)
        } else {
            trimmed.to_string()
        }
    }
}
