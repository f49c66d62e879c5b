//! Test doubles and fixtures shared by the Mapfetch crates.
//!
//! Available under `cfg(test)` and the `test-utils` feature.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use crate::catalog::{CatalogClient, CatalogError, CatalogResponse, ProgressFn};

const PROGRESS_CHUNKS: usize = 4;

#[derive(Debug, Clone)]
enum MockReply {
    Response(CatalogResponse),
    Transport(String),
}

#[derive(Debug, Clone)]
struct MockRoute {
    latency: Duration,
    reply: MockReply,
}

/// Scripted catalog client.
///
/// Each URL gets a canned reply and an optional latency; unknown URLs answer
/// 404. Every call is counted so tests can assert what was requested.
#[derive(Debug, Default)]
pub struct MockCatalogClient {
    routes: Mutex<HashMap<String, MockRoute>>,
    requests: Mutex<HashMap<String, usize>>,
}

impl MockCatalogClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `url` immediately with `response`.
    pub fn respond(&self, url: impl Into<String>, response: CatalogResponse) {
        self.respond_after(url, Duration::ZERO, response);
    }

    /// Answers `url` with `response` after `latency`.
    pub fn respond_after(&self, url: impl Into<String>, latency: Duration, response: CatalogResponse) {
        self.routes.lock().insert(
            url.into(),
            MockRoute {
                latency,
                reply: MockReply::Response(response),
            },
        );
    }

    /// Fails `url` with a transport error after `latency`.
    pub fn fail_transport(&self, url: impl Into<String>, latency: Duration, reason: &str) {
        self.routes.lock().insert(
            url.into(),
            MockRoute {
                latency,
                reply: MockReply::Transport(reason.to_string()),
            },
        );
    }

    /// Number of calls made for `url`.
    pub fn request_count(&self, url: &str) -> usize {
        self.requests.lock().get(url).copied().unwrap_or(0)
    }

    /// Number of calls made for any URL.
    pub fn total_requests(&self) -> usize {
        self.requests.lock().values().sum()
    }

    async fn resolve(&self, url: &str) -> Result<CatalogResponse, CatalogError> {
        *self.requests.lock().entry(url.to_string()).or_default() += 1;
        let route = self.routes.lock().get(url).cloned();

        let Some(route) = route else {
            return Ok(CatalogResponse::new(404, &b"{\"message\":\"404 Not Found\"}"[..]));
        };
        if !route.latency.is_zero() {
            tokio::time::sleep(route.latency).await;
        }
        match route.reply {
            MockReply::Response(response) => Ok(response),
            MockReply::Transport(reason) => Err(CatalogError::Transport {
                url: url.to_string(),
                reason,
            }),
        }
    }
}

#[async_trait]
impl CatalogClient for MockCatalogClient {
    async fn send(&self, url: &str) -> Result<CatalogResponse, CatalogError> {
        self.resolve(url).await
    }

    async fn send_with_progress(
        &self,
        url: &str,
        on_progress: &ProgressFn,
    ) -> Result<CatalogResponse, CatalogError> {
        let response = self.resolve(url).await?;
        if response.is_success() {
            let total = response.body.len() as u64;
            let step = (response.body.len() / PROGRESS_CHUNKS).max(1);
            let mut transferred = 0usize;
            while transferred < response.body.len() {
                transferred = (transferred + step).min(response.body.len());
                on_progress(total, transferred as u64);
            }
        }
        Ok(response)
    }
}

/// Count probe payload listing projects as `(id, name)`.
pub fn projects_payload(projects: &[(u64, &str)]) -> CatalogResponse {
    let body: Vec<_> = projects
        .iter()
        .map(|(id, name)| {
            json!({
                "id": id,
                "name": name,
                "description": format!("<p>{name} description</p>"),
                "avatar_url": format!("https://cdn.test/{id}/preview.png"),
                "namespace": { "name": "tester" },
                "statistics": { "repository_size": 1024 * id }
            })
        })
        .collect();
    CatalogResponse::new(200, serde_json::to_vec(&body).unwrap_or_default())
}

/// Detail probe payload listing releases as `(tag, download_url)`.
pub fn releases_payload(releases: &[(&str, &str)]) -> CatalogResponse {
    let body: Vec<_> = releases
        .iter()
        .map(|(tag, url)| {
            json!({
                "name": format!("Release {tag}"),
                "tag_name": tag,
                "description": "",
                "released_at": "2024-03-01T12:00:00.000Z",
                "assets": { "links": [ { "name": format!("{tag}.zip"), "url": url } ] }
            })
        })
        .collect();
    CatalogResponse::new(200, serde_json::to_vec(&body).unwrap_or_default())
}

/// Builds an in-memory ZIP archive from `(path, contents)` pairs.
///
/// # Errors
/// - `zip::result::ZipError` - Entry could not be written
pub fn zip_archive(entries: &[(&str, &[u8])]) -> zip::result::ZipResult<Vec<u8>> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer.start_file(*name, zip::write::SimpleFileOptions::default())?;
        writer.write_all(data)?;
    }
    Ok(writer.finish()?.into_inner())
}
