//! Pack manifest (`hot_update_list.json`).

use reqwest::header::USER_AGENT;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::download::{DownloadTask, HttpFetcher};
use crate::paths::VersionLayout;
use crate::progress::ProgressStore;

/// Name of the manifest document under an assets URL.
pub const MANIFEST_FILE: &str = "hot_update_list.json";

/// Result type for manifest and server lookups.
pub type ManifestResult<T> = Result<T, ManifestError>;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    #[error("invalid {document}: {reason}")]
    Parse { document: String, reason: String },

    #[error("invalid pack name '{0}'")]
    InvalidName(String),
}

/// GET `url` with the configured user agent.
pub(crate) fn get_text(fetcher: &HttpFetcher, url: &str) -> ManifestResult<String> {
    let failed = |e: reqwest::Error| ManifestError::Http {
        url: url.to_string(),
        reason: e.to_string(),
    };
    fetcher
        .client()
        .get(url)
        .header(USER_AGENT, fetcher.user_agent())
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(failed)?
        .text()
        .map_err(failed)
}

/// GET `url` and decode its JSON body.
pub(crate) fn get_json<T: DeserializeOwned>(
    fetcher: &HttpFetcher,
    url: &str,
    document: &str,
) -> ManifestResult<T> {
    parse_json(&get_text(fetcher, url)?, document)
}

pub(crate) fn parse_json<T: DeserializeOwned>(body: &str, document: &str) -> ManifestResult<T> {
    serde_json::from_str(body).map_err(|e| ManifestError::Parse {
        document: document.to_string(),
        reason: e.to_string(),
    })
}

/// One downloadable pack.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackEntry {
    pub name: String,
    #[serde(rename = "hash", default)]
    pub content_hash: String,
    /// Advertised size, used for progress until the server reports its own.
    #[serde(rename = "totalSize", default)]
    pub total_size: u64,
}

/// The packs of one resource version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PackManifest {
    #[serde(rename = "packInfos", default)]
    pub entries: Vec<PackEntry>,
}

impl PackManifest {
    /// Parse and validate a manifest document.
    pub fn parse(body: &str) -> ManifestResult<Self> {
        let manifest: Self = parse_json(body, MANIFEST_FILE)?;
        if let Some(bad) = manifest.entries.iter().find(|e| !is_valid_name(&e.name)) {
            return Err(ManifestError::InvalidName(bad.name.clone()));
        }
        Ok(manifest)
    }

    /// Fetch `{assets_url}/hot_update_list.json`.
    pub fn fetch(fetcher: &HttpFetcher, assets_url: &str) -> ManifestResult<Self> {
        let url = format!("{}/{}", assets_url, MANIFEST_FILE);
        let manifest = Self::parse(&get_text(fetcher, &url)?)?;
        tracing::info!(packs = manifest.len(), bytes = manifest.total_size(), "Manifest fetched");
        Ok(manifest)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of advertised pack sizes.
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.total_size).sum()
    }

    /// One download task per pack, resuming from the stored progress.
    ///
    /// Packs go to `raw_resources/<name>.dat`. A record with no known
    /// length takes the advertised size.
    pub fn tasks(&self, assets_url: &str, layout: &VersionLayout, store: &ProgressStore) -> Vec<DownloadTask> {
        self.entries
            .iter()
            .map(|entry| {
                let mut record = store.load(&entry.name);
                if record.length == 0 && !record.done {
                    record.length = entry.total_size;
                }
                DownloadTask::new(
                    format!("{}/{}.dat", assets_url, entry.name),
                    layout.archive_path(&entry.name),
                    record,
                )
            })
            .collect()
    }
}

/// Pack names double as file names.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}
