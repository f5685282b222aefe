//! Minimal GitHub client: release assets, repository trees and raw files.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;

use crate::processor::{ProcessorError, ProcessorResult};

const API_BASE: &str = "https://api.github.com";
const RAW_BASE: &str = "https://raw.githubusercontent.com";

/// GitHub rejects API requests without a user agent.
const USER_AGENT: &str = concat!("assetforge/", env!("CARGO_PKG_VERSION"));

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

/// One entry of a recursive tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    /// Git object id of the blob.
    pub sha: String,
    /// `blob` or `tree`.
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
struct Tree {
    tree: Vec<TreeEntry>,
}

/// Assets of the newest release in a `/releases` listing.
pub fn parse_release_assets(body: &str) -> ProcessorResult<Vec<ReleaseAsset>> {
    let releases: Vec<Release> = serde_json::from_str(body)
        .map_err(|e| ProcessorError::Setup(format!("invalid release listing: {}", e)))?;
    releases
        .into_iter()
        .next()
        .map(|r| r.assets)
        .ok_or_else(|| ProcessorError::Setup("repository has no releases".to_string()))
}

pub fn parse_tree(body: &str) -> ProcessorResult<Vec<TreeEntry>> {
    let tree: Tree = serde_json::from_str(body)
        .map_err(|e| ProcessorError::Setup(format!("invalid tree listing: {}", e)))?;
    Ok(tree.tree)
}

/// Pick the prebuilt schema compiler for `os`/`arch`
/// (values of [`std::env::consts`]).
pub fn pick_flatc_asset<'a>(
    assets: &'a [ReleaseAsset],
    os: &str,
    arch: &str,
) -> Option<&'a ReleaseAsset> {
    let wanted: fn(&str) -> bool = match (os, arch) {
        ("macos", _) => |n| n.contains("Mac") && !n.contains("Intel"),
        ("windows", "x86_64") => |n| n.contains("Windows"),
        ("linux", "x86_64") => {
            |n| n.contains("Linux") && n.contains("g++") && !n.contains("clang")
        }
        _ => return None,
    };
    assets.iter().find(|a| wanted(&a.name))
}

/// Blocking client for the few GitHub endpoints the schema processor needs.
pub struct GitHubClient {
    client: Client,
}

impl GitHubClient {
    pub fn new(timeout: Duration) -> ProcessorResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProcessorError::Setup(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn get_bytes(&self, url: &str) -> ProcessorResult<Vec<u8>> {
        let failed = |e: reqwest::Error| ProcessorError::Setup(format!("GET {}: {}", url, e));
        let response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(failed)?;
        Ok(response.bytes().map_err(failed)?.to_vec())
    }

    fn get_text(&self, url: &str) -> ProcessorResult<String> {
        let bytes = self.get_bytes(url)?;
        String::from_utf8(bytes)
            .map_err(|e| ProcessorError::Setup(format!("GET {}: {}", url, e)))
    }

    pub fn latest_release_assets(&self, owner: &str, repo: &str) -> ProcessorResult<Vec<ReleaseAsset>> {
        let url = format!("{}/repos/{}/{}/releases", API_BASE, owner, repo);
        parse_release_assets(&self.get_text(&url)?)
    }

    /// Recursive tree of `branch`.
    pub fn tree(&self, owner: &str, repo: &str, branch: &str) -> ProcessorResult<Vec<TreeEntry>> {
        let url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            API_BASE, owner, repo, branch
        );
        parse_tree(&self.get_text(&url)?)
    }

    pub fn raw_file(&self, owner: &str, repo: &str, branch: &str, path: &str) -> ProcessorResult<Vec<u8>> {
        let url = format!("{}/{}/{}/{}/{}", RAW_BASE, owner, repo, branch, path);
        self.get_bytes(&url)
    }

    pub fn download(&self, url: &str) -> ProcessorResult<Vec<u8>> {
        self.get_bytes(url)
    }
}
