//! Game server discovery.
//!
//! The resource version and the CDN base URL are resolved in two hops:
//!
//! ```text
//! network_config ──► {"content": "<links JSON>"}
//!                         └─► configs.*.network.{hv, hu}
//! hv (with {0} = Android) ──► {"resVersion", "clientVersion"}
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::download::{DownloadTask, HttpFetcher};
use crate::manifest::{get_json, get_text, parse_json, ManifestError, ManifestResult};
use crate::paths::VersionLayout;
use crate::progress::ProgressStore;

/// Platform whose assets are downloaded.
pub const PLATFORM: &str = "Android";

const CHINA_NETWORK_CONFIG: &str = "https://ak-conf.hypergryph.com/config/prod/official/network_config";
const GLOBAL_NETWORK_CONFIG: &str =
    "https://ark-us-static-online.yo-star.com/assetbundle/official/network_config";
const CHINA_CLIENT_URL: &str = "https://ak.hypergryph.com/downloads/android_lastest";
const CLIENT_ASSETS_PREFIX: &str = "assets/AB/Android/";

/// Which game server to download from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Server {
    #[default]
    Global,
    China,
}

impl Server {
    pub fn network_config_url(self) -> &'static str {
        match self {
            Server::Global => GLOBAL_NETWORK_CONFIG,
            Server::China => CHINA_NETWORK_CONFIG,
        }
    }

    /// Version folder prefix, `GL` or `CN`.
    pub fn tag(self) -> &'static str {
        match self {
            Server::Global => "GL",
            Server::China => "CN",
        }
    }

    /// Archives downloaded in addition to the manifest packs.
    pub fn extra_archives(self) -> Vec<ExtraArchive> {
        match self {
            Server::China => vec![ExtraArchive::china_client()],
            Server::Global => Vec::new(),
        }
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Server::Global => write!(f, "global"),
            Server::China => write!(f, "china"),
        }
    }
}

impl FromStr for Server {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "global" | "gl" => Ok(Server::Global),
            "china" | "cn" => Ok(Server::China),
            other => Err(format!("unknown server '{}' (expected global or china)", other)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NetworkConfig {
    content: String,
}

#[derive(Debug, Deserialize)]
struct LinksConfig {
    configs: BTreeMap<String, LinksInfo>,
}

#[derive(Debug, Deserialize)]
struct LinksInfo {
    network: Links,
}

#[derive(Debug, Deserialize)]
struct Links {
    #[serde(default)]
    hv: Option<String>,
    #[serde(default)]
    hu: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Versions {
    #[serde(rename = "resVersion")]
    resource_version: String,
    #[serde(rename = "clientVersion")]
    client_version: String,
}

/// Version lookup URL and assets base from a `network_config` document.
pub fn parse_network_config(body: &str) -> ManifestResult<(String, String)> {
    let outer: NetworkConfig = parse_json(body, "network_config")?;
    let links: LinksConfig = parse_json(&outer.content, "network_config content")?;
    links
        .configs
        .into_values()
        .find_map(|info| match (info.network.hv, info.network.hu) {
            (Some(hv), Some(hu)) => Some((hv.replace("{0}", PLATFORM), hu)),
            _ => None,
        })
        .ok_or_else(|| ManifestError::Parse {
            document: "network_config".to_string(),
            reason: "no entry with both version and assets links".to_string(),
        })
}

/// Current versions of one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub server: Server,
    pub resource_version: String,
    pub client_version: String,
    /// CDN base, without platform and version.
    pub assets_base: String,
}

impl ServerInfo {
    /// Resolve the current versions of `server`.
    pub fn fetch(fetcher: &HttpFetcher, server: Server) -> ManifestResult<Self> {
        let config = get_text(fetcher, server.network_config_url())?;
        let (versions_url, assets_base) = parse_network_config(&config)?;
        let versions: Versions = get_json(fetcher, &versions_url, "versions")?;

        let info = Self {
            server,
            resource_version: versions.resource_version,
            client_version: versions.client_version,
            assets_base,
        };
        tracing::info!(
            server = %server,
            resource_version = %info.resource_version,
            client_version = %info.client_version,
            "Server info resolved"
        );
        Ok(info)
    }

    /// `{assets_base}/Android/assets/{resource_version}`.
    pub fn assets_url(&self) -> String {
        format!("{}/{}/assets/{}", self.assets_base, PLATFORM, self.resource_version)
    }

    /// Version folder name, e.g. `CN_24-01-01-00-00-00_abcdef`.
    pub fn folder_name(&self) -> String {
        format!("{}_{}", self.server.tag(), self.resource_version)
    }
}

/// An archive fetched from a fixed URL and unpacked from a subdirectory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraArchive {
    /// Progress record and file name under `raw_resources/`.
    pub name: String,
    pub url: String,
    /// Only entries below this prefix are unpacked, with the prefix removed.
    pub prefix: String,
}

impl ExtraArchive {
    /// The China client package; its bundled assets complement the packs.
    pub fn china_client() -> Self {
        Self {
            name: "game.apk".to_string(),
            url: CHINA_CLIENT_URL.to_string(),
            prefix: CLIENT_ASSETS_PREFIX.to_string(),
        }
    }

    pub fn task(&self, layout: &VersionLayout, store: &ProgressStore) -> DownloadTask {
        DownloadTask::new(
            self.url.clone(),
            layout.raw_resources().join(&self.name),
            store.load(&self.name),
        )
    }
}
