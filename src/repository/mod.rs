// src/repository/mod.rs

//! Channel package indexes
//!
//! This module provides functionality for:
//! - Reading `repodata.json` from local (`file:`) channels
//! - Fetching `repodata.json` from remote channels
//! - Listing every build of a package across the host and `noarch` subdirs
//!
//! Each query is a single blocking round trip per subdir. Failures are
//! surfaced to the caller and never retried here.

use crate::channel::ChannelRegistry;
use crate::error::{Error, Result};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};
use url::Url;

/// Index file name inside every channel subdir
pub const REPODATA: &str = "repodata.json";

/// One build of a package as listed in a channel index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub build: String,
    #[serde(default)]
    pub build_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdir: Option<String>,
    #[serde(rename = "fn", default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// Remaining index fields (depends, platform, timestamp, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl IndexRecord {
    /// Create a minimal record, mostly useful for tests
    pub fn new(name: &str, version: &str, build: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            build: build.to_string(),
            build_number: 0,
            subdir: None,
            filename: None,
            url: None,
            md5: None,
            sha256: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Value of a named index field rendered as a plain string
    pub fn field(&self, key: &str) -> Option<String> {
        let value = serde_json::to_value(self).ok()?;
        match value.get(key)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Contents of a subdir's `repodata.json`
#[derive(Debug, Default, Deserialize)]
struct Repodata {
    #[serde(default)]
    packages: BTreeMap<String, IndexRecord>,
    #[serde(rename = "packages.conda", default)]
    conda_packages: BTreeMap<String, IndexRecord>,
}

/// Source of package build listings for a channel
pub trait PackageIndex {
    /// Every build of `package` available in `channel`, in index order
    fn query(&self, channel: &str, package: &str) -> Result<Vec<IndexRecord>>;
}

impl<T: PackageIndex + ?Sized> PackageIndex for Box<T> {
    fn query(&self, channel: &str, package: &str) -> Result<Vec<IndexRecord>> {
        (**self).query(channel, package)
    }
}

/// Conda platform subdir of the running host
pub fn host_subdir() -> &'static str {
    if cfg!(all(target_os = "windows", target_arch = "x86_64")) {
        "win-64"
    } else if cfg!(all(target_os = "windows", target_arch = "aarch64")) {
        "win-arm64"
    } else if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
        "osx-arm64"
    } else if cfg!(target_os = "macos") {
        "osx-64"
    } else if cfg!(all(target_os = "linux", target_arch = "aarch64")) {
        "linux-aarch64"
    } else if cfg!(all(target_os = "linux", target_arch = "powerpc64")) {
        "linux-ppc64le"
    } else {
        "linux-64"
    }
}

/// Reads `repodata.json` from local or remote channels
pub struct RepodataIndex {
    registry: ChannelRegistry,
    client: Client,
    subdirs: Vec<String>,
}

impl RepodataIndex {
    /// Create an index reader for the host subdir and `noarch`
    pub fn new(registry: ChannelRegistry) -> Result<Self> {
        let client = Client::builder()
            .timeout(None)
            .build()
            .map_err(|e| Error::DownloadError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            registry,
            client,
            subdirs: vec![host_subdir().to_string(), "noarch".to_string()],
        })
    }

    pub fn with_subdirs(mut self, subdirs: Vec<String>) -> Self {
        self.subdirs = subdirs;
        self
    }

    /// Raw repodata for one subdir, `None` if the channel has no such subdir
    fn load_subdir(&self, base: &Url, subdir: &str) -> Result<Option<Repodata>> {
        let url = base
            .join(&format!("{}/{}", subdir, REPODATA))
            .map_err(|e| Error::InvalidChannel(format!("{}: {}", base, e)))?;

        if url.scheme() == "file" {
            let path = url
                .to_file_path()
                .map_err(|_| Error::InvalidChannel(url.to_string()))?;
            if !path.is_file() {
                debug!("No index at {}", path.display());
                return Ok(None);
            }
            let contents = std::fs::read_to_string(&path)?;
            return Ok(Some(serde_json::from_str(&contents)?));
        }

        info!("Fetching channel index from {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| Error::DownloadError(format!("Failed to fetch {}: {}", url, e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("No index at {}", url);
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let repodata = response
            .json()
            .map_err(|e| Error::DownloadError(format!("Failed to parse {}: {}", url, e)))?;
        Ok(Some(repodata))
    }
}

impl PackageIndex for RepodataIndex {
    fn query(&self, channel: &str, package: &str) -> Result<Vec<IndexRecord>> {
        let base = self.registry.base_url(channel)?;
        let mut records = Vec::new();

        for subdir in &self.subdirs {
            let Some(repodata) = self.load_subdir(&base, subdir)? else {
                continue;
            };
            let entries = repodata
                .packages
                .into_iter()
                .chain(repodata.conda_packages);
            for (filename, mut record) in entries {
                if record.name != package {
                    continue;
                }
                record.subdir.get_or_insert_with(|| subdir.clone());
                if record.url.is_none() {
                    let url = base
                        .join(&format!("{}/{}", subdir, filename))
                        .map_err(|e| Error::InvalidChannel(format!("{}: {}", base, e)))?;
                    record.url = Some(url.to_string());
                }
                record.filename.get_or_insert(filename);
                records.push(record);
            }
        }

        debug!(
            "Found {} builds of {} in {}",
            records.len(),
            package,
            channel
        );
        Ok(records)
    }
}
