// src/channel.rs

//! Channel classification and ordering
//!
//! A channel is either local (a `file:` URI, a directory holding
//! `channeldata.json`, or the `local` build-output sentinel) or remote.
//! Normalized channel lists are deduplicated by first occurrence and keep
//! every local channel ahead of every remote one.

use crate::error::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

/// Sentinel naming the default local build output directory
pub const LOCAL_SENTINEL: &str = "local";

/// Metadata file every local channel directory must contain
pub const CHANNEL_METADATA: &str = "channeldata.json";

/// Remote channel appended when a list has no remote entries
pub const DEFAULT_CHANNEL: &str = "conda-forge";

/// Registry local channels fall back to at install time
pub const REMAP_TARGET: &str = "https://repo.anaconda.com/pkgs/main";

/// Base URL for bare channel names
pub const CHANNEL_ALIAS: &str = "https://conda.anaconda.org";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Local,
    Remote,
}

/// Deduplicated channels, local partition first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelList {
    local: Vec<String>,
    non_local: Vec<String>,
}

impl ChannelList {
    pub fn local(&self) -> &[String] {
        &self.local
    }

    pub fn non_local(&self) -> &[String] {
        &self.non_local
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.local.iter().chain(self.non_local.iter())
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.iter().any(|c| c == channel)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.iter().cloned().collect()
    }
}

/// One fallback entry for a local channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemapEntry {
    pub src: String,
    pub dest: String,
}

pub type ChannelRemap = Vec<RemapEntry>;

/// Classifies, validates and orders channels
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    local_build_dir: PathBuf,
    fallback_channel: String,
    remap_target: String,
    channel_alias: String,
}

impl ChannelRegistry {
    /// Create a registry whose `local` sentinel points at `local_build_dir`
    pub fn new(local_build_dir: impl Into<PathBuf>) -> Self {
        Self {
            local_build_dir: local_build_dir.into(),
            fallback_channel: DEFAULT_CHANNEL.to_string(),
            remap_target: REMAP_TARGET.to_string(),
            channel_alias: CHANNEL_ALIAS.to_string(),
        }
    }

    pub fn local_build_dir(&self) -> &Path {
        &self.local_build_dir
    }

    pub fn classify(&self, channel: &str) -> ChannelKind {
        if channel.starts_with("file:") || channel == LOCAL_SENTINEL {
            return ChannelKind::Local;
        }
        if Path::new(channel).join(CHANNEL_METADATA).is_file() {
            return ChannelKind::Local;
        }
        ChannelKind::Remote
    }

    pub fn is_local(&self, channel: &str) -> bool {
        self.classify(channel) == ChannelKind::Local
    }

    /// Deduplicate and partition channels, local first
    pub fn normalize<I, S>(&self, channels: I) -> ChannelList
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = ChannelList::default();
        for channel in channels {
            let channel = channel.as_ref();
            if list.contains(channel) {
                continue;
            }
            match self.classify(channel) {
                ChannelKind::Local => list.local.push(channel.to_string()),
                ChannelKind::Remote => list.non_local.push(channel.to_string()),
            }
        }
        if list.non_local.is_empty() {
            list.non_local.push(self.fallback_channel.clone());
        }
        debug!(
            "Normalized channels: {} local, {} remote",
            list.local.len(),
            list.non_local.len()
        );
        list
    }

    /// Filesystem directory a local channel refers to
    pub fn local_path(&self, channel: &str) -> Result<PathBuf> {
        if channel == LOCAL_SENTINEL {
            return Ok(self.local_build_dir.clone());
        }
        if channel.starts_with("file:") {
            let url = Url::parse(channel)
                .map_err(|e| Error::InvalidChannel(format!("{}: {}", channel, e)))?;
            return url
                .to_file_path()
                .map_err(|_| Error::InvalidChannel(format!("{} is not a file path", channel)));
        }
        Ok(PathBuf::from(channel))
    }

    /// Check that a local channel exists and carries channel metadata
    pub fn validate_local(&self, channel: &str) -> Result<PathBuf> {
        let path = self.local_path(channel)?;
        if !path.exists() {
            return Err(Error::InvalidLocalChannel {
                channel: channel.to_string(),
                path,
                reason: "nothing found at that path".to_string(),
            });
        }
        if !path.join(CHANNEL_METADATA).is_file() {
            return Err(Error::InvalidLocalChannel {
                channel: channel.to_string(),
                path,
                reason: format!("no '{}'", CHANNEL_METADATA),
            });
        }
        Ok(path)
    }

    /// Validate every local channel of a normalized list
    pub fn validate(&self, channels: &ChannelList) -> Result<()> {
        for channel in channels.local() {
            self.validate_local(channel)?;
        }
        Ok(())
    }

    pub fn remap(&self, channels: &ChannelList) -> ChannelRemap {
        channels
            .local()
            .iter()
            .map(|src| RemapEntry {
                src: src.clone(),
                dest: self.remap_target.clone(),
            })
            .collect()
    }

    /// Canonical form of a local channel: `local` or a `file:` URI
    pub fn canonicalize_local(&self, channel: &str) -> Result<String> {
        if channel == LOCAL_SENTINEL || channel.starts_with("file:") {
            return Ok(channel.to_string());
        }
        let absolute = std::path::absolute(channel)?;
        Url::from_directory_path(&absolute)
            .map(|url| url.as_str().trim_end_matches('/').to_string())
            .map_err(|_| Error::InvalidChannel(channel.to_string()))
    }

    /// Base URL of a channel's package index
    pub fn base_url(&self, channel: &str) -> Result<Url> {
        if self.is_local(channel) {
            let path = self.local_path(channel)?;
            let absolute = std::path::absolute(&path)?;
            return Url::from_directory_path(&absolute)
                .map_err(|_| Error::InvalidChannel(channel.to_string()));
        }
        let full = if channel.contains("://") {
            channel.to_string()
        } else {
            format!("{}/{}", self.channel_alias, channel.trim_matches('/'))
        };
        let with_slash = if full.ends_with('/') {
            full
        } else {
            format!("{}/", full)
        };
        Url::parse(&with_slash).map_err(|e| Error::InvalidChannel(format!("{}: {}", channel, e)))
    }
}
