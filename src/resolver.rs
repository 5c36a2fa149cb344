// src/resolver.rs

//! Pinned reference resolution
//!
//! Turns a package name, a channel and a set of exact field constraints
//! into one download URL, optionally with a content hash. This is a
//! filter over index entries, not a dependency solver.

use crate::error::{Error, Result};
use crate::repository::{IndexRecord, PackageIndex};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io;
use tracing::{debug, info, warn};
use url::Url;

/// Exact field matches applied to index entries (`version`, `build`, ...)
pub type Constraints = BTreeMap<String, String>;

/// What to do when several index entries survive filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmbiguityPolicy {
    /// Take the first entry in index order and log a warning
    #[default]
    FirstMatch,
    /// Fail with `Error::AmbiguousPackage`
    Strict,
}

/// A fully resolved package download location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedReference {
    pub name: String,
    pub url: String,
    pub hash: Option<String>,
}

impl fmt::Display for PinnedReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.hash {
            Some(hash) => write!(f, "{}#{}", self.url, hash),
            None => write!(f, "{}", self.url),
        }
    }
}

/// Render constraints for error messages
pub fn describe_constraints(constraints: &Constraints) -> String {
    if constraints.is_empty() {
        return "no constraints".to_string();
    }
    constraints
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct PinResolver<I> {
    index: I,
    policy: AmbiguityPolicy,
}

impl<I: PackageIndex> PinResolver<I> {
    pub fn new(index: I, policy: AmbiguityPolicy) -> Self {
        Self { index, policy }
    }

    pub fn policy(&self) -> AmbiguityPolicy {
        self.policy
    }

    /// Resolve `package` in `channel` to a single pinned reference
    pub fn resolve(
        &self,
        package: &str,
        channel: &str,
        constraints: &Constraints,
        with_hash: bool,
    ) -> Result<PinnedReference> {
        debug!(
            "Resolving {} from {} ({})",
            package,
            channel,
            describe_constraints(constraints)
        );

        let candidates: Vec<IndexRecord> = self
            .index
            .query(channel, package)?
            .into_iter()
            .filter(|record| matches_constraints(record, constraints))
            .collect();

        let Some(chosen) = candidates.first() else {
            return Err(Error::NoMatchingPackage {
                package: package.to_string(),
                channel: channel.to_string(),
                constraints: describe_constraints(constraints),
            });
        };

        if candidates.len() > 1 {
            match self.policy {
                AmbiguityPolicy::Strict => {
                    return Err(Error::AmbiguousPackage {
                        package: package.to_string(),
                        channel: channel.to_string(),
                        constraints: describe_constraints(constraints),
                        candidates: candidates.len(),
                    });
                }
                AmbiguityPolicy::FirstMatch => warn!(
                    "{} builds of {} in {} match {}; using {}-{}-{}",
                    candidates.len(),
                    package,
                    channel,
                    describe_constraints(constraints),
                    chosen.name,
                    chosen.version,
                    chosen.build
                ),
            }
        }

        let url = chosen
            .url
            .clone()
            .ok_or_else(|| Error::NoMatchingPackage {
                package: package.to_string(),
                channel: channel.to_string(),
                constraints: format!("{} (entry has no download URL)", describe_constraints(constraints)),
            })?;

        let hash = if with_hash {
            Some(checksum(chosen, &url)?)
        } else {
            None
        };

        let pinned = PinnedReference {
            name: chosen.name.clone(),
            url,
            hash,
        };
        info!("Pinned {} to {}", package, pinned);
        Ok(pinned)
    }
}

fn matches_constraints(record: &IndexRecord, constraints: &Constraints) -> bool {
    constraints
        .iter()
        .all(|(key, expected)| record.field(key).as_deref() == Some(expected.as_str()))
}

/// Checksum for a lock line: md5 when indexed, else sha256
fn checksum(record: &IndexRecord, url: &str) -> Result<String> {
    if let Some(md5) = &record.md5 {
        return Ok(md5.clone());
    }
    if let Some(sha256) = &record.sha256 {
        return Ok(format!("sha256:{}", sha256));
    }

    // Local builds are often indexed without hashes; hash the file itself.
    let path = Url::parse(url)
        .ok()
        .filter(|u| u.scheme() == "file")
        .and_then(|u| u.to_file_path().ok())
        .ok_or_else(|| Error::MissingChecksum(url.to_string()))?;

    debug!("Computing checksum for {}", path.display());
    let mut file = File::open(&path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("sha256:{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticIndex(Vec<IndexRecord>);

    impl PackageIndex for StaticIndex {
        fn query(&self, _channel: &str, package: &str) -> Result<Vec<IndexRecord>> {
            Ok(self.0.iter().filter(|r| r.name == package).cloned().collect())
        }
    }

    fn record(version: &str, build: &str, md5: Option<&str>) -> IndexRecord {
        let mut record = IndexRecord::new("widgetron_app", version, build);
        record.url = Some(format!(
            "https://example.com/noarch/widgetron_app-{}-{}.tar.bz2",
            version, build
        ));
        record.md5 = md5.map(str::to_string);
        record
    }

    fn index() -> StaticIndex {
        StaticIndex(vec![
            record("1.2.3", "py_0", Some("aaa")),
            record("1.2.3", "py_1", Some("bbb")),
            record("1.3.0", "py_0", Some("ccc")),
        ])
    }

    fn constraints(pairs: &[(&str, &str)]) -> Constraints {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_resolve_exact_match_with_hash() {
        let resolver = PinResolver::new(index(), AmbiguityPolicy::Strict);
        let pinned = resolver
            .resolve(
                "widgetron_app",
                "local",
                &constraints(&[("version", "1.2.3"), ("build", "py_1")]),
                true,
            )
            .unwrap();

        assert_eq!(pinned.hash.as_deref(), Some("bbb"));
        assert_eq!(
            pinned.to_string(),
            "https://example.com/noarch/widgetron_app-1.2.3-py_1.tar.bz2#bbb"
        );
    }

    #[test]
    fn test_resolve_without_hash() {
        let resolver = PinResolver::new(index(), AmbiguityPolicy::FirstMatch);
        let pinned = resolver
            .resolve("widgetron_app", "local", &constraints(&[("version", "1.3.0")]), false)
            .unwrap();
        assert_eq!(pinned.hash, None);
        assert!(!pinned.to_string().contains('#'));
    }

    #[test]
    fn test_ambiguity_policies() {
        let loose = PinResolver::new(index(), AmbiguityPolicy::FirstMatch);
        let pinned = loose
            .resolve("widgetron_app", "local", &constraints(&[("version", "1.2.3")]), true)
            .unwrap();
        assert_eq!(pinned.hash.as_deref(), Some("aaa"));

        let strict = PinResolver::new(index(), AmbiguityPolicy::Strict);
        let err = strict
            .resolve("widgetron_app", "local", &constraints(&[("version", "1.2.3")]), true)
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousPackage { candidates: 2, .. }));
    }

    #[test]
    fn test_no_match_names_package_channel_and_constraints() {
        let resolver = PinResolver::new(index(), AmbiguityPolicy::FirstMatch);
        let err = resolver
            .resolve("widgetron_app", "my-channel", &constraints(&[("version", "9.9")]), true)
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("widgetron_app"));
        assert!(message.contains("my-channel"));
        assert!(message.contains("version=9.9"));
    }

    #[test]
    fn test_sha256_fallback_and_local_hashing() {
        let mut indexed = record("2.0", "0", None);
        indexed.sha256 = Some("feed".to_string());
        let resolver = PinResolver::new(StaticIndex(vec![indexed]), AmbiguityPolicy::Strict);
        let pinned = resolver
            .resolve("widgetron_app", "c", &Constraints::new(), true)
            .unwrap();
        assert_eq!(pinned.hash.as_deref(), Some("sha256:feed"));

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("widgetron_app-3.0-0.tar.bz2");
        std::fs::write(&file, b"abc").unwrap();
        let mut local = IndexRecord::new("widgetron_app", "3.0", "0");
        local.url = Some(Url::from_file_path(&file).unwrap().to_string());
        let resolver = PinResolver::new(StaticIndex(vec![local]), AmbiguityPolicy::Strict);
        let pinned = resolver
            .resolve("widgetron_app", "local", &Constraints::new(), true)
            .unwrap();
        assert_eq!(
            pinned.hash.as_deref(),
            Some("sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn test_remote_entry_without_hash_fails() {
        let resolver = PinResolver::new(
            StaticIndex(vec![record("1.0", "0", None)]),
            AmbiguityPolicy::Strict,
        );
        let err = resolver
            .resolve("widgetron_app", "c", &Constraints::new(), true)
            .unwrap_err();
        assert!(matches!(err, Error::MissingChecksum(_)));
    }
}
