// src/mutator.rs

//! Dependency injection into the active environment description
//!
//! Adds one freshly built package to whichever representation is active:
//! - explicit packages gain a pinned, hashed URL
//! - a manifest gains a dependency and its channel
//! - a lock file gains one `<url>#<hash>` line
//! - a live prefix drops any previous install of the package, then
//!   installs the pinned URL

use crate::channel::ChannelRegistry;
use crate::environment::manifest::{self, EnvironmentManifest};
use crate::environment::{PackageManager, Prefix, SpecSource, lockfile};
use crate::error::Result;
use crate::repository::PackageIndex;
use crate::resolver::{Constraints, PinResolver};
use tracing::{debug, info, warn};

/// Result of an injection, committed by the caller only on status 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injection {
    /// Exit status of the install step (always 0 for declarative sources)
    pub status: i32,
    /// Channels including the one the package came from
    pub channels: Vec<String>,
    /// The updated source
    pub source: SpecSource,
}

pub struct EnvironmentMutator<'a, I> {
    registry: &'a ChannelRegistry,
    resolver: &'a PinResolver<I>,
    installer: &'a dyn PackageManager,
}

impl<'a, I: PackageIndex> EnvironmentMutator<'a, I> {
    pub fn new(
        registry: &'a ChannelRegistry,
        resolver: &'a PinResolver<I>,
        installer: &'a dyn PackageManager,
    ) -> Self {
        Self {
            registry,
            resolver,
            installer,
        }
    }

    pub fn inject(
        &self,
        source: &SpecSource,
        channels: &[String],
        package: &str,
        channel: &str,
        attrs: &Constraints,
    ) -> Result<Injection> {
        let channel = if self.registry.is_local(channel) {
            self.registry.canonicalize_local(channel)?
        } else {
            channel.to_string()
        };

        let mut channels = channels.to_vec();
        if !channels.contains(&channel) {
            channels.push(channel.clone());
        }

        info!(
            "Injecting {} from {} into {}",
            package,
            channel,
            source.kind()
        );

        let (status, source) = match source {
            SpecSource::ExplicitPackages(specs) => {
                let pinned = self.resolver.resolve(package, &channel, attrs, true)?;
                let mut specs = specs.clone();
                specs.push(pinned.to_string());
                (0, SpecSource::ExplicitPackages(specs))
            }
            SpecSource::ManifestFile(path) => {
                let mut document = EnvironmentManifest::load(path)?;
                let spec = manifest::dependency_spec(
                    package,
                    attrs.get("version").map(String::as_str),
                    attrs.get("build").map(String::as_str),
                );
                let added_dependency = document.add_dependency(&spec);
                let added_channel = document.add_channel(&channel);
                if added_dependency || added_channel {
                    document.save()?;
                } else {
                    debug!("{} already lists {} and {}", path.display(), package, channel);
                }
                (0, source.clone())
            }
            SpecSource::LockFile(path) => {
                let pinned = self.resolver.resolve(package, &channel, attrs, true)?;
                lockfile::append_package(path, &pinned)?;
                (0, source.clone())
            }
            SpecSource::LiveEnvironment(path) => {
                let prefix = Prefix::open(path)?;
                prefix.ensure_not_installed(package)?;
                let pinned = self.resolver.resolve(package, &channel, attrs, false)?;
                let status = self
                    .installer
                    .install(prefix.root(), &[pinned.url.clone()], &channels)?;
                if status != 0 {
                    warn!(
                        "Installing {} into {} exited with status {}",
                        pinned.url,
                        path.display(),
                        status
                    );
                }
                (status, source.clone())
            }
        };

        Ok(Injection {
            status,
            channels,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::prefix::fixtures::install;
    use crate::error::Error;
    use crate::repository::IndexRecord;
    use crate::resolver::AmbiguityPolicy;
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};

    struct StaticIndex;

    impl PackageIndex for StaticIndex {
        fn query(&self, channel: &str, package: &str) -> Result<Vec<IndexRecord>> {
            let mut record = IndexRecord::new(package, "1.2.3", "py_0");
            record.url = Some(format!("{}/noarch/{}-1.2.3-py_0.tar.bz2", channel, package));
            record.md5 = Some("d41d8cd98f00b204e9800998ecf8427e".to_string());
            Ok(vec![record])
        }
    }

    #[derive(Default)]
    struct RecordingInstaller {
        calls: RefCell<Vec<(PathBuf, Vec<String>)>>,
        status: i32,
    }

    impl PackageManager for RecordingInstaller {
        fn install(&self, prefix: &Path, specs: &[String], _channels: &[String]) -> Result<i32> {
            self.calls
                .borrow_mut()
                .push((prefix.to_path_buf(), specs.to_vec()));
            Ok(self.status)
        }
    }

    fn attrs(version: &str) -> Constraints {
        Constraints::from([("version".to_string(), version.to_string())])
    }

    fn setup() -> (ChannelRegistry, PinResolver<StaticIndex>) {
        (
            ChannelRegistry::new("/opt/conda/conda-bld"),
            PinResolver::new(StaticIndex, AmbiguityPolicy::Strict),
        )
    }

    #[test]
    fn test_explicit_packages_gain_hashed_url() {
        let (registry, resolver) = setup();
        let installer = RecordingInstaller::default();
        let mutator = EnvironmentMutator::new(&registry, &resolver, &installer);
        let source = SpecSource::ExplicitPackages(vec!["jupyterlab".to_string()]);

        let injection = mutator
            .inject(&source, &["conda-forge".to_string()], "widgetron_app", "my-channel", &attrs("1.2.3"))
            .unwrap();

        assert_eq!(injection.status, 0);
        assert_eq!(injection.channels, vec!["conda-forge", "my-channel"]);
        let specs = injection.source.explicit_packages().unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(
            specs[1],
            "my-channel/noarch/widgetron_app-1.2.3-py_0.tar.bz2#d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn test_channel_is_not_duplicated() {
        let (registry, resolver) = setup();
        let installer = RecordingInstaller::default();
        let mutator = EnvironmentMutator::new(&registry, &resolver, &installer);
        let source = SpecSource::ExplicitPackages(Vec::new());

        let injection = mutator
            .inject(&source, &["my-channel".to_string()], "widgetron_app", "my-channel", &Constraints::new())
            .unwrap();
        assert_eq!(injection.channels, vec!["my-channel"]);
    }

    #[test]
    fn test_local_channel_is_recorded_as_file_uri() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("channeldata.json"), "{}").unwrap();
        let (registry, resolver) = setup();
        let installer = RecordingInstaller::default();
        let mutator = EnvironmentMutator::new(&registry, &resolver, &installer);

        let injection = mutator
            .inject(
                &SpecSource::ExplicitPackages(Vec::new()),
                &[],
                "widgetron_app",
                dir.path().to_str().unwrap(),
                &Constraints::new(),
            )
            .unwrap();
        assert!(injection.channels[0].starts_with("file:"));
    }

    #[test]
    fn test_manifest_gains_dependency_and_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("environment.yml");
        std::fs::write(&path, "channels:\n  - conda-forge\ndependencies:\n  - jupyterlab\n").unwrap();
        let (registry, resolver) = setup();
        let installer = RecordingInstaller::default();
        let mutator = EnvironmentMutator::new(&registry, &resolver, &installer);
        let source = SpecSource::ManifestFile(path.clone());

        mutator
            .inject(&source, &[], "widgetron_app", "my-channel", &attrs("1.2.3"))
            .unwrap();

        let manifest = EnvironmentManifest::load(&path).unwrap();
        assert_eq!(manifest.channels(), vec!["my-channel", "conda-forge"]);
        assert_eq!(manifest.dependencies(), vec!["jupyterlab", "widgetron_app=1.2.3"]);

        // A second injection of the same package leaves the file alone
        let before = std::fs::read_to_string(&path).unwrap();
        mutator
            .inject(&source, &[], "widgetron_app", "my-channel", &attrs("1.2.3"))
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_lock_file_gains_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lock.txt");
        let original = "# platform: linux-64\n@EXPLICIT\nhttps://x/noarch/jupyterlab-3.4.8-py_0.tar.bz2#aa\n";
        std::fs::write(&path, original).unwrap();
        let (registry, resolver) = setup();
        let installer = RecordingInstaller::default();
        let mutator = EnvironmentMutator::new(&registry, &resolver, &installer);

        mutator
            .inject(&SpecSource::LockFile(path.clone()), &[], "widgetron_app", "c", &attrs("1.2.3"))
            .unwrap();

        let updated = std::fs::read_to_string(&path).unwrap();
        assert!(updated.starts_with(original));
        assert_eq!(
            &updated[original.len()..],
            "c/noarch/widgetron_app-1.2.3-py_0.tar.bz2#d41d8cd98f00b204e9800998ecf8427e\n"
        );
    }

    #[test]
    fn test_live_environment_reinstall_cleans_previous_files() {
        let dir = tempfile::tempdir().unwrap();
        let old_files = ["lib/widgetron_app/__init__.py", "share/widgetron_app/ui.zip"];
        let manifest = install(dir.path(), "widgetron_app", "1.0.0", &old_files);
        let (registry, resolver) = setup();
        let installer = RecordingInstaller::default();
        let mutator = EnvironmentMutator::new(&registry, &resolver, &installer);

        let injection = mutator
            .inject(
                &SpecSource::LiveEnvironment(dir.path().to_path_buf()),
                &[],
                "widgetron_app",
                "c",
                &attrs("1.2.3"),
            )
            .unwrap();

        assert_eq!(injection.status, 0);
        assert!(!manifest.exists());
        for file in old_files {
            assert!(!dir.path().join(file).exists());
        }
        let calls = installer.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, vec!["c/noarch/widgetron_app-1.2.3-py_0.tar.bz2"]);
    }

    #[test]
    fn test_live_environment_install_status_is_passed_through() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, resolver) = setup();
        let installer = RecordingInstaller {
            status: 3,
            ..Default::default()
        };
        let mutator = EnvironmentMutator::new(&registry, &resolver, &installer);

        let injection = mutator
            .inject(
                &SpecSource::LiveEnvironment(dir.path().to_path_buf()),
                &[],
                "widgetron_app",
                "c",
                &Constraints::new(),
            )
            .unwrap();
        assert_eq!(injection.status, 3);
    }

    #[test]
    fn test_resolution_failure_is_fatal() {
        struct EmptyIndex;
        impl PackageIndex for EmptyIndex {
            fn query(&self, _: &str, _: &str) -> Result<Vec<IndexRecord>> {
                Ok(Vec::new())
            }
        }
        let registry = ChannelRegistry::new("/opt/conda/conda-bld");
        let resolver = PinResolver::new(EmptyIndex, AmbiguityPolicy::FirstMatch);
        let installer = RecordingInstaller::default();
        let mutator = EnvironmentMutator::new(&registry, &resolver, &installer);

        let err = mutator
            .inject(&SpecSource::ExplicitPackages(Vec::new()), &[], "widgetron_app", "c", &Constraints::new())
            .unwrap_err();
        assert!(matches!(err, Error::NoMatchingPackage { .. }));
    }
}
