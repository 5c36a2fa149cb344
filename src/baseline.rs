// src/baseline.rs

//! Required baseline packages
//!
//! Whatever the environment description, the installed runtime needs the
//! notebook server, conda itself and, on Windows, the shortcut installer.
//! Declarative sources are checked by scanning their package lists; a live
//! prefix is checked against its install manifests.

use crate::environment::lockfile;
use crate::environment::matchspec;
use crate::environment::{EnvironmentManifest, PackageManager, Prefix, SpecSource};
use crate::error::{Error, Result};
use tracing::{debug, info};

/// A package that must be present, with its version constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub package: String,
    pub constraint: String,
}

impl Requirement {
    pub fn new(package: &str, constraint: &str) -> Self {
        Self {
            package: package.to_string(),
            constraint: constraint.to_string(),
        }
    }

    /// Specifier form used for installs and messages
    pub fn spec(&self) -> String {
        if self.constraint.is_empty() {
            self.package.clone()
        } else {
            format!("{} {}", self.package, self.constraint)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredBaseline(Vec<Requirement>);

impl RequiredBaseline {
    pub fn new(requirements: Vec<Requirement>) -> Self {
        Self(requirements)
    }

    /// Baseline for the platform this binary runs on
    pub fn for_host() -> Self {
        let mut requirements = vec![
            Requirement::new("jupyterlab", ">=3"),
            Requirement::new("conda", ">=22, <23"),
        ];
        if cfg!(windows) {
            requirements.push(Requirement::new("menuinst", ">=1.4.17"));
        }
        Self(requirements)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.0
    }
}

impl Default for RequiredBaseline {
    fn default() -> Self {
        Self::for_host()
    }
}

pub struct BaselineValidator<'a> {
    baseline: &'a RequiredBaseline,
    auto_install: bool,
}

impl<'a> BaselineValidator<'a> {
    pub fn new(baseline: &'a RequiredBaseline, auto_install: bool) -> Self {
        Self {
            baseline,
            auto_install,
        }
    }

    /// Check every requirement against the active source
    ///
    /// For a live prefix with `auto_install` set, missing packages are
    /// installed from `channels`; a nonzero install status is returned as
    /// `Error::ExternalTool`.
    pub fn validate(
        &self,
        source: &SpecSource,
        channels: &[String],
        installer: &dyn PackageManager,
    ) -> Result<()> {
        let missing = match source {
            SpecSource::ExplicitPackages(specs) => self.missing_from_specs(specs),
            SpecSource::ManifestFile(path) => {
                let manifest = EnvironmentManifest::load(path)?;
                self.missing_from_specs(&manifest.dependencies())
            }
            SpecSource::LockFile(path) => {
                let content = std::fs::read_to_string(path)?;
                let lines: Vec<String> = lockfile::package_lines(&content)
                    .map(str::to_string)
                    .collect();
                self.missing_from_specs(&lines)
            }
            SpecSource::LiveEnvironment(path) => {
                let prefix = Prefix::open(path)?;
                let missing = self.missing_from_prefix(&prefix)?;
                if !missing.is_empty() && self.auto_install {
                    let specs: Vec<String> = missing.iter().map(Requirement::spec).collect();
                    info!(
                        "Installing missing required packages into {}: {}",
                        path.display(),
                        specs.join(", ")
                    );
                    let code = installer.install(path, &specs, channels)?;
                    if code != 0 {
                        return Err(Error::ExternalTool {
                            command: format!("install {}", specs.join(" ")),
                            code,
                        });
                    }
                    Vec::new()
                } else {
                    missing
                }
            }
        };

        if missing.is_empty() {
            debug!("All {} required packages present", self.baseline.0.len());
            return Ok(());
        }
        Err(Error::MissingBaselinePackages(
            missing.iter().map(Requirement::spec).collect(),
        ))
    }

    fn missing_from_specs(&self, specs: &[String]) -> Vec<Requirement> {
        self.baseline
            .0
            .iter()
            .filter(|req| {
                !specs.iter().any(|spec| {
                    matchspec::package_name(spec) == Some(req.package.as_str())
                        && matchspec::satisfies(spec, &req.constraint)
                })
            })
            .cloned()
            .collect()
    }

    fn missing_from_prefix(&self, prefix: &Prefix) -> Result<Vec<Requirement>> {
        let mut missing = Vec::new();
        for req in &self.baseline.0 {
            if !prefix.is_installed(&req.package)? {
                missing.push(req.clone());
            }
        }
        Ok(missing)
    }
}
