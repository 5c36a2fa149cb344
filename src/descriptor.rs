// src/descriptor.rs

//! The installer generator's environment descriptor
//!
//! An `EnvironmentDescriptor` owns exactly one `SpecSource` and everything
//! derived from it. Each public mutator applies its change, recomputes the
//! derived fields and rewrites `construct.yaml` before returning, so the
//! file on disk always matches a fully validated in-memory state.

use crate::baseline::{BaselineValidator, RequiredBaseline};
use crate::channel::{ChannelList, ChannelRegistry, ChannelRemap, RemapEntry};
use crate::environment::prefix::find_environment;
use crate::environment::{PackageManager, SpecSource, lockfile};
use crate::error::{Error, Result};
use crate::mutator::EnvironmentMutator;
use crate::repository::PackageIndex;
use crate::resolver::{AmbiguityPolicy, Constraints, PinResolver};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name of the persisted descriptor
pub const DESCRIPTOR_FILE: &str = "construct.yaml";

/// Default post-install hook; the selector skips it on Windows
pub const DEFAULT_POST_INSTALL: &str = "post_install.sh  # [not win]";

/// Installer branding and install location settings
#[derive(Debug, Clone, PartialEq)]
pub struct InstallerSettings {
    pub installer_filename: Option<String>,
    pub company: Option<String>,
    pub license_file: Option<PathBuf>,
    pub icon_image: Option<PathBuf>,
    pub header_image: Option<PathBuf>,
    pub welcome_image: Option<PathBuf>,
    pub nsis_template: Option<PathBuf>,
    pub header_image_text: Option<String>,
    pub welcome_image_text: Option<String>,
    pub default_image_color: Option<String>,
    pub signing_identity_name: Option<String>,
    pub batch_mode: Option<bool>,
    pub register_python_default: bool,
    pub post_install: String,
    pub default_prefix: Option<String>,
    pub default_prefix_domain_user: Option<String>,
    pub default_prefix_all_users: Option<String>,
}

impl Default for InstallerSettings {
    fn default() -> Self {
        Self {
            installer_filename: None,
            company: None,
            license_file: None,
            icon_image: None,
            header_image: None,
            welcome_image: None,
            nsis_template: None,
            header_image_text: None,
            welcome_image_text: None,
            default_image_color: None,
            signing_identity_name: None,
            batch_mode: None,
            register_python_default: false,
            post_install: DEFAULT_POST_INSTALL.to_string(),
            default_prefix: None,
            default_prefix_domain_user: None,
            default_prefix_all_users: None,
        }
    }
}

impl InstallerSettings {
    /// Require every asset to be a regular file and record it as absolute
    fn resolve_assets(&mut self) -> Result<()> {
        for asset in [
            &mut self.license_file,
            &mut self.icon_image,
            &mut self.header_image,
            &mut self.welcome_image,
            &mut self.nsis_template,
        ] {
            if let Some(path) = asset {
                *path = existing_file(path)?;
            }
        }
        Ok(())
    }
}

/// Everything a descriptor is constructed from
#[derive(Debug, Clone)]
pub struct DescriptorInputs {
    pub name: String,
    pub version: String,
    pub channels: Vec<String>,
    pub dependencies: Vec<String>,
    pub environment_yaml: Option<PathBuf>,
    pub explicit_lock: Option<PathBuf>,
    /// Spec file classified as lock file or manifest by content
    pub environment_file: Option<PathBuf>,
    /// Prefix path or environment name
    pub environment: Option<String>,
    pub envs_dirs: Vec<PathBuf>,
    pub install_path: Option<String>,
    pub install_missing: bool,
    pub work_dir: PathBuf,
    pub baseline: RequiredBaseline,
    pub settings: InstallerSettings,
}

impl DescriptorInputs {
    pub fn new(name: &str, version: &str, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            channels: Vec::new(),
            dependencies: Vec::new(),
            environment_yaml: None,
            explicit_lock: None,
            environment_file: None,
            environment: None,
            envs_dirs: Vec::new(),
            install_path: None,
            install_missing: false,
            work_dir: work_dir.into(),
            baseline: RequiredBaseline::for_host(),
            settings: InstallerSettings::default(),
        }
    }

    /// Names of the spec-defining inputs that were supplied
    fn supplied_sources(&self) -> Vec<String> {
        let mut supplied = Vec::new();
        if !self.dependencies.is_empty() {
            supplied.push("dependencies".to_string());
        }
        let optional = [
            ("environment_yaml", self.environment_yaml.is_some()),
            ("explicit_lock", self.explicit_lock.is_some()),
            ("environment_file", self.environment_file.is_some()),
            ("environment", self.environment.is_some()),
        ];
        for (name, present) in optional {
            if present {
                supplied.push(name.to_string());
            }
        }
        supplied
    }

    /// The single spec source these inputs describe, read from the user's files
    fn spec_source(&self) -> Result<SpecSource> {
        let supplied = self.supplied_sources();
        if supplied.len() > 1 {
            return Err(Error::ConflictingSpecSources(supplied));
        }

        if !self.dependencies.is_empty() {
            return Ok(SpecSource::ExplicitPackages(self.dependencies.clone()));
        }
        if let Some(path) = &self.environment_yaml {
            return Ok(SpecSource::ManifestFile(existing_file(path)?));
        }
        if let Some(path) = &self.explicit_lock {
            let path = existing_file(path)?;
            if !lockfile::is_lock_file_at(&path)? {
                return Err(Error::InvalidLockFile(path));
            }
            return Ok(SpecSource::LockFile(path));
        }
        if let Some(path) = &self.environment_file {
            return SpecSource::detect(&existing_file(path)?);
        }
        if let Some(env) = &self.environment {
            return Ok(SpecSource::LiveEnvironment(find_environment(
                env,
                &self.envs_dirs,
            )?));
        }
        Err(Error::MissingSpecSource)
    }
}

/// External collaborators a descriptor talks to
pub struct Toolchain {
    pub registry: ChannelRegistry,
    pub index: Box<dyn PackageIndex>,
    pub installer: Box<dyn PackageManager>,
    pub ambiguity: AmbiguityPolicy,
}

/// Serialized form of a descriptor, keys in sorted order
#[derive(Serialize)]
struct ConstructDocument<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    batch_mode: Option<bool>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    channels: &'a [String],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    channels_remap: &'a [RemapEntry],
    #[serde(skip_serializing_if = "Option::is_none")]
    company: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_image_color: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_prefix: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_prefix_all_users: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_prefix_domain_user: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    environment: Option<&'a Path>,
    #[serde(skip_serializing_if = "Option::is_none")]
    environment_file: Option<&'a Path>,
    #[serde(skip_serializing_if = "Option::is_none")]
    header_image: Option<&'a Path>,
    #[serde(skip_serializing_if = "Option::is_none")]
    header_image_text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_image: Option<&'a Path>,
    #[serde(skip_serializing_if = "Option::is_none")]
    installer_filename: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    license_file: Option<&'a Path>,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    nsis_template: Option<&'a Path>,
    #[serde(skip_serializing_if = "str::is_empty")]
    post_install: &'a str,
    register_python_default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    signing_identity_name: Option<&'a str>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    specs: &'a [String],
    version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    welcome_image: Option<&'a Path>,
    #[serde(skip_serializing_if = "Option::is_none")]
    welcome_image_text: Option<&'a str>,
}

pub struct EnvironmentDescriptor {
    name: String,
    version: String,
    channels: ChannelList,
    channels_remap: ChannelRemap,
    source: SpecSource,
    baseline: RequiredBaseline,
    install_missing: bool,
    install_path: Option<String>,
    settings: InstallerSettings,
    work_dir: PathBuf,
    registry: ChannelRegistry,
    resolver: PinResolver<Box<dyn PackageIndex>>,
    installer: Box<dyn PackageManager>,
}

impl EnvironmentDescriptor {
    /// Build, validate and persist a descriptor
    ///
    /// Nothing is written until every input has been validated, so a
    /// rejected configuration leaves no descriptor file behind.
    pub fn new(inputs: DescriptorInputs, toolchain: Toolchain) -> Result<Self> {
        if inputs.name.trim().is_empty() {
            return Err(Error::ConfigError("name is required".to_string()));
        }
        if inputs.version.trim().is_empty() {
            return Err(Error::ConfigError("version is required".to_string()));
        }

        let source = inputs.spec_source()?;
        let mut settings = inputs.settings.clone();
        settings.resolve_assets()?;

        let registry = toolchain.registry;
        let channels = registry.normalize(&inputs.channels);
        registry.validate(&channels)?;

        BaselineValidator::new(&inputs.baseline, inputs.install_missing).validate(
            &source,
            &channels.to_vec(),
            toolchain.installer.as_ref(),
        )?;

        std::fs::create_dir_all(&inputs.work_dir)?;
        let work_dir = std::path::absolute(&inputs.work_dir)?;
        let source = working_copy(source, &work_dir)?;

        let mut descriptor = Self {
            name: inputs.name,
            version: inputs.version,
            channels_remap: registry.remap(&channels),
            channels,
            source,
            baseline: inputs.baseline,
            install_missing: inputs.install_missing,
            install_path: None,
            settings,
            work_dir,
            registry,
            resolver: PinResolver::new(toolchain.index, toolchain.ambiguity),
            installer: toolchain.installer,
        };
        if let Some(install_path) = inputs.install_path {
            descriptor.apply_install_path(&install_path);
        }

        descriptor.serialize()?;
        info!(
            "Created descriptor for {} {} from {}",
            descriptor.name,
            descriptor.version,
            descriptor.source.kind()
        );
        Ok(descriptor)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn channels(&self) -> &ChannelList {
        &self.channels
    }

    pub fn channels_remap(&self) -> &ChannelRemap {
        &self.channels_remap
    }

    pub fn spec_source(&self) -> &SpecSource {
        &self.source
    }

    pub fn settings(&self) -> &InstallerSettings {
        &self.settings
    }

    pub fn install_path(&self) -> Option<&str> {
        self.install_path.as_deref()
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.work_dir.join(DESCRIPTOR_FILE)
    }

    /// Replace the channel list
    pub fn set_channels<S: AsRef<str>>(&mut self, channels: &[S]) -> Result<()> {
        let list = self.registry.normalize(channels);
        self.registry.validate(&list)?;
        self.channels_remap = self.registry.remap(&list);
        self.channels = list;
        self.serialize()?;
        Ok(())
    }

    /// Put a local channel directory in front of the current channels
    pub fn add_local_channel(&mut self, path: &Path) -> Result<()> {
        let uri = self
            .registry
            .canonicalize_local(&path.display().to_string())?;
        let mut channels = vec![uri];
        channels.extend(self.channels.iter().cloned());
        self.set_channels(&channels)
    }

    /// Replace the explicit package list
    ///
    /// Fails without touching anything when another representation is active.
    pub fn set_dependencies(&mut self, specs: Vec<String>) -> Result<()> {
        if !matches!(self.source, SpecSource::ExplicitPackages(_)) {
            return Err(Error::SpecSourceConflict {
                active: self.source.kind(),
                requested: "dependencies",
            });
        }
        let source = SpecSource::ExplicitPackages(specs);
        self.validator()
            .validate(&source, &self.channels.to_vec(), self.installer.as_ref())?;
        self.source = source;
        self.serialize()?;
        Ok(())
    }

    /// Set the install location and fill any unset default prefixes
    pub fn set_install_path(&mut self, path: &str) -> Result<()> {
        self.apply_install_path(path);
        self.serialize()?;
        Ok(())
    }

    fn apply_install_path(&mut self, path: &str) {
        let value = if cfg!(windows) {
            path.replace('/', "\\")
        } else {
            path.to_string()
        };
        let settings = &mut self.settings;
        for slot in [
            &mut settings.default_prefix,
            &mut settings.default_prefix_all_users,
            &mut settings.default_prefix_domain_user,
        ] {
            if slot.is_none() {
                *slot = Some(value.clone());
            }
        }
        self.install_path = Some(value);
    }

    /// Inject a newly built package into the active representation
    ///
    /// Returns the install status for live environments (0 otherwise). On a
    /// nonzero status the descriptor and its file are left unchanged. The
    /// target channel is validated before anything is written, and a
    /// rejected injection restores the working copy it edited.
    pub fn add_dependency(
        &mut self,
        package: &str,
        channel: &str,
        attrs: &Constraints,
    ) -> Result<i32> {
        let target = if self.registry.is_local(channel) {
            self.registry.canonicalize_local(channel)?
        } else {
            channel.to_string()
        };
        let mut requested = self.channels.to_vec();
        requested.push(target);
        self.registry.validate(&self.registry.normalize(&requested))?;

        let snapshot = match self.source.environment_file() {
            Some(path) => Some((path.to_path_buf(), std::fs::read(path)?)),
            None => None,
        };

        let mutator =
            EnvironmentMutator::new(&self.registry, &self.resolver, self.installer.as_ref());
        let injection = mutator.inject(
            &self.source,
            &self.channels.to_vec(),
            package,
            channel,
            attrs,
        )?;
        if injection.status != 0 {
            return Ok(injection.status);
        }

        let channels = self.registry.normalize(&injection.channels);
        let checked = self.registry.validate(&channels).and_then(|()| {
            self.validator().validate(
                &injection.source,
                &channels.to_vec(),
                self.installer.as_ref(),
            )
        });
        if let Err(e) = checked {
            if let Some((path, content)) = snapshot {
                std::fs::write(&path, content)?;
                debug!("Restored {}", path.display());
            }
            return Err(e);
        }

        self.channels_remap = self.registry.remap(&channels);
        self.channels = channels;
        self.source = injection.source;
        self.serialize()?;
        info!("Added {} to {}", package, self.descriptor_path().display());
        Ok(0)
    }

    fn validator(&self) -> BaselineValidator<'_> {
        BaselineValidator::new(&self.baseline, self.install_missing)
    }

    /// The descriptor document as YAML
    pub fn render(&self) -> Result<String> {
        let environment_file = self.source.environment_file();
        let channels = self.channels.to_vec();
        let empty: &[String] = &[];
        let settings = &self.settings;

        let document = ConstructDocument {
            batch_mode: settings.batch_mode,
            channels: if environment_file.is_some() {
                empty
            } else {
                &channels
            },
            channels_remap: self.channels_remap.as_slice(),
            company: settings.company.as_deref(),
            default_image_color: settings.default_image_color.as_deref(),
            default_prefix: settings.default_prefix.as_deref(),
            default_prefix_all_users: settings.default_prefix_all_users.as_deref(),
            default_prefix_domain_user: settings.default_prefix_domain_user.as_deref(),
            environment: self.source.live_environment(),
            environment_file,
            header_image: settings.header_image.as_deref(),
            header_image_text: settings.header_image_text.as_deref(),
            icon_image: settings.icon_image.as_deref(),
            installer_filename: settings.installer_filename.as_deref(),
            license_file: settings.license_file.as_deref(),
            name: &self.name,
            nsis_template: settings.nsis_template.as_deref(),
            post_install: &settings.post_install,
            register_python_default: settings.register_python_default,
            signing_identity_name: settings.signing_identity_name.as_deref(),
            specs: self.source.explicit_packages().unwrap_or(empty),
            version: &self.version,
            welcome_image: settings.welcome_image.as_deref(),
            welcome_image_text: settings.welcome_image_text.as_deref(),
        };
        Ok(serde_yaml::to_string(&document)?)
    }

    /// Write `construct.yaml` by replacing the previous file in one rename
    pub fn serialize(&self) -> Result<PathBuf> {
        let yaml = self.render()?;
        let path = self.descriptor_path();
        let mut temp = tempfile::NamedTempFile::new_in(&self.work_dir)?;
        temp.write_all(yaml.as_bytes())?;
        temp.persist(&path).map_err(|e| e.error)?;
        debug!("Wrote {}", path.display());
        Ok(path)
    }
}

fn existing_file(path: &Path) -> Result<PathBuf> {
    if !path.is_file() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    Ok(std::path::absolute(path)?)
}

/// Copy a manifest or lock source into the work dir; rewrites target the copy
fn working_copy(source: SpecSource, work_dir: &Path) -> Result<SpecSource> {
    let copy = |path: &Path| -> Result<PathBuf> {
        let file_name = path
            .file_name()
            .ok_or_else(|| Error::FileNotFound(path.to_path_buf()))?;
        let destination = work_dir.join(file_name);
        if destination != path {
            std::fs::copy(path, &destination)?;
            debug!("Copied {} to {}", path.display(), destination.display());
        }
        Ok(destination)
    };
    Ok(match source {
        SpecSource::ManifestFile(path) => SpecSource::ManifestFile(copy(&path)?),
        SpecSource::LockFile(path) => SpecSource::LockFile(copy(&path)?),
        other => other,
    })
}
