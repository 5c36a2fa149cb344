// src/config.rs

//! Build configuration
//!
//! Settings come from the `[tool.widgetron]` table of `pyproject.toml`,
//! overridden field by field by command-line values. Relative paths in the
//! file are taken relative to the file's directory.

use crate::baseline::RequiredBaseline;
use crate::descriptor::{DEFAULT_POST_INSTALL, DescriptorInputs, InstallerSettings};
use crate::error::{Error, Result};
use crate::resolver::AmbiguityPolicy;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE: &str = "pyproject.toml";

pub const DEFAULT_TEMP_DIR: &str = "widgetron_temp_files";

/// Subdirectory of the temp dir holding the descriptor and working copies
pub const WORK_SUBDIR: &str = "constructor";

pub const COMMAND_LOG: &str = "commands.txt";

/// Accepts `["a", "b"]` or `"a b"`
fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrList {
        List(Vec<String>),
        Words(String),
    }

    Ok(Option::<StringOrList>::deserialize(deserializer)?.map(|value| match value {
        StringOrList::List(items) => items,
        StringOrList::Words(words) => words.split_whitespace().map(str::to_string).collect(),
    }))
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    pub name: Option<String>,
    pub version: Option<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub channels: Option<Vec<String>>,
    #[serde(deserialize_with = "string_or_list")]
    pub dependencies: Option<Vec<String>>,
    pub environment_yaml: Option<PathBuf>,
    pub explicit_lock: Option<PathBuf>,
    pub environment_file: Option<PathBuf>,
    pub environment: Option<String>,
    pub install_path: Option<String>,
    pub install_missing: Option<bool>,
    pub temp_dir: Option<PathBuf>,
    pub local_build_dir: Option<PathBuf>,
    pub envs_dirs: Option<Vec<PathBuf>>,
    pub strict_pins: Option<bool>,
    pub dry_run: Option<bool>,

    pub installer_filename: Option<String>,
    pub company: Option<String>,
    pub license_file: Option<PathBuf>,
    pub icon: Option<PathBuf>,
    pub header_image: Option<PathBuf>,
    pub welcome_image: Option<PathBuf>,
    pub nsis_template: Option<PathBuf>,
    pub header_image_text: Option<String>,
    pub welcome_image_text: Option<String>,
    pub default_image_color: Option<String>,
    pub signing_identity_name: Option<String>,
    pub batch_mode: Option<bool>,
    pub register_python_default: Option<bool>,
    pub post_install: Option<String>,
}

#[derive(Deserialize)]
struct PyProject {
    #[serde(default)]
    tool: Option<Tools>,
}

#[derive(Deserialize)]
struct Tools {
    #[serde(default)]
    widgetron: Option<BuildConfig>,
}

/// Take every field from `$over` when set, else from `$base`
macro_rules! layer {
    ($base:ident, $over:ident; $($field:ident),* $(,)?) => {
        BuildConfig {
            $($field: $over.$field.or($base.$field),)*
        }
    };
}

impl BuildConfig {
    /// Read `[tool.widgetron]` from `dir/pyproject.toml`; a missing file is empty config
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if !path.is_file() {
            debug!("No {} in {}", CONFIG_FILE, dir.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        Self::parse(&content, dir)
    }

    /// Parse a `pyproject.toml` document, resolving paths against `base_dir`
    pub fn parse(content: &str, base_dir: &Path) -> Result<Self> {
        let project: PyProject = toml::from_str(content)?;
        let mut config = project
            .tool
            .and_then(|tools| tools.widgetron)
            .unwrap_or_default();
        config.resolve_paths(base_dir);
        Ok(config)
    }

    fn resolve_paths(&mut self, base_dir: &Path) {
        for path in [
            &mut self.environment_yaml,
            &mut self.explicit_lock,
            &mut self.environment_file,
            &mut self.temp_dir,
            &mut self.local_build_dir,
            &mut self.license_file,
            &mut self.icon,
            &mut self.header_image,
            &mut self.welcome_image,
            &mut self.nsis_template,
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = base_dir.join(&*path);
            }
        }
        if let Some(dirs) = &mut self.envs_dirs {
            for dir in dirs.iter_mut().filter(|d| d.is_relative()) {
                *dir = base_dir.join(&*dir);
            }
        }
    }

    /// This config with every value set in `overrides` replaced
    pub fn merge(self, overrides: BuildConfig) -> BuildConfig {
        let base = self;
        layer!(base, overrides;
            name, version, channels, dependencies, environment_yaml, explicit_lock,
            environment_file, environment, install_path, install_missing, temp_dir,
            local_build_dir, envs_dirs, strict_pins, dry_run, installer_filename, company,
            license_file, icon, header_image, welcome_image, nsis_template,
            header_image_text, welcome_image_text, default_image_color,
            signing_identity_name, batch_mode, register_python_default, post_install,
        )
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMP_DIR))
    }

    pub fn work_dir(&self) -> PathBuf {
        self.temp_dir().join(WORK_SUBDIR)
    }

    pub fn command_log(&self) -> PathBuf {
        self.temp_dir().join(COMMAND_LOG)
    }

    /// Directory behind the `local` channel
    pub fn local_build_dir(&self) -> PathBuf {
        if let Some(dir) = &self.local_build_dir {
            return dir.clone();
        }
        match std::env::var_os("CONDA_PREFIX") {
            Some(prefix) => PathBuf::from(prefix).join("conda-bld"),
            None => self.temp_dir().join("conda_bld"),
        }
    }

    /// Directories searched for environments given by name
    pub fn envs_dirs(&self) -> Vec<PathBuf> {
        if let Some(dirs) = &self.envs_dirs {
            return dirs.clone();
        }
        std::env::var_os("CONDA_PREFIX")
            .map(|prefix| vec![PathBuf::from(prefix).join("envs")])
            .unwrap_or_default()
    }

    pub fn ambiguity(&self) -> AmbiguityPolicy {
        if self.strict_pins.unwrap_or(false) {
            AmbiguityPolicy::Strict
        } else {
            AmbiguityPolicy::FirstMatch
        }
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run.unwrap_or(false)
    }

    pub fn descriptor_inputs(&self) -> Result<DescriptorInputs> {
        let name = self
            .name
            .clone()
            .ok_or_else(|| Error::ConfigError("name is required".to_string()))?;
        let version = self
            .version
            .clone()
            .ok_or_else(|| Error::ConfigError("version is required".to_string()))?;

        let mut inputs = DescriptorInputs::new(&name, &version, self.work_dir());
        inputs.channels = self.channels.clone().unwrap_or_default();
        inputs.dependencies = self.dependencies.clone().unwrap_or_default();
        inputs.environment_yaml = self.environment_yaml.clone();
        inputs.explicit_lock = self.explicit_lock.clone();
        inputs.environment_file = self.environment_file.clone();
        inputs.environment = self.environment.clone();
        inputs.envs_dirs = self.envs_dirs();
        inputs.install_path = self.install_path.clone();
        inputs.install_missing = self.install_missing.unwrap_or(false);
        inputs.baseline = RequiredBaseline::for_host();
        inputs.settings = InstallerSettings {
            installer_filename: self.installer_filename.clone(),
            company: self.company.clone(),
            license_file: self.license_file.clone(),
            icon_image: self.icon.clone(),
            header_image: self.header_image.clone(),
            welcome_image: self.welcome_image.clone(),
            nsis_template: self.nsis_template.clone(),
            header_image_text: self.header_image_text.clone(),
            welcome_image_text: self.welcome_image_text.clone(),
            default_image_color: self.default_image_color.clone(),
            signing_identity_name: self.signing_identity_name.clone(),
            batch_mode: self.batch_mode,
            register_python_default: self.register_python_default.unwrap_or(false),
            post_install: self
                .post_install
                .clone()
                .unwrap_or_else(|| DEFAULT_POST_INSTALL.to_string()),
            ..InstallerSettings::default()
        };
        Ok(inputs)
    }
}
