// src/environment/installer.rs

//! Batch installs into a live prefix

use crate::error::{Error, Result};
use crate::shell::Shell;
use std::path::{Path, PathBuf};
use tracing::info;

/// Package manager able to install into an existing prefix
pub trait PackageManager {
    /// Install `specs` into `prefix` from `channels`
    ///
    /// Returns the tool's exit status. Only failures to run the tool at
    /// all are reported as errors.
    fn install(&self, prefix: &Path, specs: &[String], channels: &[String]) -> Result<i32>;
}

impl<T: PackageManager + ?Sized> PackageManager for Box<T> {
    fn install(&self, prefix: &Path, specs: &[String], channels: &[String]) -> Result<i32> {
        (**self).install(prefix, specs, channels)
    }
}

/// `mamba` or `conda` driven through the shell
#[derive(Debug, Clone)]
pub struct Conda {
    executable: PathBuf,
    shell: Shell,
}

impl Conda {
    pub fn new(executable: PathBuf, shell: Shell) -> Self {
        Self { executable, shell }
    }

    /// Locate `mamba`, falling back to `conda`
    pub fn discover(shell: Shell) -> Result<Self> {
        let executable = which::which("mamba")
            .or_else(|_| which::which("conda"))
            .map_err(|_| Error::ToolNotFound("mamba or conda".to_string()))?;
        info!("Using package manager {}", executable.display());
        Ok(Self::new(executable, shell))
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn install_args(prefix: &Path, specs: &[String], channels: &[String]) -> Vec<String> {
        let mut args = vec![
            "install".to_string(),
            "--prefix".to_string(),
            prefix.display().to_string(),
            "-y".to_string(),
        ];
        args.extend(specs.iter().cloned());
        for channel in channels {
            args.push("-c".to_string());
            args.push(channel.clone());
        }
        if cfg!(windows) {
            args.push("--no-shortcuts".to_string());
        }
        args
    }
}

impl PackageManager for Conda {
    fn install(&self, prefix: &Path, specs: &[String], channels: &[String]) -> Result<i32> {
        info!("Installing {} into {}", specs.join(", "), prefix.display());
        self.shell
            .call(&self.executable, &Self::install_args(prefix, specs, channels))
    }
}
