// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Core error types for Widgetron
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML (environment manifest or descriptor) errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON (repodata or install manifest) errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed
    #[error("Invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    /// More than one environment specification was supplied
    #[error("Conflicting environment specifications ({}), you may only provide one", .0.join(", "))]
    ConflictingSpecSources(Vec<String>),

    /// No environment specification was supplied
    #[error("Missing environment specification: provide dependencies, environment_yaml, explicit_lock or environment")]
    MissingSpecSource,

    /// A mutation targeted a representation other than the active one
    #[error("Cannot set {requested} while {active} is the active environment specification")]
    SpecSourceConflict {
        active: &'static str,
        requested: &'static str,
    },

    /// Required packages are absent from the environment specification
    #[error("Environment is missing the following required packages: {}", .0.join(", "))]
    MissingBaselinePackages(Vec<String>),

    /// A local channel does not point at a usable channel directory
    #[error("Local channel ({channel}) is invalid, checked {}: {reason}", .path.display())]
    InvalidLocalChannel {
        channel: String,
        path: PathBuf,
        reason: String,
    },

    /// A channel identifier could not be turned into a location
    #[error("Invalid channel: {0}")]
    InvalidChannel(String),

    /// No index entry satisfied the resolution constraints
    #[error("No package matching constraints: {package} in channel {channel} with {constraints}")]
    NoMatchingPackage {
        package: String,
        channel: String,
        constraints: String,
    },

    /// Several index entries satisfied the constraints and strict pinning is enabled
    #[error("Ambiguous package: {candidates} builds of {package} in channel {channel} match {constraints}")]
    AmbiguousPackage {
        package: String,
        channel: String,
        constraints: String,
        candidates: usize,
    },

    /// The chosen index entry carries no checksum and none could be computed
    #[error("No checksum available for {0}")]
    MissingChecksum(String),

    /// A file declared as a lock file lacks the explicit marker
    #[error("Not a valid lock file: {}", .0.display())]
    InvalidLockFile(PathBuf),

    /// An environment manifest lacks the expected structure
    #[error("Invalid environment manifest {}: {reason}", .path.display())]
    InvalidManifest { path: PathBuf, reason: String },

    /// A referenced input file is missing or not a regular file
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// A live environment could not be located
    #[error("Environment not found: {0}")]
    EnvironmentNotFound(String),

    /// A required external executable is not on PATH
    #[error("Could not find {0} on PATH")]
    ToolNotFound(String),

    /// An external command exited with a nonzero status
    #[error("Command `{command}` failed with exit status {code}")]
    ExternalTool { command: String, code: i32 },

    /// Package index download failed
    #[error("Download error: {0}")]
    DownloadError(String),

    /// Invalid user configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type alias using Widgetron's Error type
pub type Result<T> = std::result::Result<T, Error>;
