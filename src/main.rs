// src/main.rs

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell as CompletionShell;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info};
use widgetron::channel::ChannelRegistry;
use widgetron::config::BuildConfig;
use widgetron::descriptor::{EnvironmentDescriptor, Toolchain};
use widgetron::environment::{Conda, PackageManager};
use widgetron::repository::RepodataIndex;
use widgetron::resolver::Constraints;
use widgetron::shell::Shell;
use widgetron::Error;

#[derive(Parser)]
#[command(name = "widgetron")]
#[command(author, version, about = "Package a notebook application as a desktop installer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the environment and write construct.yaml
    Render {
        #[command(flatten)]
        descriptor: DescriptorArgs,
    },
    /// Pin a built package into the environment and rewrite construct.yaml
    AddDependency {
        /// Package name
        package: String,
        /// Channel the package was built into (`local`, a path or a channel name)
        #[arg(short, long)]
        channel: String,
        /// Index attribute the package must match, e.g. version=1.2.0
        #[arg(long = "attr", value_name = "KEY=VALUE", value_parser = parse_attr)]
        attrs: Vec<(String, String)>,
        #[command(flatten)]
        descriptor: DescriptorArgs,
    },
    /// Show the normalized channel list and its remap
    Channels {
        #[command(flatten)]
        descriptor: DescriptorArgs,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        shell: CompletionShell,
    },
}

/// Command-line values layered over `[tool.widgetron]`
#[derive(Args, Debug, Default)]
struct DescriptorArgs {
    /// Directory containing pyproject.toml
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    version: Option<String>,
    /// Channel, repeatable
    #[arg(long = "channel-list", value_name = "CHANNEL")]
    channels: Vec<String>,
    /// Package specifier, repeatable
    #[arg(long = "dependency", value_name = "SPEC")]
    dependencies: Vec<String>,
    /// Environment manifest (environment.yml)
    #[arg(long)]
    environment_yaml: Option<PathBuf>,
    /// Explicit lock file
    #[arg(long)]
    explicit_lock: Option<PathBuf>,
    /// Manifest or lock file, detected by content
    #[arg(long)]
    environment_file: Option<PathBuf>,
    /// Existing environment, by path or name
    #[arg(long)]
    environment: Option<String>,
    #[arg(long)]
    install_path: Option<String>,
    /// Install missing required packages into a live environment
    #[arg(long)]
    install_missing: bool,
    #[arg(long)]
    temp_dir: Option<PathBuf>,
    /// Directory behind the `local` channel
    #[arg(long)]
    local_build_dir: Option<PathBuf>,
    /// Fail instead of warning when several builds match a pin
    #[arg(long)]
    strict_pins: bool,
    /// Log external commands without running them
    #[arg(long)]
    dry_run: bool,
}

impl DescriptorArgs {
    fn overrides(&self) -> BuildConfig {
        let flag = |set: bool| set.then_some(true);
        let list = |items: &Vec<String>| (!items.is_empty()).then(|| items.clone());
        BuildConfig {
            name: self.name.clone(),
            version: self.version.clone(),
            channels: list(&self.channels),
            dependencies: list(&self.dependencies),
            environment_yaml: self.environment_yaml.clone(),
            explicit_lock: self.explicit_lock.clone(),
            environment_file: self.environment_file.clone(),
            environment: self.environment.clone(),
            install_path: self.install_path.clone(),
            install_missing: flag(self.install_missing),
            temp_dir: self.temp_dir.clone(),
            local_build_dir: self.local_build_dir.clone(),
            strict_pins: flag(self.strict_pins),
            dry_run: flag(self.dry_run),
            ..BuildConfig::default()
        }
    }

    fn config(&self) -> Result<BuildConfig> {
        let file = BuildConfig::load(&self.project_dir)
            .with_context(|| format!("Failed to read {}", self.project_dir.display()))?;
        Ok(file.merge(self.overrides()))
    }
}

fn parse_attr(value: &str) -> std::result::Result<(String, String), String> {
    let (key, val) = value
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", value))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", value));
    }
    Ok((key.to_string(), val.to_string()))
}

/// Stands in when neither mamba nor conda is on PATH
struct MissingPackageManager;

impl PackageManager for MissingPackageManager {
    fn install(&self, _: &Path, _: &[String], _: &[String]) -> widgetron::Result<i32> {
        Err(Error::ToolNotFound("mamba or conda".to_string()))
    }
}

fn toolchain(config: &BuildConfig) -> Result<Toolchain> {
    let registry = ChannelRegistry::new(config.local_build_dir());
    let shell = Shell::new(config.dry_run(), Some(config.command_log()));
    let installer: Box<dyn PackageManager> = match Conda::discover(shell) {
        Ok(conda) => Box::new(conda),
        Err(e) => {
            debug!("{}", e);
            Box::new(MissingPackageManager)
        }
    };
    Ok(Toolchain {
        index: Box::new(RepodataIndex::new(registry.clone())?),
        registry,
        installer,
        ambiguity: config.ambiguity(),
    })
}

fn open_descriptor(args: &DescriptorArgs) -> Result<EnvironmentDescriptor> {
    let config = args.config()?;
    let inputs = config.descriptor_inputs()?;
    Ok(EnvironmentDescriptor::new(inputs, toolchain(&config)?)?)
}

/// Run a command, returning the process exit status
fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Render { descriptor } => {
            let descriptor = open_descriptor(&descriptor)?;
            println!("Wrote {}", descriptor.descriptor_path().display());
            Ok(0)
        }
        Commands::AddDependency {
            package,
            channel,
            attrs,
            descriptor,
        } => {
            let mut descriptor = open_descriptor(&descriptor)?;
            let attrs: Constraints = attrs.into_iter().collect();
            info!("Adding {} from {}", package, channel);
            let status = descriptor.add_dependency(&package, &channel, &attrs)?;
            if status == 0 {
                println!(
                    "Added {} to {}",
                    package,
                    descriptor.descriptor_path().display()
                );
            } else {
                eprintln!("Installing {} failed with exit status {}", package, status);
            }
            Ok(status)
        }
        Commands::Channels { descriptor } => {
            let descriptor = open_descriptor(&descriptor)?;
            println!("Channels:");
            for channel in descriptor.channels().iter() {
                println!("  {}", channel);
            }
            let remap = descriptor.channels_remap();
            if !remap.is_empty() {
                println!("\nRemap:");
                for entry in remap {
                    println!("  {} -> {}", entry.src, entry.dest);
                }
            }
            Ok(0)
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "widgetron",
                &mut std::io::stdout(),
            );
            Ok(0)
        }
    }
}

fn exit_code(status: i32) -> ExitCode {
    u8::try_from(status)
        .map(ExitCode::from)
        .unwrap_or(ExitCode::FAILURE)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run(Cli::parse()) {
        Ok(status) => exit_code(status),
        Err(err) => {
            eprintln!("Error: {:#}", err);
            match err.downcast_ref::<Error>() {
                Some(Error::ExternalTool { code, .. }) => exit_code(*code),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_attr() {
        assert_eq!(
            parse_attr("version=1.2.0").unwrap(),
            ("version".to_string(), "1.2.0".to_string())
        );
        assert_eq!(parse_attr("build=py_0=x").unwrap().1, "py_0=x");
        assert!(parse_attr("version").is_err());
        assert!(parse_attr("=1").is_err());
    }

    #[test]
    fn test_add_dependency_arguments() {
        let cli = Cli::try_parse_from([
            "widgetron",
            "add-dependency",
            "widgetron_app",
            "--channel",
            "local",
            "--attr",
            "version=1.2.0",
            "--dependency",
            "jupyterlab",
            "--dry-run",
        ])
        .unwrap();
        let Commands::AddDependency {
            package,
            channel,
            attrs,
            descriptor,
        } = cli.command
        else {
            panic!("expected add-dependency");
        };
        assert_eq!(package, "widgetron_app");
        assert_eq!(channel, "local");
        assert_eq!(attrs, vec![("version".to_string(), "1.2.0".to_string())]);

        let overrides = descriptor.overrides();
        assert_eq!(overrides.dependencies, Some(vec!["jupyterlab".to_string()]));
        assert_eq!(overrides.dry_run, Some(true));
        assert_eq!(overrides.strict_pins, None);
        assert_eq!(overrides.channels, None);
    }
}
