// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn descriptor_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("project_dir")
            .long("project-dir")
            .default_value(".")
            .help("Directory containing pyproject.toml"),
    )
    .arg(Arg::new("name").long("name"))
    .arg(Arg::new("version").long("version"))
    .arg(
        Arg::new("channels")
            .long("channel-list")
            .value_name("CHANNEL")
            .action(ArgAction::Append)
            .help("Channel, repeatable"),
    )
    .arg(
        Arg::new("dependencies")
            .long("dependency")
            .value_name("SPEC")
            .action(ArgAction::Append)
            .help("Package specifier, repeatable"),
    )
    .arg(
        Arg::new("environment_yaml")
            .long("environment-yaml")
            .help("Environment manifest (environment.yml)"),
    )
    .arg(
        Arg::new("explicit_lock")
            .long("explicit-lock")
            .help("Explicit lock file"),
    )
    .arg(
        Arg::new("environment_file")
            .long("environment-file")
            .help("Manifest or lock file, detected by content"),
    )
    .arg(
        Arg::new("environment")
            .long("environment")
            .help("Existing environment, by path or name"),
    )
    .arg(Arg::new("install_path").long("install-path"))
    .arg(
        Arg::new("install_missing")
            .long("install-missing")
            .action(ArgAction::SetTrue)
            .help("Install missing required packages into a live environment"),
    )
    .arg(Arg::new("temp_dir").long("temp-dir"))
    .arg(
        Arg::new("local_build_dir")
            .long("local-build-dir")
            .help("Directory behind the `local` channel"),
    )
    .arg(
        Arg::new("strict_pins")
            .long("strict-pins")
            .action(ArgAction::SetTrue)
            .help("Fail instead of warning when several builds match a pin"),
    )
    .arg(
        Arg::new("dry_run")
            .long("dry-run")
            .action(ArgAction::SetTrue)
            .help("Log external commands without running them"),
    )
}

fn build_cli() -> Command {
    Command::new("widgetron")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Widgetron Contributors")
        .about("Package a notebook application as a desktop installer")
        .subcommand_required(true)
        .subcommand(descriptor_args(
            Command::new("render").about("Validate the environment and write construct.yaml"),
        ))
        .subcommand(descriptor_args(
            Command::new("add-dependency")
                .about("Pin a built package into the environment and rewrite construct.yaml")
                .arg(Arg::new("package").required(true).help("Package name"))
                .arg(
                    Arg::new("channel")
                        .short('c')
                        .long("channel")
                        .required(true)
                        .help("Channel the package was built into"),
                )
                .arg(
                    Arg::new("attrs")
                        .long("attr")
                        .value_name("KEY=VALUE")
                        .action(ArgAction::Append)
                        .help("Index attribute the package must match"),
                ),
        ))
        .subcommand(descriptor_args(
            Command::new("channels").about("Show the normalized channel list and its remap"),
        ))
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("widgetron.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
