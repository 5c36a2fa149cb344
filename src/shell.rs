// src/shell.rs

//! Blocking subprocess execution
//!
//! Every command is appended to a command log before it runs. In dry-run
//! mode commands are only logged and report success.

use crate::error::{Error, Result};
use std::ffi::OsStr;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

/// Exit status reported for a child killed by a signal
const INTERRUPTED_STATUS: i32 = 130;

/// Runs external tools and records what was run
#[derive(Debug, Clone, Default)]
pub struct Shell {
    dry_run: bool,
    log: Option<PathBuf>,
}

impl Shell {
    pub fn new(dry_run: bool, log: Option<PathBuf>) -> Self {
        Self { dry_run, log }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Run a command to completion and return its exit status
    pub fn call<S: AsRef<OsStr>>(&self, program: &Path, args: &[S]) -> Result<i32> {
        let line = render(program, args);
        self.record(&line)?;
        if self.dry_run {
            debug!("dry run: {}", line);
            return Ok(0);
        }

        let status = Command::new(program).args(args).status()?;
        match status.code() {
            Some(code) => Ok(code),
            None => {
                warn!("`{}` was terminated by a signal", line);
                Ok(INTERRUPTED_STATUS)
            }
        }
    }

    /// Run a command and capture stdout, failing on a nonzero status
    pub fn check_output<S: AsRef<OsStr>>(&self, program: &Path, args: &[S]) -> Result<String> {
        let line = render(program, args);
        self.record(&line)?;
        if self.dry_run {
            debug!("dry run: {}", line);
            return Ok(String::new());
        }

        let output = Command::new(program).args(args).output()?;
        if !output.status.success() {
            return Err(Error::ExternalTool {
                command: line,
                code: output.status.code().unwrap_or(INTERRUPTED_STATUS),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn record(&self, line: &str) -> Result<()> {
        let Some(log) = &self.log else {
            return Ok(());
        };
        if let Some(parent) = log.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(log)?;
        writeln!(file, "{} {}", chrono::Utc::now().to_rfc3339(), line)?;
        Ok(())
    }
}

fn render<S: AsRef<OsStr>>(program: &Path, args: &[S]) -> String {
    let mut line = program.display().to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.as_ref().to_string_lossy());
    }
    line
}
