//! External tool invocation with captured output.
//!
//! Every collaborator (`hdiutil`, `pkgutil`) runs through [`Cmd`]. A spawn
//! failure is an `io::Error`; a non-zero exit is not an error here, because
//! each call site maps the exit code into its own failure type, or merely
//! warns.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

/// Captured outcome of one tool invocation.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit status of the tool.
    pub status: ExitStatus,
    /// Captured stdout as a string.
    pub stdout: String,
    /// Captured stderr as a string.
    pub stderr: String,
}

impl CommandResult {
    /// True if the tool exited successfully.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// The exit code, or -1 if terminated by a signal.
    pub fn code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    /// Stderr, trimmed of whitespace.
    pub fn stderr_trimmed(&self) -> &str {
        self.stderr.trim()
    }
}

/// Builder for one tool invocation.
pub struct Cmd {
    program: PathBuf,
    args: Vec<String>,
}

impl Cmd {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    /// Add a path as an argument.
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Run the tool and capture its output.
    pub fn run(self) -> io::Result<CommandResult> {
        let output = Command::new(&self.program).args(&self.args).output()?;
        Ok(CommandResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
