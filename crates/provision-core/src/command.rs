//! External command invocation for provisioning steps.
//!
//! Steps never spawn processes themselves. They describe a `CommandSpec` and
//! hand it to a `CommandRunner`, which is the single injectable capability
//! standing in for apt, useradd, bench and the rest.
//!
//! # Conventions
//! - stderr always flows through to the terminal.
//! - stdout is inherited unless the command asks for it to be captured.
//! - A non-zero exit is data (`CommandOutput::code`); `run_checked` turns it
//!   into `ProvisionError::CommandFailed`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{ProvisionError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    /// Fed to the child's stdin. Used for secrets so they stay out of argv.
    pub stdin: Option<String>,
    pub capture: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// `bash -c <script>`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("bash").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn capture(mut self) -> Self {
        self.capture = true;
        self
    }

    /// Human-readable command line. Stdin is never included.
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        for a in &self.args {
            if a.is_empty() || a.contains(char::is_whitespace) {
                parts.push(format!("'{a}'"));
            } else {
                parts.push(a.clone());
            }
        }
        parts.join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    /// Empty unless the command asked for capture.
    pub stdout: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

pub trait CommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Resolve `program` on `PATH`.
    fn locate(&self, program: &str) -> Option<PathBuf>;

    fn run_checked(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let output = self.run(spec)?;
        if !output.success() {
            return Err(ProvisionError::CommandFailed {
                command: spec.display(),
                code: output.code,
            });
        }
        Ok(output)
    }
}

/// Runs commands on the local host with `std::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandRunner {
    stdout_to_stderr: bool,
}

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send uncaptured child stdout to our stderr, keeping our own stdout
    /// free for a machine-readable report.
    pub fn with_stdout_to_stderr() -> Self {
        Self {
            stdout_to_stderr: true,
        }
    }
}

impl CommandRunner for SystemCommandRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        if spec.stdin.is_some() {
            cmd.stdin(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
        }
        if spec.capture {
            cmd.stdout(Stdio::piped());
        } else if self.stdout_to_stderr {
            cmd.stdout(std::io::stderr());
        } else {
            cmd.stdout(Stdio::inherit());
        }
        cmd.stderr(Stdio::inherit());

        let spawn_err = |e: std::io::Error| ProvisionError::CommandSpawn {
            program: spec.program.clone(),
            reason: e.to_string(),
        };

        let mut child = cmd.spawn().map_err(spawn_err)?;

        if let Some(input) = &spec.stdin {
            // Dropping the handle closes the pipe so the child sees EOF.
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(input.as_bytes())
                    .map_err(|e| ProvisionError::CommandSpawn {
                        program: spec.program.clone(),
                        reason: format!("failed to write stdin: {e}"),
                    })?;
            }
        }

        let output = child.wait_with_output().map_err(spawn_err)?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }

    fn locate(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}
