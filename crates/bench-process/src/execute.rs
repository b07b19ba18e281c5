//! Process execution primitives.
//!
//! A [`CommandSpec`] is a plain description of one invocation (program,
//! arguments, working directory, environment overrides). It can be inspected
//! in tests and turned into a `tokio::process::Command` when it is time to run.

use bench_common::{ProcessError, ProcessResult};
use std::fmt;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use tokio::process::{Child, Command};
use tracing::debug;

/// Fully assembled invocation of an external program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
        }
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

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Returns true if `flag` appears among the arguments.
    pub fn has_arg(&self, flag: &str) -> bool {
        self.args.iter().any(|a| a == flag)
    }

    /// Returns the argument following `flag`, if any.
    pub fn arg_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// Short identifier used in errors and logs (the program file name).
    pub fn id(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(ref wd) = self.working_dir {
            cmd.current_dir(wd);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::null());
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Spawn a long-lived child process.
///
/// The child is killed if its handle is dropped, so a leaked handle never
/// leaves an orphaned server holding the port.
pub fn spawn_process(spec: &CommandSpec, stdout: Stdio, stderr: Stdio) -> ProcessResult<Child> {
    debug!("Spawning: {}", spec);
    spec.to_command()
        .stdout(stdout)
        .stderr(stderr)
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ProcessError::spawn_failed(spec.id(), e.to_string()))
}

/// Run a short-lived process to completion, capturing stdout and stderr.
pub async fn run_to_completion(spec: &CommandSpec) -> ProcessResult<Output> {
    debug!("Running: {}", spec);
    spec.to_command()
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| ProcessError::spawn_failed(spec.id(), e.to_string()))
}
