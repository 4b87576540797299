// ==============================================================================
// external.rs - External Tool Invocation
// ==============================================================================
// Description: Typed wrapper around blocking sort/bgzip/tabix subprocesses
// Author: Matt Barham
// Created: 2026-10-17
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use std::ffi::OsString;
use std::io::BufRead;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::process::Command;
use tracing::debug;

/// Failure of one external tool invocation
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {}: {stderr}", exit_label(.code))]
    Failed {
        tool: String,
        /// None when the process was terminated by a signal
        code: Option<i32>,
        stderr: String,
    },

    #[error("I/O error while running {tool}: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Successful invocation
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub tool: String,
    /// Anything the tool wrote to stderr (warnings)
    pub stderr: String,
}

/// One configured external binary
#[derive(Debug, Clone)]
pub struct ExternalTool {
    program: PathBuf,
    envs: Vec<(OsString, OsString)>,
}

impl ExternalTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            envs: Vec::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    fn name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut command = Command::new(&self.program);
        command.args(args);
        for (key, value) in &self.envs {
            command.env(key, value);
        }
        command
    }

    fn check(&self, status: std::process::ExitStatus, stderr: &[u8]) -> Result<ToolOutput, ToolError> {
        let stderr = String::from_utf8_lossy(stderr).trim().to_string();
        if status.success() {
            Ok(ToolOutput {
                tool: self.name(),
                stderr,
            })
        } else {
            Err(ToolError::Failed {
                tool: self.name(),
                code: status.code(),
                stderr,
            })
        }
    }

    /// Run to completion with stdout sent to `stdout`
    pub async fn run<I, S>(&self, args: I, stdout: Stdio) -> Result<ToolOutput, ToolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut command = self.command(args);
        command.stdin(Stdio::null()).stdout(stdout).stderr(Stdio::piped());
        debug!("Running {:?}", command.as_std());

        // spawn + wait_with_output keeps the caller's stdout redirection intact
        let child = command.spawn().map_err(|source| ToolError::Spawn {
            tool: self.name(),
            source,
        })?;

        let output = child.wait_with_output().await.map_err(|source| ToolError::Io {
            tool: self.name(),
            source,
        })?;

        self.check(output.status, &output.stderr)
    }

    /// Run to completion, streaming `input` into the tool's stdin
    ///
    /// stderr is drained while stdin is fed, so a chatty tool cannot stall
    /// the pipe. Exit status takes precedence over a broken pipe: a tool that
    /// dies early is reported as `Failed` with its stderr.
    pub async fn run_with_input<I, S, R>(
        &self,
        args: I,
        mut input: R,
        stdout: Stdio,
    ) -> Result<ToolOutput, ToolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
        R: BufRead,
    {
        let mut command = self.command(args);
        command.stdin(Stdio::piped()).stdout(stdout).stderr(Stdio::piped());
        debug!("Running {:?} with piped input", command.as_std());

        let mut child = command.spawn().map_err(|source| ToolError::Spawn {
            tool: self.name(),
            source,
        })?;

        let stdin = child.stdin.take();
        let stderr = child.stderr.take();

        let feed = async move {
            let Some(stdin) = stdin else {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "stdin was not captured",
                ));
            };
            let mut writer = BufWriter::new(stdin);
            let mut line = Vec::new();
            loop {
                line.clear();
                if input.read_until(b'\n', &mut line)? == 0 {
                    break;
                }
                if !line.ends_with(b"\n") {
                    line.push(b'\n');
                }
                writer.write_all(&line).await?;
            }
            // Shutdown flushes and closes stdin so the tool sees EOF
            writer.shutdown().await
        };

        let drain = async move {
            let mut buffer = Vec::new();
            if let Some(mut stderr) = stderr {
                stderr.read_to_end(&mut buffer).await?;
            }
            Ok::<_, std::io::Error>(buffer)
        };

        let (feed_result, stderr_result) = tokio::join!(feed, drain);

        let status = child.wait().await.map_err(|source| ToolError::Io {
            tool: self.name(),
            source,
        })?;

        let stderr = stderr_result.map_err(|source| ToolError::Io {
            tool: self.name(),
            source,
        })?;

        let outcome = self.check(status, &stderr)?;

        feed_result.map_err(|source| ToolError::Io {
            tool: self.name(),
            source,
        })?;

        Ok(outcome)
    }
}
