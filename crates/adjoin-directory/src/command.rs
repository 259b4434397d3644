//! Subprocess execution for the directory tools.

use std::io::Write;
use std::process::{Command, Stdio};

use crate::DirectoryError;

/// Captured result of a finished tool invocation.
#[derive(Debug, Clone)]
pub(crate) struct ToolOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// stdout followed by stderr, trimmed.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.trim_end().to_string();
        let err = self.stderr.trim();
        if !err.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(err);
        }
        text.trim().to_string()
    }
}

/// One tool invocation: program, arguments, environment, optional stdin.
///
/// Secrets travel through stdin or the environment, never argv.
pub(crate) struct Tool<'a> {
    program: &'a str,
    args: Vec<String>,
    env: Vec<(&'static str, String)>,
    stdin: Option<&'a str>,
}

impl<'a> Tool<'a> {
    pub fn new(program: &'a str) -> Self {
        Self {
            program,
            args: Vec::new(),
            env: Vec::new(),
            stdin: None,
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

    pub fn env(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.env.push((key, value.into()));
        self
    }

    pub fn stdin(mut self, input: &'a str) -> Self {
        self.stdin = Some(input);
        self
    }

    /// Run to completion, capturing output. A non-zero exit is not an error
    /// here; callers decide what the response means.
    pub fn output(self) -> Result<ToolOutput, DirectoryError> {
        tracing::debug!(tool = self.program, args = ?self.args, "Running directory tool");

        let mut cmd = Command::new(self.program);
        cmd.args(&self.args)
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let spawn_err = |source| DirectoryError::Spawn {
            tool: self.program.to_string(),
            source,
        };
        let mut child = cmd.spawn().map_err(spawn_err)?;
        if let (Some(input), Some(mut pipe)) = (self.stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).map_err(spawn_err)?;
            pipe.write_all(b"\n").map_err(spawn_err)?;
        }
        let output = child.wait_with_output().map_err(spawn_err)?;

        Ok(ToolOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Run and require a zero exit status.
    pub fn checked(self) -> Result<ToolOutput, DirectoryError> {
        let program = self.program;
        let output = self.output()?;
        if output.success {
            Ok(output)
        } else {
            Err(DirectoryError::Command {
                tool: program.to_string(),
                code: output.code,
                detail: output.combined(),
            })
        }
    }
}
