/// External command execution
///
/// Every data store operation is a call to a client program (`mysql`,
/// `mysqldump`, `wp`). Commands run either on the host or inside the database
/// container through `docker exec`, with files redirected to stdin/stdout.

use std::fs::File;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::core::store::StoreError;

/// One client program call: program, arguments and extra environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    container: Option<String>,
}

impl CommandRunner {
    /// Run commands directly on the host
    pub fn host() -> Self {
        Self { container: None }
    }

    /// Run commands inside a running container via `docker exec`
    pub fn in_container(container: impl Into<String>) -> Self {
        Self {
            container: Some(container.into()),
        }
    }

    pub fn container(&self) -> Option<&str> {
        self.container.as_deref()
    }

    /// Resolve the actual program and argv for an invocation.
    ///
    /// Inside a container, environment variables are forwarded by name only
    /// (`-e NAME`), so values such as `MYSQL_PWD` never appear in argv.
    pub fn argv(&self, inv: &Invocation, with_stdin: bool) -> (String, Vec<String>) {
        match &self.container {
            None => (inv.program.clone(), inv.args.clone()),
            Some(container) => {
                let mut args = vec!["exec".to_string()];
                if with_stdin {
                    args.push("-i".to_string());
                }
                for (key, _) in &inv.env {
                    args.push("-e".to_string());
                    args.push(key.clone());
                }
                args.push(container.clone());
                args.push(inv.program.clone());
                args.extend(inv.args.iter().cloned());
                ("docker".to_string(), args)
            }
        }
    }

    fn command(&self, inv: &Invocation, with_stdin: bool) -> (String, Command) {
        let (program, args) = self.argv(inv, with_stdin);
        trace!(program = %program, args = ?args, "spawning");

        let mut cmd = Command::new(&program);
        cmd.args(&args).kill_on_drop(true);
        for (key, value) in &inv.env {
            cmd.env(key, value);
        }
        (program, cmd)
    }

    /// Spawn and wait, keeping whatever stdio the command was configured with.
    ///
    /// `Command::output` forces stdout/stderr to pipes, which would discard a
    /// file redirection.
    async fn run(
        &self,
        inv: &Invocation,
        mut cmd: Command,
    ) -> Result<std::process::Output, StoreError> {
        let child = cmd.spawn().map_err(|source| StoreError::Spawn {
            program: inv.program.clone(),
            source,
        })?;

        child
            .wait_with_output()
            .await
            .map_err(|source| StoreError::Spawn {
                program: inv.program.clone(),
                source,
            })
    }

    /// Run and capture stdout
    pub async fn output(&self, inv: &Invocation) -> Result<String, StoreError> {
        let (program, mut cmd) = self.command(inv, false);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = self.run(inv, cmd).await?;

        check_status(&program, inv, &output)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run with stdout redirected into `path` (created or truncated)
    pub async fn output_to_file(&self, inv: &Invocation, path: &Path) -> Result<(), StoreError> {
        let file = File::create(path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let (program, mut cmd) = self.command(inv, false);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(file))
            .stderr(Stdio::piped());

        debug!(program = %inv.program, path = %path.display(), "streaming output to file");
        let output = self.run(inv, cmd).await?;

        check_status(&program, inv, &output)
    }

    /// Run with stdin read from `path`
    pub async fn input_from_file(&self, inv: &Invocation, path: &Path) -> Result<(), StoreError> {
        let file = File::open(path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let (program, mut cmd) = self.command(inv, true);
        cmd.stdin(Stdio::from(file))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(program = %inv.program, path = %path.display(), "feeding file to stdin");
        let output = self.run(inv, cmd).await?;

        check_status(&program, inv, &output)
    }
}

fn check_status(
    program: &str,
    inv: &Invocation,
    output: &std::process::Output,
) -> Result<(), StoreError> {
    if output.status.success() {
        return Ok(());
    }

    let name = if program == inv.program {
        inv.program.clone()
    } else {
        format!("{} ({})", inv.program, program)
    };

    Err(StoreError::CommandFailed {
        program: name,
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}
