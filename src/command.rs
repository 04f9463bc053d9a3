//! External Kerberos tool invocation
//!
//! Builds the kinit/klist/kdestroy command lines and runs them through the
//! [`CommandExecutor`] seam with bounded exponential-backoff retry. A
//! missing binary is never retried; a non-zero exit is.

use crate::config::{KrbConfig, RetryOptions, KRB5CCNAME_ENV};
use crate::error::{KrbError, KrbResult};
use async_trait::async_trait;
use std::fmt;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// One external tool invocation: binary, arguments, and extra environment
#[derive(Debug, Clone)]
pub struct CommandLine {
    pub bin: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl CommandLine {
    fn new(bin: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bin)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Capability for running one external command to completion.
///
/// The production implementation spawns the real tools; tests substitute a
/// scripted executor.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run the command and return its stdout as text
    async fn execute(&self, cmd: &CommandLine) -> KrbResult<String>;
}

/// Executor that spawns the real Kerberos tools
pub struct SystemExecutor;

#[async_trait]
impl CommandExecutor for SystemExecutor {
    async fn execute(&self, cmd: &CommandLine) -> KrbResult<String> {
        let mut command = Command::new(&cmd.bin);
        command.args(&cmd.args);
        for (key, value) in &cmd.env {
            command.env(key, value);
        }
        command.stdout(Stdio::piped()).stderr(Stdio::piped());

        let output = command.output().await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                KrbError::CommandNotFound(cmd.bin.clone())
            } else {
                KrbError::io(format!("spawning {}", cmd.bin), e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(KrbError::command_failed(
                cmd.to_string(),
                output.status.code().unwrap_or(-1),
                stderr.trim().to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Obtain a fresh ticket from the keytab
pub async fn kinit(config: &KrbConfig, executor: &dyn CommandExecutor) -> KrbResult<String> {
    let mut cmd = CommandLine::new(&config.kinit_bin);
    if let Some(lifetime) = &config.ticket_lifetime {
        cmd = cmd.arg("-l").arg(lifetime);
    }
    if let Some(renewable) = &config.ticket_renewable_lifetime {
        cmd = cmd.arg("-r").arg(renewable);
    }
    cmd = cmd.arg("-c").arg(&config.ccache_name).arg("-k");
    if let Some(keytab) = &config.keytab {
        cmd = cmd.arg("-t").arg(keytab.display().to_string());
    }
    cmd = cmd.arg(&config.principal);

    run_with_retry(config, executor, with_base_env(cmd, config)).await
}

/// Extend the current ticket's validity within its renewable window
pub async fn renew(config: &KrbConfig, executor: &dyn CommandExecutor) -> KrbResult<String> {
    let cmd = CommandLine::new(&config.kinit_bin)
        .arg("-c")
        .arg(&config.ccache_name)
        .arg("-R")
        .arg(&config.principal);

    run_with_retry(config, executor, with_base_env(cmd, config)).await
}

/// List the current ticket as text
pub async fn klist(config: &KrbConfig, executor: &dyn CommandExecutor) -> KrbResult<String> {
    let cmd = CommandLine::new(&config.klist_bin)
        .arg("-c")
        .arg(&config.ccache_name);

    run_with_retry(config, executor, with_base_env(cmd, config)).await
}

/// Revoke the credential cache
pub async fn kdestroy(config: &KrbConfig, executor: &dyn CommandExecutor) -> KrbResult<String> {
    let cmd = CommandLine::new(&config.kdestroy_bin)
        .arg("-c")
        .arg(&config.ccache_name);

    run_with_retry(config, executor, with_base_env(cmd, config)).await
}

/// Probe whether the credential cache exists.
///
/// A plain filesystem check: reads of the cache are not required to be
/// exclusive with concurrent mutations.
pub fn cache_exists(config: &KrbConfig) -> bool {
    Path::new(&config.ccache_name).is_file()
}

/// `LC_ALL=C` keeps klist output stable; `KRB5CCNAME` tells the tool which
/// cache is active when no explicit flag reaches it.
fn with_base_env(cmd: CommandLine, config: &KrbConfig) -> CommandLine {
    cmd.env("LC_ALL", "C")
        .env(KRB5CCNAME_ENV, &config.ccache_name)
}

async fn run_with_retry(
    config: &KrbConfig,
    executor: &dyn CommandExecutor,
    cmd: CommandLine,
) -> KrbResult<String> {
    let retry = &config.retry;
    let mut attempt: u32 = 0;
    loop {
        debug!("Executing {}", cmd);
        match executor.execute(&cmd).await {
            Ok(output) => return Ok(output),
            Err(err) if err.is_retryable() && attempt + 1 < retry.max_attempts => {
                let wait = backoff_delay(retry, attempt);
                warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    cmd.bin,
                    attempt + 1,
                    retry.max_attempts,
                    wait,
                    err
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn backoff_delay(retry: &RetryOptions, attempt: u32) -> Duration {
    let doubled = retry
        .wait_multiplier_ms
        .saturating_mul(1u64 << attempt.min(20));
    Duration::from_millis(doubled.min(retry.wait_max_ms))
}
