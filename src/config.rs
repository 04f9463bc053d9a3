//! Ticket configuration and credential-cache identity derivation
//!
//! A `KrbConfig` is created once per principal and shared by reference with
//! the ticket and any updaters bound to it. Deployments can also describe it
//! in a TOML file at `~/.config/krbkeep/config.toml`.

use crate::error::{KrbError, KrbResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Environment variable the Kerberos tools use to locate the active cache
pub const KRB5CCNAME_ENV: &str = "KRB5CCNAME";

/// Cross-process coordination strategy for background updaters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdaterStrategy {
    /// No coordination: every process renews its own per-process cache.
    /// The parent keeps the shared identity; workers derive theirs with
    /// [`KrbConfig::with_process_isolation`].
    #[default]
    Isolated,

    /// All processes share one cache; each update runs under a cross-process
    /// advisory lock so at most one mutation is in flight at a time.
    MutexGuarded,

    /// All processes share one cache; only the updater that wins the
    /// leadership lock runs a loop at all, holding the lock until stopped.
    SingleElected,
}

/// Retry policy for external tool invocations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryOptions {
    /// Base backoff in milliseconds, doubled on each attempt
    pub wait_multiplier_ms: u64,

    /// Backoff ceiling in milliseconds
    pub wait_max_ms: u64,

    /// Total attempts before the failure is surfaced
    pub max_attempts: u32,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            wait_multiplier_ms: 1000,
            wait_max_ms: 30000,
            max_attempts: 10,
        }
    }
}

/// Configuration for one principal's ticket lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KrbConfig {
    /// Principal the ticket is obtained for, e.g. `user@EXAMPLE.COM`
    pub principal: String,

    /// Keytab passed to `kinit -k -t`; None relies on the default keytab
    pub keytab: Option<PathBuf>,

    /// Credential cache identity. Defaults to `$KRB5CCNAME`, else the
    /// per-user `/tmp/krb5cc_{uid}` path.
    pub ccache_name: String,

    /// Path to the kinit binary
    pub kinit_bin: String,

    /// Path to the klist binary
    pub klist_bin: String,

    /// Path to the kdestroy binary
    pub kdestroy_bin: String,

    /// Look-ahead margin: the ticket counts as expired this long before its
    /// actual expiry, so a polling updater never straddles the instant.
    pub renewal_threshold_secs: u64,

    /// Requested ticket lifetime, passed verbatim to `kinit -l`
    pub ticket_lifetime: Option<String>,

    /// Requested renewable lifetime, passed verbatim to `kinit -r`
    pub ticket_renewable_lifetime: Option<String>,

    /// How concurrent updaters coordinate on a shared cache
    pub updater_strategy: UpdaterStrategy,

    /// Retry policy for the external tools
    pub retry: RetryOptions,
}

impl Default for KrbConfig {
    fn default() -> Self {
        Self {
            principal: String::new(),
            keytab: None,
            ccache_name: default_ccache_name(),
            kinit_bin: "kinit".to_string(),
            klist_bin: "klist".to_string(),
            kdestroy_bin: "kdestroy".to_string(),
            renewal_threshold_secs: 30 * 60,
            ticket_lifetime: None,
            ticket_renewable_lifetime: None,
            updater_strategy: UpdaterStrategy::default(),
            retry: RetryOptions::default(),
        }
    }
}

impl KrbConfig {
    /// Create a config for a principal with defaults for everything else
    pub fn new(principal: impl Into<String>, keytab: Option<PathBuf>) -> Self {
        Self {
            principal: principal.into(),
            keytab,
            ..Self::default()
        }
    }

    /// Switch to a process-private cache identity by appending the pid.
    ///
    /// Worker processes under the Isolated strategy call this so they never
    /// contend with the parent's shared cache.
    pub fn with_process_isolation(mut self) -> Self {
        self.ccache_name = format!("{}_{}", self.ccache_name, std::process::id());
        self
    }

    /// Look-ahead margin as a duration
    pub fn renewal_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.renewal_threshold_secs as i64)
    }

    /// Lock file guarding mutations of the shared cache
    pub fn ccache_lockfile(&self) -> PathBuf {
        PathBuf::from(format!("{}.lock", self.ccache_name))
    }

    /// Lock file electing the single active updater for the shared cache
    pub fn updater_lockfile(&self) -> PathBuf {
        PathBuf::from(format!("{}.updater.lock", self.ccache_name))
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("krbkeep")
            .join("config.toml")
    }

    /// Load configuration from a TOML file
    pub async fn load_from_file(path: &Path) -> KrbResult<Self> {
        if !path.exists() {
            return Err(KrbError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| KrbError::io(format!("reading config from {}", path.display()), e))?;

        debug!("Loaded config from {}", path.display());
        toml::from_str(&content).map_err(|e| KrbError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Derive the default credential cache identity.
///
/// `$KRB5CCNAME` wins when set; otherwise the conventional per-user path.
pub fn default_ccache_name() -> String {
    match std::env::var(KRB5CCNAME_ENV) {
        Ok(name) if !name.is_empty() => name,
        _ => format!("/tmp/krb5cc_{}", uid()),
    }
}

#[cfg(unix)]
fn uid() -> u32 {
    // SAFETY: getuid cannot fail and takes no arguments.
    unsafe { libc::getuid() }
}

#[cfg(not(unix))]
fn uid() -> u32 {
    0
}
