//! Ticket entity and lifecycle state machine
//!
//! A `KrbTicket` tracks one credential cache. Its in-memory snapshot is
//! never treated as authoritative: every update decision starts with a
//! `reload` from klist so a stale read can never drive a renew or reinit.

use crate::command::{self, CommandExecutor};
use crate::config::KrbConfig;
use crate::error::{KrbError, KrbResult};
use crate::status::{parse_klist_output, TicketStatus};
use crate::updater::TicketUpdater;
use chrono::{Local, NaiveDateTime};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// One credential cache's current ticket and its lifecycle operations
pub struct KrbTicket {
    config: KrbConfig,
    executor: Arc<dyn CommandExecutor>,
    status: Mutex<Option<TicketStatus>>,
    updater: Mutex<Option<Arc<TicketUpdater>>>,
}

impl fmt::Debug for KrbTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KrbTicket")
            .field("config", &self.config)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl KrbTicket {
    /// Create an unpopulated ticket; `reload` fills the snapshot
    pub(crate) fn new(config: KrbConfig, executor: Arc<dyn CommandExecutor>) -> Arc<Self> {
        Arc::new(Self {
            config,
            executor,
            status: Mutex::new(None),
            updater: Mutex::new(None),
        })
    }

    /// Configuration this ticket was created with
    pub fn config(&self) -> &KrbConfig {
        &self.config
    }

    /// Clone of the current snapshot; None until the first successful reload
    pub fn status(&self) -> Option<TicketStatus> {
        self.status.lock().unwrap().clone()
    }

    /// Principal from the snapshot, falling back to the configured one
    pub fn principal(&self) -> String {
        self.status()
            .map(|s| s.principal)
            .unwrap_or_else(|| self.config.principal.clone())
    }

    /// Start of the current validity window
    pub fn starting(&self) -> Option<NaiveDateTime> {
        self.status().and_then(|s| s.starting)
    }

    /// End of the current validity window
    pub fn expires(&self) -> Option<NaiveDateTime> {
        self.status().and_then(|s| s.expires)
    }

    /// Renewable-until ceiling, absent for non-renewable tickets
    pub fn renew_expires(&self) -> Option<NaiveDateTime> {
        self.status().and_then(|s| s.renew_expires)
    }

    /// Service principal of the current ticket
    pub fn service_principal(&self) -> Option<String> {
        self.status().map(|s| s.service_principal)
    }

    /// Whether the ticket needs attention: expired, or expiring within the
    /// renewal threshold. An unpopulated snapshot counts as expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Local::now().naive_local())
    }

    fn is_expired_at(&self, now: NaiveDateTime) -> bool {
        match self.expires() {
            Some(expires) => expires < now + self.config.renewal_threshold(),
            None => true,
        }
    }

    /// Whether a renewal (rather than a full reinit) can still extend the
    /// ticket. False whenever no renewable-until ceiling exists.
    pub fn is_renewable(&self) -> bool {
        self.is_renewable_at(Local::now().naive_local())
    }

    fn is_renewable_at(&self, now: NaiveDateTime) -> bool {
        match self.renew_expires() {
            Some(renew_expires) => renew_expires > now + self.config.renewal_threshold(),
            None => false,
        }
    }

    /// Refresh the snapshot, then renew or reinitialize if the ticket is
    /// within the renewal threshold of expiry. No-op for a healthy ticket.
    pub async fn maybe_update(&self) -> KrbResult<()> {
        self.reload().await?;

        if self.is_expired() {
            if self.is_renewable() {
                self.renew().await
            } else {
                self.reinit().await
            }
        } else {
            Ok(())
        }
    }

    /// Extend the ticket within its renewable window
    pub async fn renew(&self) -> KrbResult<()> {
        info!("Renewing ticket for {}...", self.principal());
        command::renew(&self.config, self.executor.as_ref()).await?;
        self.reload().await
    }

    /// Obtain a fresh ticket with a new renewable-until ceiling
    pub async fn reinit(&self) -> KrbResult<()> {
        info!("Reinitializing ticket for {}...", self.principal());
        command::kinit(&self.config, self.executor.as_ref()).await?;
        self.reload().await
    }

    /// Overwrite the snapshot from the external cache.
    ///
    /// Fails with `NoCredentialFound` when the cache file is absent; the
    /// caller decides whether to initialize.
    pub async fn reload(&self) -> KrbResult<()> {
        debug!("Reloading ticket state from {}...", self.config.ccache_name);
        if !command::cache_exists(&self.config) {
            return Err(KrbError::NoCredentialFound(PathBuf::from(
                &self.config.ccache_name,
            )));
        }

        let output = command::klist(&self.config, self.executor.as_ref()).await?;
        let parsed = parse_klist_output(&output)?;
        *self.status.lock().unwrap() = parsed;
        Ok(())
    }

    /// Stop the updater and revoke the underlying cache
    pub async fn destroy(&self) -> KrbResult<()> {
        self.stop_updater();
        command::kdestroy(&self.config, self.executor.as_ref()).await?;
        Ok(())
    }

    /// The single updater bound to this ticket, created on first use.
    ///
    /// The interval of the first call wins; later calls return the same
    /// updater unchanged.
    pub fn updater(self: &Arc<Self>, interval: Duration) -> Arc<TicketUpdater> {
        let mut slot = self.updater.lock().unwrap();
        if let Some(updater) = slot.as_ref() {
            return updater.clone();
        }
        let updater = TicketUpdater::new(Arc::downgrade(self), &self.config, interval);
        *slot = Some(updater.clone());
        updater
    }

    /// Create the updater if needed and start its background loop
    pub fn start_updater(self: &Arc<Self>, interval: Duration) -> KrbResult<()> {
        self.updater(interval).start()
    }

    /// Signal the updater, if any, to stop at its next iteration boundary
    pub fn stop_updater(&self) {
        let updater = self.updater.lock().unwrap().clone();
        if let Some(updater) = updater {
            updater.stop();
        }
    }
}
