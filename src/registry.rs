//! Process-wide ticket registry
//!
//! At most one `KrbTicket` instance exists per credential-cache identity.
//! The registry is an explicit object: construct it once in the composition
//! root and share it by `Arc` rather than reaching for a hidden global.

use crate::command::{self, CommandExecutor, SystemExecutor};
use crate::config::KrbConfig;
use crate::error::{KrbError, KrbResult};
use crate::ticket::KrbTicket;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Map from cache identity to the unique ticket bound to it
pub struct TicketRegistry {
    executor: Arc<dyn CommandExecutor>,
    tickets: Mutex<HashMap<String, Arc<KrbTicket>>>,
}

impl TicketRegistry {
    /// Registry backed by the real Kerberos tools
    pub fn new() -> Self {
        Self::with_executor(Arc::new(SystemExecutor))
    }

    /// Registry with a custom executor (tests substitute a scripted one)
    pub fn with_executor(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            tickets: Mutex::new(HashMap::new()),
        }
    }

    /// Return the ticket for this cache identity, creating it on first use.
    ///
    /// Concurrent calls with the same identity return the same instance;
    /// the registry lock covers only the lookup-or-insert.
    pub fn get_or_create(&self, config: &KrbConfig) -> Arc<KrbTicket> {
        let mut tickets = self.tickets.lock().unwrap();
        tickets
            .entry(config.ccache_name.clone())
            .or_insert_with(|| KrbTicket::new(config.clone(), self.executor.clone()))
            .clone()
    }

    /// Ticket with a freshly reloaded snapshot.
    ///
    /// Fails with `NoCredentialFound` when no cache exists yet.
    pub async fn get(&self, config: &KrbConfig) -> KrbResult<Arc<KrbTicket>> {
        let ticket = self.get_or_create(config);
        ticket.reload().await?;
        Ok(ticket)
    }

    /// Obtain a fresh ticket via kinit, then return it reloaded
    pub async fn init(&self, config: &KrbConfig) -> KrbResult<Arc<KrbTicket>> {
        command::kinit(config, self.executor.as_ref()).await?;
        self.get(config).await
    }

    /// `get`, falling back to `init` when no credential exists yet
    pub async fn get_or_init(&self, config: &KrbConfig) -> KrbResult<Arc<KrbTicket>> {
        match self.get(config).await {
            Err(KrbError::NoCredentialFound(_)) => self.init(config).await,
            other => other,
        }
    }

    /// Number of registered tickets
    pub fn len(&self) -> usize {
        self.tickets.lock().unwrap().len()
    }

    /// Whether no tickets are registered
    pub fn is_empty(&self) -> bool {
        self.tickets.lock().unwrap().is_empty()
    }

    /// Stop every registered ticket's updater, revoke its cache, and clear
    /// the registry. Full-reset semantics, intended for teardown.
    ///
    /// Destruction continues through every ticket even if one fails; the
    /// first error is returned after the sweep.
    pub async fn destroy_all(&self) -> KrbResult<()> {
        let drained: Vec<Arc<KrbTicket>> = {
            let mut tickets = self.tickets.lock().unwrap();
            tickets.drain().map(|(_, ticket)| ticket).collect()
        };

        let mut first_err = None;
        for ticket in drained {
            info!("Destroying ticket for {}", ticket.principal());
            if let Err(err) = ticket.destroy().await {
                warn!("Failed to destroy ticket for {}: {err}", ticket.principal());
                first_err.get_or_insert(err);
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Default for TicketRegistry {
    fn default() -> Self {
        Self::new()
    }
}
