//! Background ticket updater with pluggable cross-process coordination
//!
//! One cancellable task per ticket: check for cancellation, run a
//! strategy-guarded `maybe_update`, sleep. The sleep itself is cancellable,
//! so `stop` never waits out a full interval; an update already in flight
//! completes before the loop exits.

use crate::config::{KrbConfig, UpdaterStrategy};
use crate::error::KrbResult;
use crate::lockfile::{FileLock, LockGuard};
use crate::ticket::KrbTicket;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default poll interval between update attempts
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
    Stopped,
}

/// Periodically asks its ticket to update itself until stopped
pub struct TicketUpdater {
    ticket: Weak<KrbTicket>,
    strategy: UpdaterStrategy,
    interval: Duration,
    mutation_lock: FileLock,
    leader_lock: FileLock,
    state: Mutex<RunState>,
    token: CancellationToken,
}

impl TicketUpdater {
    pub(crate) fn new(
        ticket: Weak<KrbTicket>,
        config: &KrbConfig,
        interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            ticket,
            strategy: config.updater_strategy,
            interval,
            mutation_lock: FileLock::new(config.ccache_lockfile()),
            leader_lock: FileLock::new(config.updater_lockfile()),
            state: Mutex::new(RunState::Idle),
            token: CancellationToken::new(),
        })
    }

    /// Start the background loop. Idempotent: a running or stopped updater
    /// is left as-is. Must be called from within a tokio runtime.
    ///
    /// Under the SingleElected strategy an updater that loses the
    /// leadership election transitions straight to stopped and never loops;
    /// the elected leader elsewhere keeps renewal duty.
    pub fn start(self: &Arc<Self>) -> KrbResult<()> {
        let mut state = self.state.lock().unwrap();
        match *state {
            RunState::Running => {
                debug!("Ticket updater already running");
                return Ok(());
            }
            RunState::Stopped => {
                debug!("Ticket updater already stopped");
                return Ok(());
            }
            RunState::Idle => {}
        }

        let leader_guard = match self.strategy {
            UpdaterStrategy::SingleElected => match self.leader_lock.try_acquire()? {
                Some(guard) => Some(guard),
                None => {
                    debug!(
                        "Another updater holds {}; not starting",
                        self.leader_lock.path().display()
                    );
                    *state = RunState::Stopped;
                    return Ok(());
                }
            },
            _ => None,
        };

        *state = RunState::Running;
        info!(
            "Ticket updater started ({:?}, every {:?})",
            self.strategy, self.interval
        );

        let updater = self.clone();
        tokio::spawn(async move {
            updater.run(leader_guard).await;
        });
        Ok(())
    }

    /// Signal the loop to stop at its next iteration boundary.
    ///
    /// Returns immediately; an in-flight update completes first.
    pub fn stop(&self) {
        debug!("Stopping ticket updater...");
        self.token.cancel();

        // a never-started updater must not be startable afterwards
        let mut state = self.state.lock().unwrap();
        if *state == RunState::Idle {
            *state = RunState::Stopped;
        }
    }

    /// Whether the background loop is currently alive
    pub fn is_running(&self) -> bool {
        *self.state.lock().unwrap() == RunState::Running
    }

    async fn run(self: Arc<Self>, leader_guard: Option<LockGuard>) {
        loop {
            if self.token.is_cancelled() {
                break;
            }

            debug!("Trying to update ticket...");
            if let Err(err) = self.tick().await {
                warn!("Ticket update failed: {err}");
            }

            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        // release leadership before reporting stopped, so a successor that
        // observes the stop can immediately win the election
        drop(leader_guard);
        *self.state.lock().unwrap() = RunState::Stopped;
        debug!("Ticket updater exited");
    }

    async fn tick(&self) -> KrbResult<()> {
        let Some(ticket) = self.ticket.upgrade() else {
            // ticket dropped out from under us; wind the loop down
            self.token.cancel();
            return Ok(());
        };

        match self.strategy {
            UpdaterStrategy::MutexGuarded => {
                let _guard = self.mutation_lock.acquire().await?;
                ticket.maybe_update().await
            }
            UpdaterStrategy::Isolated | UpdaterStrategy::SingleElected => {
                ticket.maybe_update().await
            }
        }
    }
}
