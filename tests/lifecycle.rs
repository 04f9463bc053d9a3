//! End-to-end ticket lifecycle scenarios against a scripted KDC.
//!
//! The executor below stands in for the real Kerberos tools: kinit issues a
//! ticket with a short lifetime, kinit -R extends it up to the renewable
//! ceiling, and klist prints the usual listing. Timings mirror a ticket
//! with a 4s lifetime and an 8s renewable lifetime polled every 0.5s.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Local, NaiveDateTime};
use krbkeep::command::{CommandExecutor, CommandLine};
use krbkeep::status::KLIST_TIME_FORMAT;
use krbkeep::{KrbConfig, KrbError, KrbResult, TicketRegistry, UpdaterStrategy};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const RENEWAL_THRESHOLD: Duration = Duration::from_secs(1);
const TICKET_LIFETIME: Duration = Duration::from_secs(4);
const RENEWABLE_LIFETIME: Duration = Duration::from_secs(8);
const UPDATER_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Clone)]
struct IssuedTicket {
    starting: NaiveDateTime,
    expires: NaiveDateTime,
    renew_until: NaiveDateTime,
}

/// Stand-in for kinit/klist/kdestroy backed by an in-memory KDC
struct FakeKdc {
    lifetime: ChronoDuration,
    renewable_lifetime: ChronoDuration,
    issued: Mutex<Option<IssuedTicket>>,
}

impl FakeKdc {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            lifetime: ChronoDuration::from_std(TICKET_LIFETIME).unwrap(),
            renewable_lifetime: ChronoDuration::from_std(RENEWABLE_LIFETIME).unwrap(),
            issued: Mutex::new(None),
        })
    }
}

fn truncated_now() -> NaiveDateTime {
    // klist prints whole seconds; keep the model at the same precision
    let now = Local::now().naive_local();
    now - ChronoDuration::nanoseconds(i64::from(now.and_utc().timestamp_subsec_nanos()))
}

#[async_trait]
impl CommandExecutor for FakeKdc {
    async fn execute(&self, cmd: &CommandLine) -> KrbResult<String> {
        let ccache = cmd
            .args
            .iter()
            .position(|a| a == "-c")
            .map(|i| cmd.args[i + 1].clone())
            .unwrap_or_default();

        if cmd.args.contains(&"-R".to_string()) {
            // kinit -R: extend within the renewable window
            let mut issued = self.issued.lock().unwrap();
            let Some(ticket) = issued.as_mut() else {
                return Err(KrbError::command_failed(
                    cmd.to_string(),
                    1,
                    "kinit: No credentials cache found",
                ));
            };
            let now = truncated_now();
            ticket.starting = now;
            ticket.expires = (now + self.lifetime).min(ticket.renew_until);
            return Ok(String::new());
        }

        match cmd.bin.as_str() {
            "kinit" => {
                let now = truncated_now();
                *self.issued.lock().unwrap() = Some(IssuedTicket {
                    starting: now,
                    expires: now + self.lifetime,
                    renew_until: now + self.renewable_lifetime,
                });
                std::fs::write(&ccache, b"").unwrap();
                Ok(String::new())
            }
            "klist" => {
                let issued = self.issued.lock().unwrap();
                let Some(ticket) = issued.as_ref() else {
                    return Err(KrbError::command_failed(
                        cmd.to_string(),
                        1,
                        "klist: No credentials cache found",
                    ));
                };
                Ok(format!(
                    "Ticket cache: FILE:{ccache}\n\
                     Default principal: user@EXAMPLE.COM\n\
                     \n\
                     Valid starting     Expires            Service principal\n\
                     {}  {}  krbtgt/EXAMPLE.COM@EXAMPLE.COM\n\
                     \trenew until {}",
                    ticket.starting.format(KLIST_TIME_FORMAT),
                    ticket.expires.format(KLIST_TIME_FORMAT),
                    ticket.renew_until.format(KLIST_TIME_FORMAT),
                ))
            }
            "kdestroy" => {
                *self.issued.lock().unwrap() = None;
                let _ = std::fs::remove_file(&ccache);
                Ok(String::new())
            }
            other => Err(KrbError::CommandNotFound(other.to_string())),
        }
    }
}

fn short_lived_config(dir: &TempDir, strategy: UpdaterStrategy) -> KrbConfig {
    let mut config = KrbConfig::new("user@EXAMPLE.COM", None);
    config.ccache_name = dir
        .path()
        .join("krb5cc_lifecycle")
        .to_string_lossy()
        .into_owned();
    config.renewal_threshold_secs = RENEWAL_THRESHOLD.as_secs();
    config.ticket_lifetime = Some("4s".to_string());
    config.ticket_renewable_lifetime = Some("8s".to_string());
    config.updater_strategy = strategy;
    config
}

#[tokio::test]
async fn get_before_init_fails_then_succeeds() {
    let dir = TempDir::new().unwrap();
    let registry = TicketRegistry::with_executor(FakeKdc::new());
    let config = short_lived_config(&dir, UpdaterStrategy::Isolated);

    let err = registry.get(&config).await.unwrap_err();
    assert!(matches!(err, KrbError::NoCredentialFound(_)));

    let initialized = registry.init(&config).await.unwrap();
    let fetched = registry.get(&config).await.unwrap();

    assert!(Arc::ptr_eq(&initialized, &fetched));
    assert_eq!(fetched.principal(), "user@EXAMPLE.COM");
    assert_eq!(fetched.expires(), initialized.expires());
    assert!(fetched.renew_expires().is_some());
}

#[tokio::test]
async fn destroyed_registry_forgets_its_tickets() {
    let dir = TempDir::new().unwrap();
    let registry = TicketRegistry::with_executor(FakeKdc::new());
    let config = short_lived_config(&dir, UpdaterStrategy::Isolated);

    let ticket = registry.init(&config).await.unwrap();
    ticket.start_updater(UPDATER_INTERVAL).unwrap();

    registry.destroy_all().await.unwrap();
    assert!(registry.is_empty());
    assert!(registry.get(&config).await.is_err());
}

/// The ticket is renewed while its renewable window lasts (same ceiling),
/// then fully reinitialized once renewal can no longer help (new ceiling).
async fn renews_then_reinitializes(strategy: UpdaterStrategy) {
    let dir = TempDir::new().unwrap();
    let registry = TicketRegistry::with_executor(FakeKdc::new());
    let config = short_lived_config(&dir, strategy);

    let ticket = registry.init(&config).await.unwrap();
    let starting0 = ticket.starting().unwrap();
    let expires0 = ticket.expires().unwrap();
    let renew0 = ticket.renew_expires().unwrap();

    ticket.start_updater(UPDATER_INTERVAL).unwrap();

    // one renewal fits inside the lifetime + threshold
    tokio::time::sleep(TICKET_LIFETIME + RENEWAL_THRESHOLD).await;
    let starting1 = ticket.starting().unwrap();
    let expires1 = ticket.expires().unwrap();
    assert!(starting1 > starting0);
    assert!(expires1 > expires0);
    assert_eq!(ticket.renew_expires().unwrap(), renew0);

    // past the renewable ceiling only a reinit gets a fresh ticket
    tokio::time::sleep(RENEWABLE_LIFETIME - TICKET_LIFETIME + RENEWAL_THRESHOLD).await;
    assert!(ticket.starting().unwrap() > starting1);
    assert!(ticket.expires().unwrap() > expires1);
    assert!(ticket.renew_expires().unwrap() > renew0);

    ticket.stop_updater();
}

#[tokio::test]
async fn isolated_updater_renews_then_reinitializes() {
    renews_then_reinitializes(UpdaterStrategy::Isolated).await;
}

#[tokio::test]
async fn mutex_guarded_updater_renews_then_reinitializes() {
    renews_then_reinitializes(UpdaterStrategy::MutexGuarded).await;
}

#[tokio::test]
async fn single_elected_updater_renews_then_reinitializes() {
    renews_then_reinitializes(UpdaterStrategy::SingleElected).await;
}
