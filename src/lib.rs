//! krbkeep - Kerberos ticket lifecycle manager
//!
//! Obtains a ticket-granting ticket through the standard `kinit`/`klist`/
//! `kdestroy` tools, tracks its validity window, and autonomously renews or
//! reinitializes it before expiry from a background updater.
//!
//! ```no_run
//! use krbkeep::{KrbConfig, TicketRegistry};
//! use std::time::Duration;
//!
//! # async fn demo() -> krbkeep::KrbResult<()> {
//! let registry = TicketRegistry::new();
//! let config = KrbConfig::new("svc@EXAMPLE.COM", Some("/etc/krb5.keytab".into()));
//!
//! let ticket = registry.get_or_init(&config).await?;
//! ticket.start_updater(Duration::from_secs(600))?;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod lockfile;
pub mod registry;
pub mod status;
pub mod ticket;
pub mod updater;

pub use config::{KrbConfig, RetryOptions, UpdaterStrategy};
pub use error::{KrbError, KrbResult};
pub use registry::TicketRegistry;
pub use status::TicketStatus;
pub use ticket::KrbTicket;
pub use updater::TicketUpdater;
