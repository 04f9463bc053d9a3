//! klist output parsing
//!
//! The listing consumed here is the fixed five-or-six-line block klist
//! prints under `LC_ALL=C`:
//!
//! ```text
//! Ticket cache: FILE:/tmp/krb5cc_1000
//! Default principal: user@EXAMPLE.COM
//!
//! Valid starting     Expires            Service principal
//! 11/22/19 00:23:10  11/22/19 00:23:12  krbtgt/EXAMPLE.COM@EXAMPLE.COM
//!         renew until 12/20/19 00:23:10
//! ```
//!
//! The trailing `renew until` line is present only for renewable tickets.

use crate::error::{KrbError, KrbResult};
use chrono::NaiveDateTime;

/// Timestamp format used by klist
pub const KLIST_TIME_FORMAT: &str = "%m/%d/%y %H:%M:%S";

const RENEW_UNTIL_PREFIX: &str = "renew until ";

/// Parsed snapshot of one credential cache's current ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketStatus {
    /// Cache file path as reported by klist
    pub cache_path: String,

    /// Principal the ticket was issued to
    pub principal: String,

    /// Start of the validity window
    pub starting: Option<NaiveDateTime>,

    /// End of the validity window
    pub expires: Option<NaiveDateTime>,

    /// Service principal of the ticket-granting ticket
    pub service_principal: String,

    /// Renewable-until ceiling; absent means the ticket is not renewable
    pub renew_expires: Option<NaiveDateTime>,
}

/// Parse a klist listing into a ticket snapshot.
///
/// Empty output means no credential is present and yields `Ok(None)`.
/// Output with fewer than five lines is malformed, not empty, and fails
/// with a parse error rather than producing a partial snapshot.
pub fn parse_klist_output(output: &str) -> KrbResult<Option<TicketStatus>> {
    if output.trim().is_empty() {
        return Ok(None);
    }

    let lines: Vec<&str> = output.lines().collect();
    if lines.len() < 5 {
        return Err(KrbError::parse(format!(
            "expected at least 5 lines, got {}",
            lines.len()
        )));
    }

    let cache_path = lines[0]
        .splitn(3, ':')
        .nth(2)
        .ok_or_else(|| KrbError::parse("missing cache path on line 1"))?
        .to_string();

    let principal = lines[1]
        .splitn(2, ':')
        .nth(1)
        .ok_or_else(|| KrbError::parse("missing principal on line 2"))?
        .trim()
        .to_string();

    let fields: Vec<&str> = lines[4].trim().split("  ").collect();
    if fields.len() != 3 {
        return Err(KrbError::parse(format!(
            "expected 3 fields on line 5, got {}",
            fields.len()
        )));
    }
    let starting = parse_timestamp(fields[0])?;
    let expires = parse_timestamp(fields[1])?;
    let service_principal = fields[2].to_string();

    let renew_expires = if lines.len() > 5 {
        let raw = lines[5].trim();
        let raw = raw.strip_prefix(RENEW_UNTIL_PREFIX).unwrap_or(raw);
        parse_timestamp(raw)?
    } else {
        None
    };

    Ok(Some(TicketStatus {
        cache_path,
        principal,
        starting,
        expires,
        service_principal,
        renew_expires,
    }))
}

/// Parse a klist timestamp; an empty field is an absent value, not an error
fn parse_timestamp(raw: &str) -> KrbResult<Option<NaiveDateTime>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    NaiveDateTime::parse_from_str(raw, KLIST_TIME_FORMAT)
        .map(Some)
        .map_err(|e| KrbError::parse(format!("bad timestamp {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    const RENEWABLE_OUTPUT: &str = "\
Ticket cache: FILE:/tmp/krb5cc_1000
Default principal: user@EXAMPLE.COM

Valid starting     Expires            Service principal
11/22/19 00:23:10  11/22/19 00:23:12  krbtgt/EXAMPLE.COM@EXAMPLE.COM
        renew until 12/20/19 00:23:10";

    #[test]
    fn parse_renewable_ticket() {
        let status = parse_klist_output(RENEWABLE_OUTPUT).unwrap().unwrap();

        assert_eq!(status.cache_path, "/tmp/krb5cc_1000");
        assert_eq!(status.principal, "user@EXAMPLE.COM");
        assert_eq!(status.starting, Some(ts(2019, 11, 22, 0, 23, 10)));
        assert_eq!(status.expires, Some(ts(2019, 11, 22, 0, 23, 12)));
        assert_eq!(
            status.service_principal,
            "krbtgt/EXAMPLE.COM@EXAMPLE.COM"
        );
        assert_eq!(status.renew_expires, Some(ts(2019, 12, 20, 0, 23, 10)));
    }

    #[test]
    fn parse_non_renewable_ticket() {
        let output = RENEWABLE_OUTPUT
            .lines()
            .take(5)
            .collect::<Vec<_>>()
            .join("\n");
        let status = parse_klist_output(&output).unwrap().unwrap();

        assert_eq!(status.principal, "user@EXAMPLE.COM");
        assert_eq!(status.renew_expires, None);
    }

    #[test]
    fn empty_output_is_uninitialized() {
        assert_eq!(parse_klist_output("").unwrap(), None);
        assert_eq!(parse_klist_output("  \n  ").unwrap(), None);
    }

    #[test]
    fn short_output_is_malformed() {
        let output = "Ticket cache: FILE:/tmp/krb5cc_1000\nDefault principal: user@EXAMPLE.COM";
        let err = parse_klist_output(output).unwrap_err();
        assert!(matches!(err, KrbError::Parse(_)));
    }

    #[test]
    fn bad_timestamp_is_malformed() {
        let output = RENEWABLE_OUTPUT.replace("11/22/19 00:23:10", "99/99/99 99:99:99");
        assert!(parse_klist_output(&output).is_err());
    }

    #[test]
    fn cache_path_keeps_colons() {
        let output = RENEWABLE_OUTPUT.replace(
            "FILE:/tmp/krb5cc_1000",
            "FILE:/tmp/krb5cc_1000:sub",
        );
        let status = parse_klist_output(&output).unwrap().unwrap();
        assert_eq!(status.cache_path, "/tmp/krb5cc_1000:sub");
    }

    #[test]
    fn roundtrip_through_formatted_listing() {
        let starting = ts(2026, 8, 6, 9, 15, 0);
        let expires = ts(2026, 8, 6, 19, 15, 0);
        let renew = ts(2026, 8, 13, 9, 15, 0);

        let output = format!(
            "Ticket cache: FILE:/tmp/krb5cc_1000\n\
             Default principal: user@EXAMPLE.COM\n\
             \n\
             Valid starting     Expires            Service principal\n\
             {}  {}  krbtgt/EXAMPLE.COM@EXAMPLE.COM\n\
             \trenew until {}",
            starting.format(KLIST_TIME_FORMAT),
            expires.format(KLIST_TIME_FORMAT),
            renew.format(KLIST_TIME_FORMAT),
        );

        let status = parse_klist_output(&output).unwrap().unwrap();
        assert_eq!(status.starting, Some(starting));
        assert_eq!(status.expires, Some(expires));
        assert_eq!(status.renew_expires, Some(renew));
        assert_eq!(
            status.service_principal,
            "krbtgt/EXAMPLE.COM@EXAMPLE.COM"
        );
    }
}
