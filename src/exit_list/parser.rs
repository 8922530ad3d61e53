//! Parser for the Tor project's `exit-addresses` document.
//!
//! The document is a flat sequence of lines, nominally four per relay:
//!
//! ```text
//! ExitNode 0011BD2485AD45D984EC4159C88FC066E5E3300E
//! Published 2024-01-01 09:38:59
//! LastStatus 2024-01-01 11:00:00
//! ExitAddress 162.247.74.201 2024-01-01 11:05:42
//! ```
//!
//! Records are framed purely by position: every fourth line starts a new
//! record, whatever tag it carries.

use super::{ExitAddress, ExitListError, RelayRecord};
use chrono::{DateTime, NaiveDateTime, Utc};

/// Timestamp layout used by every dated field.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const LINES_PER_RECORD: usize = 4;

/// Parse an exit address document into relay records.
///
/// Unparsable timestamps are stored as `None`. A known tag with too few
/// fields fails the whole document.
pub fn parse_exit_list(content: &str) -> Result<Vec<RelayRecord>, ExitListError> {
    let mut records = Vec::new();
    let mut record = RelayRecord::default();

    for (i, line) in content.lines().enumerate() {
        if i % LINES_PER_RECORD == 0 {
            let finished = std::mem::take(&mut record);
            if !finished.exit_node_id.is_empty() {
                records.push(finished);
            }
        }

        let parts: Vec<&str> = line.split(' ').collect();
        match parts[0] {
            "ExitNode" => {
                require_fields(&parts, 2, i)?;
                record.exit_node_id = parts[1].to_string();
            }
            "Published" => {
                require_fields(&parts, 3, i)?;
                record.published_at = parse_timestamp(parts[1], parts[2]);
            }
            "LastStatus" => {
                require_fields(&parts, 3, i)?;
                record.last_status_at = parse_timestamp(parts[1], parts[2]);
            }
            "ExitAddress" => {
                require_fields(&parts, 4, i)?;
                record.exit_address = ExitAddress {
                    ip_address: parts[1].to_string(),
                    observed_at: parse_timestamp(parts[2], parts[3]),
                };
            }
            _ => {}
        }
    }

    // Trailing partial groups are kept; identifier-less leftovers are not.
    if !record.exit_node_id.is_empty() {
        records.push(record);
    }

    Ok(records)
}

fn require_fields(parts: &[&str], expected: usize, index: usize) -> Result<(), ExitListError> {
    if parts.len() < expected {
        return Err(ExitListError::Format {
            line: index + 1,
            tag: parts[0].to_string(),
            expected,
            found: parts.len(),
        });
    }
    Ok(())
}

fn parse_timestamp(date: &str, time: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(&format!("{date} {time}"), TIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
