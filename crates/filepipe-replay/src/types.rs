// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core types for trace records and per-file action streams.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use filepipe::Error;

/// The actions a trace can record, one per supported client call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Open,
    Close,
    Stat,
    Read,
    PgRead,
    Write,
    PgWrite,
    Sync,
    Truncate,
    VectorRead,
    VectorWrite,
}

impl FromStr for ActionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "Open" => Ok(ActionKind::Open),
            "Close" => Ok(ActionKind::Close),
            "Stat" => Ok(ActionKind::Stat),
            "Read" => Ok(ActionKind::Read),
            "PgRead" => Ok(ActionKind::PgRead),
            "Write" => Ok(ActionKind::Write),
            "PgWrite" => Ok(ActionKind::PgWrite),
            "Sync" => Ok(ActionKind::Sync),
            "Truncate" => Ok(ActionKind::Truncate),
            "VectorRead" => Ok(ActionKind::VectorRead),
            "VectorWrite" => Ok(ActionKind::VectorWrite),
            _ => Err(Error::InvalidInput(format!("unknown action: {s}"))),
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ActionKind::Open => "Open",
            ActionKind::Close => "Close",
            ActionKind::Stat => "Stat",
            ActionKind::Read => "Read",
            ActionKind::PgRead => "PgRead",
            ActionKind::Write => "Write",
            ActionKind::PgWrite => "PgWrite",
            ActionKind::Sync => "Sync",
            ActionKind::Truncate => "Truncate",
            ActionKind::VectorRead => "VectorRead",
            ActionKind::VectorWrite => "VectorWrite",
        };
        f.write_str(name)
    }
}

/// One row of the trace, immutable after parsing.
///
/// Wire format (CSV, one action per line):
/// `<file-id>,<action>,<start-secs>,<args>,<stop-secs>,<status-str>,<response>`
/// with `<args>` a semicolon-delimited token list. The seventh field may be
/// absent. Recorders quote the status field; a matching pair of outer quotes
/// is stripped so the stored status compares against live status renderings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub file_id: u64,
    pub action: String,
    pub start: u64,
    pub args: String,
    pub stop: u64,
    pub status: String,
    pub response: String,
}

impl ActionRecord {
    pub fn parse_line(line: &str) -> Result<Self, Error> {
        let mut fields: Vec<&str> = line.split(',').collect();
        if fields.len() == 6 {
            fields.push("");
        }
        if fields.len() != 7 {
            return Err(Error::InvalidInput(format!(
                "expected 6 or 7 comma-separated fields, got {}",
                fields.len()
            )));
        }
        Ok(ActionRecord {
            file_id: parse_u64(fields[0], "file id")?,
            action: fields[1].to_string(),
            start: parse_u64(fields[2], "start time")?,
            args: fields[3].to_string(),
            stop: parse_u64(fields[4], "stop time")?,
            status: strip_quotes(fields[5]).to_string(),
            response: fields[6].to_string(),
        })
    }

    /// Serialize back into the wire format. `parse_line(to_line(r)) == r`.
    pub fn to_line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            self.file_id, self.action, self.start, self.args, self.stop, self.status, self.response
        )
    }

    /// Recorded duration in seconds.
    pub fn duration(&self) -> u64 {
        self.stop.saturating_sub(self.start)
    }
}

pub(crate) fn parse_u64(token: &str, what: &str) -> Result<u64, Error> {
    token
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("bad {what}: {token:?}")))
}

/// Remove one matching pair of surrounding double quotes, if present.
fn strip_quotes(field: &str) -> &str {
    field
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(field)
}

/// Ordered multimap from start timestamp to action records. Records sharing
/// a timestamp keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionStream {
    actions: BTreeMap<u64, Vec<ActionRecord>>,
}

impl ActionStream {
    pub fn push(&mut self, record: ActionRecord) {
        self.actions.entry(record.start).or_default().push(record);
    }

    pub fn first_start(&self) -> Option<u64> {
        self.actions.keys().next().copied()
    }

    pub fn len(&self) -> usize {
        self.actions.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionRecord> {
        self.actions.values().flatten()
    }

    /// Re-emit the stream in wire format, timestamp order.
    pub fn to_lines(&self) -> Vec<String> {
        self.iter().map(ActionRecord::to_line).collect()
    }
}

impl IntoIterator for ActionStream {
    type Item = ActionRecord;
    type IntoIter = std::iter::Flatten<std::collections::btree_map::IntoValues<u64, Vec<ActionRecord>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.into_values().flatten()
    }
}
