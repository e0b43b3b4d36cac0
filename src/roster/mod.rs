//! Roster records and the reconciliation pipeline built on them.

pub mod backlog;
pub mod dictionary;
pub mod ingest;
pub mod queries;
pub mod report;
pub mod resolver;
pub mod validator;

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Surrogate key of a player identity. Allocated once, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerKey(pub i64);

impl fmt::Display for PlayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlayerIdentity {
    pub key: PlayerKey,
    /// Lowercase spellings, most recently added first
    pub aliases: Vec<String>,
    /// Case-sensitive name chosen by an operator
    pub display_name: Option<String>,
    pub active: bool,
    /// Set when this identity was collapsed into another one
    pub merged_into: Option<PlayerKey>,
}

impl PlayerIdentity {
    /// Display name if set, otherwise the most recent alias.
    pub fn preferred_name(&self) -> String {
        self.display_name
            .clone()
            .or_else(|| self.aliases.first().cloned())
            .unwrap_or_else(|| self.key.to_string())
    }
}

/// One committed roster row for one player on one day.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RosterSnapshot {
    pub key: PlayerKey,
    pub day: NaiveDate,
    pub alliance: String,
    pub level: u32,
    pub power: u64,
    pub recorded_at: NaiveDateTime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BacklogReason {
    Misspelled,
    SuspiciousPowerJump,
    NewPlayerUnconfirmed,
}

impl BacklogReason {
    pub const ALL: [BacklogReason; 3] = [
        BacklogReason::Misspelled,
        BacklogReason::SuspiciousPowerJump,
        BacklogReason::NewPlayerUnconfirmed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BacklogReason::Misspelled => "misspelled",
            BacklogReason::SuspiciousPowerJump => "suspicious-power-jump",
            BacklogReason::NewPlayerUnconfirmed => "new-player-unconfirmed",
        }
    }
}

impl fmt::Display for BacklogReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BacklogReason {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BacklogReason::ALL
            .into_iter()
            .find(|reason| reason.as_str() == s)
            .ok_or_else(|| StoreError::Corrupt {
                column: "backlog.reason",
                value: s.to_string(),
            })
    }
}

/// A roster row waiting for an operator decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BacklogEntry {
    /// Lowercase raw name as read from the screenshot
    pub name: String,
    pub alliance: String,
    pub day: NaiveDate,
    pub level: u32,
    pub power: u64,
    pub reason: BacklogReason,
}

/// A known-good spelling used for fuzzy correction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DictionaryWord {
    pub word: String,
    pub occurrences: u32,
}

/// One roster row as read from a screenshot, before resolution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RowRead {
    /// 1-based row position on the screenshot
    pub row: usize,
    pub name: String,
    pub level: u32,
    pub power: u64,
    /// Power exactly as OCR'd (digits and commas); the leading-digit repair strips from this
    pub power_text: String,
}

/// Lowercases a name the way aliases, dictionary words and backlog names are stored.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
