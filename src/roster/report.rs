//! Results of an upload or a backlog replay.

use std::fmt;

use serde::Serialize;

use super::{BacklogEntry, BacklogReason, PlayerKey};
use crate::ocr::RowFailure;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommittedRow {
    pub key: PlayerKey,
    pub name: String,
    pub level: u32,
    pub power: u64,
    /// Spelling as read, when the dictionary corrected it
    pub corrected_from: Option<String>,
    /// Power had a misread leading digit removed
    pub repaired: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PowerWarning {
    pub name: String,
    pub power: u64,
    pub prior: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScreenshotFailure {
    pub source: String,
    pub error: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub committed: Vec<CommittedRow>,
    /// Names parked as misspelled
    pub unrecognized: Vec<String>,
    pub power_warnings: Vec<PowerWarning>,
    /// Names parked until a first power reading is confirmed
    pub new_players: Vec<String>,
    /// Names that already had a snapshot for the day
    pub duplicates: Vec<String>,
    pub row_failures: Vec<RowFailure>,
    pub screenshot_errors: Vec<ScreenshotFailure>,
}

impl IngestReport {
    pub fn success_count(&self) -> usize {
        self.committed.len()
    }

    /// Rows and screenshots that could not be read at all.
    pub fn failure_count(&self) -> usize {
        self.row_failures.len() + self.screenshot_errors.len()
    }

    pub fn backlogged_count(&self) -> usize {
        self.unrecognized.len() + self.power_warnings.len() + self.new_players.len()
    }

    /// Appends everything recorded in `other`.
    pub fn merge(&mut self, other: IngestReport) {
        self.committed.extend(other.committed);
        self.unrecognized.extend(other.unrecognized);
        self.power_warnings.extend(other.power_warnings);
        self.new_players.extend(other.new_players);
        self.duplicates.extend(other.duplicates);
        self.row_failures.extend(other.row_failures);
        self.screenshot_errors.extend(other.screenshot_errors);
    }

    pub fn record_parked(&mut self, entry: &BacklogEntry, prior: Option<u64>) {
        match entry.reason {
            BacklogReason::Misspelled => self.unrecognized.push(entry.name.clone()),
            BacklogReason::SuspiciousPowerJump => self.power_warnings.push(PowerWarning {
                name: entry.name.clone(),
                power: entry.power,
                prior: prior.unwrap_or(0),
            }),
            BacklogReason::NewPlayerUnconfirmed => self.new_players.push(entry.name.clone()),
        }
    }
}

/// `1234567` -> `1,234,567`
pub fn with_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.committed {
            write!(
                f,
                "Name: {},\tLv: {},\tPower: {}",
                row.name,
                row.level,
                with_thousands(row.power)
            )?;
            if let Some(original) = &row.corrected_from {
                write!(f, "\t(read as {original})")?;
            }
            if row.repaired {
                f.write_str("\t(power repaired)")?;
            }
            writeln!(f)?;
        }
        for name in &self.duplicates {
            writeln!(
                f,
                "Data for player {name} has already been entered today. Skipping this player..."
            )?;
        }
        for name in &self.unrecognized {
            writeln!(
                f,
                "Unrecognized player name {name}. If this is a new player, please add them to the \
                 dictionary by doing 'add-name <player name>'"
            )?;
        }
        for warning in &self.power_warnings {
            writeln!(
                f,
                "Suspicious power for {}: read {} but last recorded {}. Use 'confirm {}' if it is correct",
                warning.name,
                with_thousands(warning.power),
                with_thousands(warning.prior),
                warning.name
            )?;
        }
        for name in &self.new_players {
            writeln!(
                f,
                "New player {name} has no earlier data. Use 'confirm {name}' to record it"
            )?;
        }
        for failure in &self.row_failures {
            writeln!(f, "Unable to process {failure}")?;
        }
        for failure in &self.screenshot_errors {
            writeln!(f, "Unable to process screenshot {}: {}", failure.source, failure.error)?;
        }
        write!(
            f,
            "{} recorded, {} waiting in the backlog, {} failed",
            self.success_count(),
            self.backlogged_count(),
            self.failure_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_with_thousands() {
        assert_eq!(with_thousands(0), "0");
        assert_eq!(with_thousands(999), "999");
        assert_eq!(with_thousands(1000), "1,000");
        assert_eq!(with_thousands(1_234_567), "1,234,567");
    }

    #[test]
    fn test_counts_and_rendering() {
        let mut report = IngestReport::default();
        report.committed.push(CommittedRow {
            key: PlayerKey(1),
            name: "nova".into(),
            level: 30,
            power: 1_234_567,
            corrected_from: None,
            repaired: false,
        });
        report.record_parked(
            &BacklogEntry {
                name: "zed".into(),
                alliance: "lve".into(),
                day: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                level: 3,
                power: 10,
                reason: BacklogReason::Misspelled,
            },
            None,
        );
        report.row_failures.push(RowFailure { row: 4, reason: "row is unreadable".into() });

        assert_eq!(report.success_count(), 1);
        assert_eq!(report.backlogged_count(), 1);
        assert_eq!(report.failure_count(), 1);

        let text = report.to_string();
        assert!(text.contains("Name: nova,\tLv: 30,\tPower: 1,234,567"));
        assert!(text.contains("Unrecognized player name zed"));
        assert!(text.contains("Unable to process row 4: row is unreadable"));
        assert!(text.ends_with("1 recorded, 1 waiting in the backlog, 1 failed"));
    }
}
