//! Resolve, validate and commit roster rows.
//!
//! Rows come either from a freshly read screenshot or from the backlog. Each
//! row ends up committed, parked in the backlog, or dropped as a duplicate.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{error, info, warn};

use super::backlog::BacklogReconciler;
use super::dictionary::read_seed_file;
use super::report::{CommittedRow, IngestReport, ScreenshotFailure};
use super::resolver::{NameResolver, Resolution};
use super::validator::{PowerCheck, PowerValidator};
use super::{BacklogEntry, BacklogReason, RosterSnapshot, RowRead, normalize_name};
use crate::config::ValidationConfig;
use crate::error::{IngestError, StoreResult};
use crate::fetch::ImageSource;
use crate::ocr::ScreenshotReader;
use crate::store::{InsertOutcome, RosterStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitMode {
    /// Power is validated against history
    Checked,
    /// Operator vouched for the row; validation is skipped
    Confirmed,
}

/// A row ready for resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub alliance: String,
    pub day: NaiveDate,
    pub level: u32,
    pub power: u64,
    pub power_text: String,
}

impl Candidate {
    pub fn from_row(row: &RowRead, alliance: &str, day: NaiveDate) -> Self {
        Self {
            name: row.name.clone(),
            alliance: normalize_name(alliance),
            day,
            level: row.level,
            power: row.power,
            power_text: row.power_text.clone(),
        }
    }

    pub fn from_backlog(entry: &BacklogEntry) -> Self {
        Self {
            name: entry.name.clone(),
            alliance: entry.alliance.clone(),
            day: entry.day,
            level: entry.level,
            power: entry.power,
            power_text: entry.power.to_string(),
        }
    }

    fn park_as(&self, name: &str, reason: BacklogReason) -> BacklogEntry {
        BacklogEntry {
            name: normalize_name(name),
            alliance: self.alliance.clone(),
            day: self.day,
            level: self.level,
            power: self.power,
            reason,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RowOutcome {
    Committed(CommittedRow),
    Parked {
        entry: BacklogEntry,
        prior: Option<u64>,
    },
    /// The player already has a snapshot for that day
    Duplicate { name: String },
}

impl IngestReport {
    pub fn record(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Committed(row) => self.committed.push(row),
            RowOutcome::Parked { entry, prior } => self.record_parked(&entry, prior),
            RowOutcome::Duplicate { name } => self.duplicates.push(name),
        }
    }
}

pub struct Ingestor<'a> {
    store: &'a dyn RosterStore,
    resolver: NameResolver<'a>,
    validator: PowerValidator,
    backlog: BacklogReconciler<'a>,
    now: NaiveDateTime,
}

impl<'a> Ingestor<'a> {
    /// `now` stamps every snapshot; its date is "today" for duplicate checks.
    pub fn new(
        store: &'a dyn RosterStore,
        validation: &ValidationConfig,
        now: NaiveDateTime,
    ) -> StoreResult<Self> {
        Ok(Self {
            store,
            resolver: NameResolver::new(store, validation.max_edit_distance)?,
            validator: PowerValidator::new(validation.power_band),
            backlog: BacklogReconciler::new(store),
            now,
        })
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date()
    }

    pub fn resolver(&mut self) -> &mut NameResolver<'a> {
        &mut self.resolver
    }

    /// Adds spellings from a seed file that the dictionary does not have yet.
    pub fn seed_dictionary(&mut self, path: &Path) -> Result<usize, IngestError> {
        let mut added = 0;
        for word in read_seed_file(path)? {
            if !self.resolver.dictionary().contains(&word) {
                self.resolver.learn(&word)?;
                added += 1;
            }
        }
        if added > 0 {
            info!("Added {} words from {}", added, path.display());
        }
        Ok(added)
    }

    /// Reads and commits every screenshot for `alliance`.
    ///
    /// A screenshot that cannot be loaded or read is reported and skipped. Each
    /// screenshot is fully read before any of its rows reach the store.
    pub fn upload(
        &mut self,
        alliance: &str,
        sources: &[String],
        images: &dyn ImageSource,
        reader: &ScreenshotReader<'_>,
    ) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport::default();
        let day = self.today();

        for (index, source) in sources.iter().enumerate() {
            info!("Looking at image {} of {}: {}", index + 1, sources.len(), source);
            let read = match images.load(source).and_then(|img| reader.read(img)) {
                Ok(read) => read,
                Err(e) => {
                    error!("Unable to process screenshot {}: {}", source, e);
                    report.screenshot_errors.push(ScreenshotFailure {
                        source: source.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            for failure in &read.failures {
                warn!("{}: {}", source, failure);
            }
            report.row_failures.extend(read.failures);

            for row in &read.rows {
                let outcome = self.submit(Candidate::from_row(row, alliance, day), SubmitMode::Checked)?;
                report.record(outcome);
            }
        }

        Ok(report)
    }

    /// Runs `name`'s backlog entries through the pipeline again.
    ///
    /// An entry leaves the backlog only once its own outcome is stored, so a
    /// store failure part way through keeps the remaining entries parked.
    pub fn replay(&mut self, name: &str, mode: SubmitMode) -> StoreResult<IngestReport> {
        let mut report = IngestReport::default();
        let entries = self.backlog.pending(name)?;
        if entries.is_empty() {
            info!("Nothing in the backlog for '{}'", normalize_name(name));
        }
        for entry in &entries {
            let outcome = self.submit(Candidate::from_backlog(entry), mode)?;
            // Parking again under the same name, alliance and day already replaced it
            let parked_in_place = matches!(
                &outcome,
                RowOutcome::Parked { entry: parked, .. }
                    if parked.name == entry.name
                        && parked.alliance == entry.alliance
                        && parked.day == entry.day
            );
            if !parked_in_place {
                self.backlog.remove(entry)?;
            }
            report.record(outcome);
        }
        Ok(report)
    }

    pub fn submit(&mut self, candidate: Candidate, mode: SubmitMode) -> StoreResult<RowOutcome> {
        let raw = normalize_name(&candidate.name);
        let (key, spelling) = match self.resolver.resolve(&candidate.name)? {
            Resolution::Matched { key, spelling, .. } => (key, spelling),
            Resolution::Unlinked { spelling } => {
                let (key, _) = self.resolver.find_or_allocate(&spelling)?;
                (key, spelling)
            }
            Resolution::Unrecognized => {
                warn!("Unrecognized player name {}", raw);
                let entry = candidate.park_as(&raw, BacklogReason::Misspelled);
                self.backlog.park(&entry)?;
                return Ok(RowOutcome::Parked { entry, prior: None });
            }
        };

        if self.store.snapshot_on(key, candidate.day)?.is_some() {
            warn!(
                "Data for player {} has already been entered for {}. Skipping this player...",
                spelling, candidate.day
            );
            return Ok(RowOutcome::Duplicate { name: spelling });
        }

        let (power, repaired) = match mode {
            SubmitMode::Confirmed => (candidate.power, false),
            SubmitMode::Checked => {
                let prior = self
                    .store
                    .latest_snapshot_before(key, candidate.day)?
                    .map(|s| s.power);
                match self.validator.check(candidate.power, &candidate.power_text, prior) {
                    PowerCheck::Accepted { power, repaired } => (power, repaired),
                    PowerCheck::SuspiciousPowerJump => {
                        let entry = candidate.park_as(&spelling, BacklogReason::SuspiciousPowerJump);
                        self.backlog.park(&entry)?;
                        return Ok(RowOutcome::Parked { entry, prior });
                    }
                    PowerCheck::NoBaseline => {
                        let entry = candidate.park_as(&spelling, BacklogReason::NewPlayerUnconfirmed);
                        self.backlog.park(&entry)?;
                        return Ok(RowOutcome::Parked { entry, prior });
                    }
                }
            }
        };

        let snapshot = RosterSnapshot {
            key,
            day: candidate.day,
            alliance: candidate.alliance.clone(),
            level: candidate.level,
            power,
            recorded_at: self.now,
        };
        if self.store.insert_snapshot(&snapshot)? == InsertOutcome::AlreadyPresent {
            return Ok(RowOutcome::Duplicate { name: spelling });
        }

        info!("Name: {}, Lv: {}, Power: {}", spelling, candidate.level, power);
        Ok(RowOutcome::Committed(CommittedRow {
            key,
            corrected_from: (raw != spelling).then_some(raw),
            name: spelling,
            level: candidate.level,
            power,
            repaired,
        }))
    }
}
