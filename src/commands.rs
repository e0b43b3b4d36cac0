//! Operator commands.
//!
//! Each command runs to completion against the store and returns a [`Reply`]:
//! the text a chat bot would send, an optional chart, and the same result as
//! JSON for `--json`.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{info, warn};

use crate::analysis::{self, growth};
use crate::config::BotConfig;
use crate::error::ResolveError;
use crate::fetch::ImageSource;
use crate::ocr::{Recognizer, ScreenshotReader};
use crate::roster::ingest::{Ingestor, SubmitMode};
use crate::roster::queries::RosterQueries;
use crate::roster::report::{IngestReport, with_thousands};
use crate::roster::resolver::MergeResult;
use crate::roster::{PlayerIdentity, normalize_name};
use crate::store::RosterStore;

#[derive(Debug, Default)]
pub struct Reply {
    pub text: String,
    /// Chart written for this reply
    pub image: Option<PathBuf>,
    pub data: Option<serde_json::Value>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    fn with_data<T: Serialize>(mut self, data: &T) -> Result<Self> {
        self.data = Some(serde_json::to_value(data)?);
        Ok(self)
    }

    fn with_image(mut self, image: PathBuf) -> Self {
        self.image = Some(image);
        self
    }

    /// Text for the terminal, or a JSON document when `json` is set.
    pub fn render(&self, json: bool) -> Result<String> {
        if !json {
            let mut out = self.text.clone();
            if let Some(image) = &self.image {
                write!(out, "\nChart: {}", image.display())?;
            }
            return Ok(out);
        }
        let doc = serde_json::json!({
            "text": self.text,
            "image": self.image,
            "data": self.data,
        });
        Ok(serde_json::to_string_pretty(&doc)?)
    }
}

/// "The next reset is in H hours and M minutes", counting to local midnight.
pub fn next_reset_message(now: NaiveDateTime) -> String {
    let midnight = (now.date() + Duration::days(1)).and_time(chrono::NaiveTime::MIN);
    let remaining = (midnight - now).num_seconds().max(0);
    let hours = remaining / 3600;
    let minutes = remaining % 3600 / 60;
    let seconds = remaining % 60;
    if remaining > 3600 {
        format!("The next reset is in {} hours and {} minutes", hours, minutes + 1)
    } else if remaining > 60 {
        format!("The next reset is in {} minutes", minutes + 1)
    } else {
        format!("The next reset is in {} seconds", seconds)
    }
}

pub struct Session<'a> {
    pub(crate) store: &'a dyn RosterStore,
    pub(crate) config: &'a BotConfig,
    pub(crate) now: NaiveDateTime,
    pub(crate) charts_dir: PathBuf,
}

impl<'a> Session<'a> {
    pub fn new(
        store: &'a dyn RosterStore,
        config: &'a BotConfig,
        now: NaiveDateTime,
        charts_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            config,
            now,
            charts_dir,
        }
    }

    fn today(&self) -> NaiveDate {
        self.now.date()
    }

    pub(crate) fn ingestor(&self) -> Result<Ingestor<'a>> {
        Ok(Ingestor::new(self.store, &self.config.validation, self.now)?)
    }

    fn queries(&self) -> RosterQueries<'_> {
        RosterQueries::new(self.store, &self.config.guess)
    }

    /// Identity `name` is an alias of, or a reply explaining that it is unknown.
    pub(crate) fn identity_named(&self, name: &str) -> Result<std::result::Result<PlayerIdentity, Reply>> {
        let key = match self.store.find_key(&normalize_name(name))? {
            Some(key) => key,
            None => {
                warn!("The player {} does not exist", name);
                return Ok(Err(Reply::text(format!(
                    "The player {name} does not exist. Please check your spelling and try again."
                ))));
            }
        };
        match self.store.identity(key)? {
            Some(identity) => Ok(Ok(identity)),
            None => Ok(Err(Reply::text(format!("The player {name} does not exist.")))),
        }
    }

    pub fn upload(
        &self,
        alliance: &str,
        sources: &[String],
        ocr: &dyn Recognizer,
        images: &dyn ImageSource,
    ) -> Result<Reply> {
        if sources.is_empty() {
            return Ok(Reply::text("Please include a roster screenshot"));
        }
        let mut ingestor = self.ingestor()?;
        if let Some(seed) = &self.config.dictionary_seed {
            ingestor.seed_dictionary(seed)?;
        }
        let reader = ScreenshotReader::new(ocr, &self.config.layout, &self.config.calibration);
        let report = ingestor.upload(alliance, sources, images, &reader)?;
        info!(
            "Upload for {}: {} recorded, {} backlogged, {} failed",
            alliance,
            report.success_count(),
            report.backlogged_count(),
            report.failure_count()
        );
        Reply::text(report.to_string()).with_data(&report)
    }

    /// Adds each name to the dictionary and the alias table, then replays its backlog.
    pub fn add_names(&self, names: &[String]) -> Result<Reply> {
        let mut ingestor = self.ingestor()?;
        let mut lines = Vec::new();
        let mut report = IngestReport::default();
        for name in names {
            let (key, created) = ingestor.resolver().add_name(name)?;
            lines.push(format!("Added '{name}' to the dictionary"));
            if created {
                info!("Player {} registered as {}", name, key);
            }
            report.merge(ingestor.replay(name, SubmitMode::Checked)?);
        }
        lines.push(report.to_string());
        Reply::text(lines.join("\n")).with_data(&report)
    }

    pub fn alias(&self, new_name: &str, old_name: &str) -> Result<Reply> {
        let mut ingestor = self.ingestor()?;
        let merged = match ingestor.resolver().merge(new_name, old_name) {
            Ok(merged) => merged,
            Err(ResolveError::PlayerNotFound(name)) => {
                return Ok(Reply::text(format!(
                    "The player \"{name}\" does not exist. Please add an alias using the format \
                     'alias <new_name> <old_name>'"
                )));
            }
            Err(ResolveError::Store(e)) => return Err(e.into()),
        };
        let text = match &merged {
            MergeResult::AliasAdded { .. } => {
                format!("Created alias {} for player {}", normalize_name(new_name), old_name)
            }
            MergeResult::AlreadyLinked { .. } => {
                format!("{} is already an alias of {}", normalize_name(new_name), old_name)
            }
            MergeResult::Collapsed { from, into, outcome } => {
                warn!("Merged player {} into {}", from, into);
                format!(
                    "Created alias {} for player {}. Merged {} aliases and {} snapshots from {} \
                     ({} snapshots on overlapping days dropped)",
                    normalize_name(new_name),
                    old_name,
                    outcome.aliases_moved,
                    outcome.snapshots_moved,
                    from,
                    outcome.snapshots_dropped
                )
            }
        };
        Ok(Reply::text(text))
    }

    /// Makes `wrong` an alias of `right` and replays `wrong`'s backlog.
    pub fn correct(&self, wrong: &str, right: &str) -> Result<Reply> {
        let mut ingestor = self.ingestor()?;
        let mut lines = Vec::new();
        let (key, created) = ingestor.resolver().find_or_allocate(right)?;
        if created {
            lines.push(format!("Registered new player {} as {}", normalize_name(right), key));
        }
        if normalize_name(wrong) != normalize_name(right) {
            ingestor.resolver().merge(wrong, right)?;
            lines.push(format!("Created alias {} for player {}", normalize_name(wrong), right));
        }
        let report = ingestor.replay(wrong, SubmitMode::Checked)?;
        lines.push(report.to_string());
        Reply::text(lines.join("\n")).with_data(&report)
    }

    /// Commits each name's backlog without the power check, registering
    /// names that are not known yet.
    pub fn confirm(&self, names: &[String]) -> Result<Reply> {
        let mut ingestor = self.ingestor()?;
        let mut report = IngestReport::default();
        for name in names {
            if self.store.find_key(&normalize_name(name))?.is_none() {
                ingestor.resolver().add_name(name)?;
            }
            report.merge(ingestor.replay(name, SubmitMode::Confirmed)?);
        }
        Reply::text(report.to_string()).with_data(&report)
    }

    pub fn status(&self, team: &str) -> Result<Reply> {
        let status = self.queries().status(team, self.today())?;
        let mut text = format!(
            "Team {} on {}: {} recorded",
            status.alliance.to_uppercase(),
            status.day,
            status.committed
        );
        if status.backlog.is_empty() {
            text.push_str("\nThe backlog is empty");
        }
        for (reason, entries) in &status.backlog {
            let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
            write!(text, "\n{} ({}): {}", reason, entries.len(), names.join(", "))?;
        }
        Reply::text(text).with_data(&status)
    }

    pub fn guess(&self, name: &str) -> Result<Reply> {
        let candidates = self.queries().guess(name)?;
        let text = if candidates.is_empty() {
            format!("No candidates found for {}", normalize_name(name))
        } else {
            let mut text = format!("Possible matches for {}:", normalize_name(name));
            for (rank, c) in candidates.iter().enumerate() {
                write!(
                    text,
                    "\n  {}. {} (Lv: {}, Power: {})",
                    rank + 1,
                    c.name,
                    c.level,
                    with_thousands(c.power)
                )?;
            }
            text
        };
        Reply::text(text).with_data(&candidates)
    }

    pub fn missing(&self, team: &str) -> Result<Reply> {
        let missing = self.queries().missing(team, self.today())?;
        let text = if missing.is_empty() {
            format!("Every recent member of {} has been recorded today", team.to_uppercase())
        } else {
            let mut text = format!("{} players not recorded today:", missing.len());
            for player in &missing {
                write!(
                    text,
                    "\n  {} (last seen {}, Power: {})",
                    player.name,
                    player.last_seen,
                    with_thousands(player.power)
                )?;
            }
            text
        };
        Reply::text(text).with_data(&missing)
    }

    /// Uses `name`, with its case, as the display name of the player it belongs to.
    pub fn set_name(&self, name: &str) -> Result<Reply> {
        let identity = match self.identity_named(name)? {
            Ok(identity) => identity,
            Err(reply) => return Ok(reply),
        };
        let display_name = name.trim();
        self.store.set_display_name(identity.key, display_name)?;
        info!("Set '{}' as the display name of {}", display_name, identity.key);
        Ok(Reply::text(format!("Set '{display_name}' as the player display name")))
    }

    pub fn player(&self, name: &str) -> Result<Reply> {
        let identity = match self.identity_named(name)? {
            Ok(identity) => identity,
            Err(reply) => return Ok(reply),
        };
        let Some(summary) = growth::player_summary(self.store, &identity, name, self.today())? else {
            return Ok(Reply::text(format!("The player {name} does not have any data.")));
        };

        let series = analysis::player_series(self.store, identity.key, &summary.title, self.today())?;
        let chart = analysis::render_chart(
            &format!("Growth of {} for this Month", summary.title),
            &[series],
            &self.charts_dir,
            &format!("player_{}.png", identity.key.0),
            &self.config.charts,
        )?;
        Ok(Reply::text(summary.to_string()).with_data(&summary)?.with_image(chart))
    }

    pub fn compare(&self, names: &[String]) -> Result<Reply> {
        let mut lines = Vec::new();
        let mut series = Vec::new();
        for name in names {
            match self.identity_named(name)? {
                Ok(identity) => series.push(analysis::player_series(
                    self.store,
                    identity.key,
                    &identity.preferred_name(),
                    self.today(),
                )?),
                Err(reply) => lines.push(reply.text),
            }
        }
        series.retain(|s| !s.points.is_empty());
        if series.is_empty() {
            lines.push("Nothing to plot".to_string());
            return Ok(Reply::text(lines.join("\n")));
        }

        let chart = analysis::render_chart(
            &format!("Growth of {} Players this Month", series.len()),
            &series,
            &self.charts_dir,
            "compare.png",
            &self.config.charts,
        )?;
        Ok(Reply::text(lines.join("\n")).with_image(chart))
    }

    pub fn alliance_chart(&self, team: &str, min_level: u32, max_level: u32) -> Result<Reply> {
        let alliance = normalize_name(team);
        let members: Vec<_> = growth::recent_members(self.store, &alliance, self.today())?
            .into_iter()
            .filter(|m| (min_level..=max_level).contains(&m.level))
            .collect();
        if members.is_empty() {
            warn!("No results found for team {}", team);
            return Ok(Reply::text(format!("No results found for team {team}")));
        }

        let mut series = Vec::with_capacity(members.len());
        for member in &members {
            let label = self
                .store
                .identity(member.key)?
                .map(|identity| identity.preferred_name())
                .unwrap_or_else(|| member.key.to_string());
            series.push(analysis::player_series(self.store, member.key, &label, self.today())?);
        }
        let chart = analysis::render_chart(
            &format!("Power of {} Players this Month", members.len()),
            &series,
            &self.charts_dir,
            &format!("alliance_{alliance}.png"),
            &self.config.charts,
        )?;
        Ok(Reply::text(format!("{} players plotted", members.len())).with_image(chart))
    }

    pub fn roster(&self, team: &str) -> Result<Reply> {
        let report = growth::roster_report(self.store, team, self.today())?;
        Reply::text(report.to_string()).with_data(&report)
    }

    pub fn reset_time(&self) -> Reply {
        Reply::text(next_reset_message(self.now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::{BacklogEntry, BacklogReason, RosterSnapshot};
    use crate::store::SqliteStore;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, 10)
            .unwrap()
            .and_hms_opt(21, 30, 0)
            .unwrap()
    }

    fn session<'a>(store: &'a SqliteStore, config: &'a BotConfig) -> Session<'a> {
        Session::new(store, config, now(), std::env::temp_dir())
    }

    fn park(store: &SqliteStore, name: &str, power: u64, reason: BacklogReason) {
        store
            .park_backlog(&BacklogEntry {
                name: name.into(),
                alliance: "lve".into(),
                day: now().date(),
                level: 12,
                power,
                reason,
            })
            .unwrap();
    }

    fn record(store: &SqliteStore, name: &str, day: NaiveDate, power: u64) {
        let key = store.find_key(name).unwrap().unwrap();
        store
            .insert_snapshot(&RosterSnapshot {
                key,
                day,
                alliance: "lve".into(),
                level: 12,
                power,
                recorded_at: day.and_hms_opt(8, 0, 0).unwrap(),
            })
            .unwrap();
    }

    #[test]
    fn test_next_reset_message() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(
            next_reset_message(day.and_hms_opt(21, 30, 0).unwrap()),
            "The next reset is in 2 hours and 31 minutes"
        );
        assert_eq!(
            next_reset_message(day.and_hms_opt(23, 50, 0).unwrap()),
            "The next reset is in 11 minutes"
        );
        assert_eq!(
            next_reset_message(day.and_hms_opt(23, 59, 30).unwrap()),
            "The next reset is in 30 seconds"
        );
    }

    #[test]
    fn test_add_name_replays_backlog_as_unconfirmed() {
        let store = SqliteStore::in_memory().unwrap();
        let config = BotConfig::default();
        park(&store, "zed", 5_000, BacklogReason::Misspelled);

        let reply = session(&store, &config).add_names(&["Zed".to_string()]).unwrap();
        assert!(reply.text.starts_with("Added 'Zed' to the dictionary"));
        assert!(store.find_key("zed").unwrap().is_some());
        assert_eq!(
            store.backlog_for("zed").unwrap()[0].reason,
            BacklogReason::NewPlayerUnconfirmed
        );
    }

    #[test]
    fn test_correct_links_and_commits() {
        let store = SqliteStore::in_memory().unwrap();
        let config = BotConfig::default();
        let key = store.allocate_identity("nova").unwrap();
        record(&store, "nova", NaiveDate::from_ymd_opt(2024, 7, 9).unwrap(), 5_000);
        park(&store, "n0va", 5_100, BacklogReason::Misspelled);

        let reply = session(&store, &config).correct("n0va", "Nova").unwrap();
        assert!(reply.text.contains("Created alias n0va for player Nova"));
        assert!(reply.text.contains("1 recorded"));
        assert_eq!(store.find_key("n0va").unwrap(), Some(key));
        assert_eq!(store.snapshot_on(key, now().date()).unwrap().unwrap().power, 5_100);
        assert!(store.backlog_for("n0va").unwrap().is_empty());
    }

    #[test]
    fn test_confirm_registers_unknown_name() {
        let store = SqliteStore::in_memory().unwrap();
        let config = BotConfig::default();
        park(&store, "vega", 98_000, BacklogReason::Misspelled);

        let reply = session(&store, &config).confirm(&["vega".to_string()]).unwrap();
        assert!(reply.text.ends_with("1 recorded, 0 waiting in the backlog, 0 failed"));
        let key = store.find_key("vega").unwrap().unwrap();
        assert_eq!(store.snapshot_on(key, now().date()).unwrap().unwrap().power, 98_000);
    }

    #[test]
    fn test_alias_for_unknown_player() {
        let store = SqliteStore::in_memory().unwrap();
        let config = BotConfig::default();
        let reply = session(&store, &config).alias("nova2", "ghost").unwrap();
        assert!(reply.text.starts_with("The player \"ghost\" does not exist"));
    }

    #[test]
    fn test_set_name_keeps_case() {
        let store = SqliteStore::in_memory().unwrap();
        let config = BotConfig::default();
        let key = store.allocate_identity("nova_prime").unwrap();

        let reply = session(&store, &config).set_name("Nova_Prime").unwrap();
        assert_eq!(reply.text, "Set 'Nova_Prime' as the player display name");
        let identity = store.identity(key).unwrap().unwrap();
        assert_eq!(identity.display_name.as_deref(), Some("Nova_Prime"));
    }

    #[test]
    fn test_status_lists_backlog() {
        let store = SqliteStore::in_memory().unwrap();
        let config = BotConfig::default();
        park(&store, "zed", 100, BacklogReason::Misspelled);
        park(&store, "amy", 100, BacklogReason::Misspelled);

        let reply = session(&store, &config).status("LVE").unwrap();
        assert!(reply.text.starts_with("Team LVE on 2024-07-10: 0 recorded"));
        assert!(reply.text.contains("misspelled (2): amy, zed"));
        let json = reply.render(true).unwrap();
        assert!(json.contains("\"committed\": 0"));
    }

    #[test]
    fn test_player_without_data() {
        let store = SqliteStore::in_memory().unwrap();
        let config = BotConfig::default();
        store.allocate_identity("nova").unwrap();
        let reply = session(&store, &config).player("Nova").unwrap();
        assert_eq!(reply.text, "The player Nova does not have any data.");
        assert!(reply.image.is_none());
    }
}
