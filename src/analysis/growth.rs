//! Player and alliance growth summaries.

use std::fmt;

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::error::StoreResult;
use crate::roster::report::with_thousands;
use crate::roster::{PlayerIdentity, PlayerKey, RosterSnapshot, normalize_name};
use crate::store::RosterStore;

/// Days of history used for growth rates.
pub const GROWTH_WINDOW_DAYS: i64 = 7;
/// A player whose power has not changed for this long is inactive.
pub const INACTIVE_AFTER_DAYS: i64 = 14;
/// A player is "seen" by alliance views if recorded within this many days.
pub const SEEN_WITHIN_DAYS: i64 = 1;

/// `1234567.0` -> `1.23M`
pub fn human_format(value: f64) -> String {
    const SUFFIXES: [&str; 6] = ["", "k", "M", "G", "T", "P"];
    let mut num = value;
    let mut magnitude = 0;
    while num.abs() >= 1000.0 && magnitude < SUFFIXES.len() - 1 {
        magnitude += 1;
        num /= 1000.0;
    }
    format!("{:.2}{}", num, SUFFIXES[magnitude])
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Growth {
    pub per_week: f64,
    /// Fraction of the oldest power in the window
    pub percent_per_week: f64,
}

impl fmt::Display for Growth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:.2}%)",
            human_format(self.per_week),
            self.percent_per_week * 100.0
        )
    }
}

/// Weekly growth over `entries` (oldest first): the power change spread over
/// the number of entries, scaled to seven days.
pub fn weekly_growth(entries: &[RosterSnapshot]) -> Option<Growth> {
    let (oldest, newest) = (entries.first()?, entries.last()?);
    if oldest.power == 0 {
        return None;
    }
    let change = newest.power as f64 - oldest.power as f64;
    let per_week = change / entries.len() as f64 * 7.0;
    Some(Growth {
        per_week,
        percent_per_week: per_week / oldest.power as f64,
    })
}

/// Most recent snapshot whose power differs from the latest one.
pub fn last_power_change(history: &[RosterSnapshot]) -> Option<&RosterSnapshot> {
    let latest = history.last()?;
    history.iter().rev().find(|s| s.power != latest.power)
}

/// Up to three other spellings of a player: the newest alias and the two
/// oldest, skipping whatever the title already shows.
fn also_known_as(identity: &PlayerIdentity, title: &str) -> Option<String> {
    let title = normalize_name(title);
    let aliases = &identity.aliases;
    let mut shown: Vec<String> = Vec::new();

    if let Some(display) = &identity.display_name {
        let display = normalize_name(display);
        if display != title {
            shown.push(display);
        }
    }
    let picks = [
        aliases.first(),
        aliases.last(),
        aliases.len().checked_sub(2).filter(|_| aliases.len() > 2).and_then(|i| aliases.get(i)),
    ];
    for alias in picks.into_iter().flatten() {
        if *alias != title && !shown.contains(alias) {
            shown.push(alias.clone());
        }
    }
    if shown.is_empty() {
        return None;
    }

    let mut text = shown.join(", ");
    let others = aliases.len().saturating_sub(shown.len() + 1);
    if aliases.len() > 4 && others > 0 {
        text.push_str(&format!("... (+{others} more)"));
    }
    Some(text)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Birthday {
    pub alliance: String,
    pub day: NaiveDate,
    pub level: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlayerSummary {
    pub key: PlayerKey,
    pub title: String,
    pub last_updated: NaiveDate,
    pub level: u32,
    pub power: u64,
    pub growth: Option<Growth>,
    pub also_known_as: Option<String>,
    pub birthday: Option<Birthday>,
}

impl fmt::Display for PlayerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n  Last Updated: {}\n  Lv: {}\n  Power: {}",
            self.title,
            self.last_updated,
            self.level,
            with_thousands(self.power)
        )?;
        if let Some(growth) = &self.growth {
            write!(f, "\n  Growth: {growth} per week")?;
        }
        if let Some(names) = &self.also_known_as {
            write!(f, "\n  Also known as: {names}")?;
        }
        if let Some(birthday) = &self.birthday {
            write!(
                f,
                "\n  {} Birthday: joined on {} when lv {}",
                birthday.alliance.to_uppercase(),
                birthday.day,
                birthday.level
            )?;
        }
        Ok(())
    }
}

/// Summary of the player `requested` resolves to, or `None` without data.
pub fn player_summary(
    store: &dyn RosterStore,
    identity: &PlayerIdentity,
    requested: &str,
    today: NaiveDate,
) -> StoreResult<Option<PlayerSummary>> {
    let history = store.snapshots_for(identity.key, None)?;
    let (Some(first), Some(latest)) = (history.first(), history.last()) else {
        return Ok(None);
    };

    let title = match &identity.display_name {
        Some(display) if normalize_name(display) == normalize_name(requested) => display.clone(),
        _ => requested.to_string(),
    };

    let window_start = today - Duration::days(GROWTH_WINDOW_DAYS);
    let recent: Vec<RosterSnapshot> = history
        .iter()
        .filter(|s| s.day >= window_start)
        .cloned()
        .collect();
    let growth = if recent.len() > 3 {
        weekly_growth(&recent)
    } else {
        None
    };

    let birthday = match store.alliance_first_day(&first.alliance)? {
        Some(founded) if first.day > founded + Duration::days(2) => Some(Birthday {
            alliance: first.alliance.clone(),
            day: first.day,
            level: first.level,
        }),
        _ => None,
    };

    Ok(Some(PlayerSummary {
        key: identity.key,
        also_known_as: also_known_as(identity, &title),
        title,
        last_updated: latest.day,
        level: latest.level,
        power: latest.power,
        growth,
        birthday,
    }))
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Activity {
    /// Too few entries this week to judge
    New { entries: usize },
    Active { growth: Growth },
    Inactive { last_change: Option<NaiveDate> },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RosterLine {
    pub key: PlayerKey,
    pub name: String,
    pub level: u32,
    pub power: u64,
    pub activity: Activity,
}

impl fmt::Display for RosterLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Name: {:<25}| Level: {:<3}| Power: {:<8}| ",
            self.name,
            self.level,
            human_format(self.power as f64)
        )?;
        match &self.activity {
            Activity::New { entries } => {
                write!(f, "Insufficient data, only {entries} entries this week")
            }
            Activity::Active { growth } => write!(f, "Active, growing {growth} per week"),
            Activity::Inactive { last_change: Some(day) } => write!(f, "Inactive, last seen {day}"),
            Activity::Inactive { last_change: None } => f.write_str("Inactive, last seen never"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RosterReport {
    pub alliance: String,
    pub lines: Vec<RosterLine>,
}

impl RosterReport {
    pub fn count(&self, pick: fn(&Activity) -> bool) -> usize {
        self.lines.iter().filter(|l| pick(&l.activity)).count()
    }

    /// Active players' weekly growth summed and divided over every player.
    pub fn average_growth(&self) -> Option<Growth> {
        if self.lines.is_empty() {
            return None;
        }
        let n = self.lines.len() as f64;
        let (total, percent) = self
            .lines
            .iter()
            .filter_map(|l| match &l.activity {
                Activity::Active { growth } => Some(growth),
                _ => None,
            })
            .fold((0.0, 0.0), |(t, p), g| (t + g.per_week, p + g.percent_per_week));
        Some(Growth {
            per_week: total / n,
            percent_per_week: percent / n,
        })
    }
}

impl fmt::Display for RosterReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(average) = self.average_growth() else {
            return write!(f, "No data has been uploaded for team {} today", self.alliance);
        };
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        writeln!(f, "Team {} Summary", self.alliance.to_uppercase())?;
        writeln!(
            f,
            "  Player Count ({}): {} Active, {} Inactive, {} New",
            self.lines.len(),
            self.count(|a| matches!(a, Activity::Active { .. })),
            self.count(|a| matches!(a, Activity::Inactive { .. })),
            self.count(|a| matches!(a, Activity::New { .. }))
        )?;
        write!(f, "  Weekly Growth: {average} per Player")
    }
}

/// Latest snapshot of every player recorded for `alliance` recently, strongest first.
pub fn recent_members(
    store: &dyn RosterStore,
    alliance: &str,
    today: NaiveDate,
) -> StoreResult<Vec<RosterSnapshot>> {
    let since = today - Duration::days(SEEN_WITHIN_DAYS);
    let mut latest: Vec<RosterSnapshot> = Vec::new();
    for snapshot in store.alliance_snapshots(alliance, since, today)?.into_iter().rev() {
        if !latest.iter().any(|s| s.key == snapshot.key) {
            latest.push(snapshot);
        }
    }
    latest.sort_by(|a, b| b.power.cmp(&a.power).then(a.key.cmp(&b.key)));
    Ok(latest)
}

pub fn classify(history: &[RosterSnapshot], today: NaiveDate) -> Activity {
    let window_start = today - Duration::days(GROWTH_WINDOW_DAYS);
    let recent: Vec<RosterSnapshot> = history
        .iter()
        .filter(|s| s.day >= window_start)
        .cloned()
        .collect();
    if recent.len() < 3 {
        return Activity::New { entries: recent.len() };
    }
    let change = last_power_change(history).map(|s| s.day);
    match (change, weekly_growth(&recent)) {
        (Some(day), Some(growth)) if day + Duration::days(INACTIVE_AFTER_DAYS) >= today => {
            Activity::Active { growth }
        }
        _ => Activity::Inactive { last_change: change },
    }
}

pub fn roster_report(
    store: &dyn RosterStore,
    alliance: &str,
    today: NaiveDate,
) -> StoreResult<RosterReport> {
    let alliance = normalize_name(alliance);
    let mut lines = Vec::new();
    for member in recent_members(store, &alliance, today)? {
        let history = store.snapshots_for(member.key, None)?;
        let name = store
            .identity(member.key)?
            .map(|identity| identity.preferred_name())
            .unwrap_or_else(|| member.key.to_string());
        lines.push(RosterLine {
            key: member.key,
            name,
            level: member.level,
            power: member.power,
            activity: classify(&history, today),
        });
    }
    Ok(RosterReport { alliance, lines })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, d).unwrap()
    }

    fn snap(key: PlayerKey, d: u32, power: u64) -> RosterSnapshot {
        RosterSnapshot {
            key,
            day: day(d),
            alliance: "lve".into(),
            level: 25,
            power,
            recorded_at: day(d).and_hms_opt(10, 0, 0).unwrap(),
        }
    }

    fn identity(aliases: &[&str], display: Option<&str>) -> PlayerIdentity {
        PlayerIdentity {
            key: PlayerKey(1),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            display_name: display.map(str::to_string),
            active: true,
            merged_into: None,
        }
    }

    #[test]
    fn test_human_format() {
        assert_eq!(human_format(999.0), "999.00");
        assert_eq!(human_format(1234.0), "1.23k");
        assert_eq!(human_format(1_234_567.0), "1.23M");
        assert_eq!(human_format(-2_500.0), "-2.50k");
    }

    #[test]
    fn test_weekly_growth() {
        let key = PlayerKey(1);
        let entries = vec![snap(key, 1, 1000), snap(key, 2, 1100), snap(key, 3, 1200), snap(key, 4, 1400)];
        let growth = weekly_growth(&entries).unwrap();
        assert_eq!(growth.per_week, 700.0);
        assert_eq!(growth.percent_per_week, 0.7);
        assert!(weekly_growth(&[]).is_none());
    }

    #[test]
    fn test_last_power_change() {
        let key = PlayerKey(1);
        let history = vec![snap(key, 1, 10), snap(key, 2, 20), snap(key, 3, 20)];
        assert_eq!(last_power_change(&history).unwrap().day, day(1));
        assert!(last_power_change(&history[1..]).is_none());
    }

    #[test]
    fn test_also_known_as() {
        let player = identity(&["nova3", "nova2", "nova1", "nova0"], None);
        assert_eq!(also_known_as(&player, "nova3").unwrap(), "nova0, nova1");
        assert_eq!(also_known_as(&identity(&["nova"], None), "Nova"), None);

        let many = identity(&["a", "b", "c", "d", "e", "f"], Some("Nova"));
        assert_eq!(also_known_as(&many, "a").unwrap(), "nova, f, e... (+2 more)");
    }

    #[test]
    fn test_classify() {
        let key = PlayerKey(1);
        let growing = vec![snap(key, 20, 100), snap(key, 22, 110), snap(key, 24, 120)];
        assert!(matches!(classify(&growing, day(25)), Activity::Active { .. }));

        let flat = vec![snap(key, 1, 90), snap(key, 20, 100), snap(key, 22, 100), snap(key, 24, 100)];
        assert_eq!(classify(&flat, day(25)), Activity::Inactive { last_change: Some(day(1)) });

        assert_eq!(classify(&growing[..2], day(25)), Activity::New { entries: 2 });
    }

    #[test]
    fn test_player_summary_reports_birthday_and_growth() {
        let store = SqliteStore::in_memory().unwrap();
        let founder = store.allocate_identity("founder").unwrap();
        let nova = store.allocate_identity("nova").unwrap();
        store.insert_snapshot(&snap(founder, 1, 500)).unwrap();
        for (d, power) in [(10, 1000), (11, 1100), (12, 1200), (13, 1400)] {
            store.insert_snapshot(&snap(nova, d, power)).unwrap();
        }

        let player = store.identity(nova).unwrap().unwrap();
        let summary = player_summary(&store, &player, "Nova", day(13)).unwrap().unwrap();
        assert_eq!(summary.power, 1400);
        assert_eq!(summary.growth.unwrap().per_week, 700.0);
        assert_eq!(summary.birthday.as_ref().unwrap().day, day(10));
        let text = summary.to_string();
        assert!(text.contains("Power: 1,400"));
        assert!(text.contains("LVE Birthday: joined on 2024-09-10 when lv 25"));

        let founder = store.identity(founder).unwrap().unwrap();
        let summary = player_summary(&store, &founder, "founder", day(13)).unwrap().unwrap();
        assert!(summary.birthday.is_none());
        assert!(summary.growth.is_none());
    }

    #[test]
    fn test_roster_report_orders_by_power() {
        let store = SqliteStore::in_memory().unwrap();
        let weak = store.allocate_identity("weak").unwrap();
        let strong = store.allocate_identity("strong").unwrap();
        let gone = store.allocate_identity("gone").unwrap();
        store.insert_snapshot(&snap(weak, 10, 100)).unwrap();
        store.insert_snapshot(&snap(strong, 9, 900)).unwrap();
        store.insert_snapshot(&snap(gone, 2, 5000)).unwrap();

        let report = roster_report(&store, "LVE", day(10)).unwrap();
        let names: Vec<&str> = report.lines.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["strong", "weak"]);
        assert!(report.to_string().contains("Player Count (2): 0 Active, 0 Inactive, 2 New"));

        let empty = roster_report(&store, "nobody", day(10)).unwrap();
        assert_eq!(empty.to_string(), "No data has been uploaded for team nobody today");
    }
}
