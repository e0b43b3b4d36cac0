//! Read-only lookups that help an operator clear the backlog.

use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use super::backlog::BacklogReconciler;
use super::{BacklogEntry, BacklogReason, PlayerKey, RosterSnapshot, normalize_name};
use crate::config::LookupConfig;
use crate::error::StoreResult;
use crate::store::RosterStore;

/// A known player that a backlogged name might belong to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GuessCandidate {
    pub key: PlayerKey,
    pub name: String,
    pub level: u32,
    pub power: u64,
    pub level_diff: u32,
    pub power_diff: u64,
}

/// A player seen recently in the alliance but not on `day`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MissingPlayer {
    pub key: PlayerKey,
    pub name: String,
    pub last_seen: NaiveDate,
    pub power: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AllianceStatus {
    pub alliance: String,
    pub day: NaiveDate,
    pub committed: usize,
    pub backlog: BTreeMap<BacklogReason, Vec<BacklogEntry>>,
}

pub struct RosterQueries<'a> {
    store: &'a dyn RosterStore,
    config: &'a LookupConfig,
}

/// Latest snapshot per identity, in key order.
fn latest_per_key(snapshots: Vec<RosterSnapshot>) -> Vec<RosterSnapshot> {
    let mut latest: HashMap<PlayerKey, RosterSnapshot> = HashMap::new();
    for snapshot in snapshots {
        match latest.get(&snapshot.key) {
            Some(seen) if seen.day >= snapshot.day => {}
            _ => {
                latest.insert(snapshot.key, snapshot);
            }
        }
    }
    let mut rows: Vec<RosterSnapshot> = latest.into_values().collect();
    rows.sort_by_key(|s| s.key);
    rows
}

impl<'a> RosterQueries<'a> {
    pub fn new(store: &'a dyn RosterStore, config: &'a LookupConfig) -> Self {
        Self { store, config }
    }

    /// First day of the `window_days`-day window ending on `day` (both ends included).
    fn window_start(&self, day: NaiveDate) -> NaiveDate {
        day - Duration::days((self.config.window_days - 1).max(0))
    }

    fn name_of(&self, key: PlayerKey) -> StoreResult<String> {
        Ok(self
            .store
            .identity(key)?
            .map(|identity| identity.preferred_name())
            .unwrap_or_else(|| key.to_string()))
    }

    /// Ranks recently seen players of the same alliance by how closely their
    /// level and power match `name`'s backlog entries.
    pub fn guess(&self, name: &str) -> StoreResult<Vec<GuessCandidate>> {
        let entries = self.store.backlog_for(&normalize_name(name))?;
        let mut best: HashMap<PlayerKey, GuessCandidate> = HashMap::new();

        for entry in &entries {
            let recent = self.store.alliance_snapshots(
                &entry.alliance,
                self.window_start(entry.day),
                entry.day,
            )?;
            for snapshot in latest_per_key(recent) {
                let candidate = GuessCandidate {
                    key: snapshot.key,
                    name: self.name_of(snapshot.key)?,
                    level: snapshot.level,
                    power: snapshot.power,
                    level_diff: snapshot.level.abs_diff(entry.level),
                    power_diff: snapshot.power.abs_diff(entry.power),
                };
                let closer = best
                    .get(&candidate.key)
                    .is_none_or(|seen| (candidate.level_diff, candidate.power_diff) < (seen.level_diff, seen.power_diff));
                if closer {
                    best.insert(candidate.key, candidate);
                }
            }
        }

        let mut ranked: Vec<GuessCandidate> = best.into_values().collect();
        ranked.sort_by(|a, b| {
            a.level_diff
                .cmp(&b.level_diff)
                .then(a.power_diff.cmp(&b.power_diff))
                .then(a.key.cmp(&b.key))
        });
        ranked.truncate(self.config.guess_limit);
        Ok(ranked)
    }

    /// Players with an alliance snapshot in the window before `day` but none
    /// on `day` itself, strongest first.
    pub fn missing(&self, alliance: &str, day: NaiveDate) -> StoreResult<Vec<MissingPlayer>> {
        let alliance = normalize_name(alliance);
        let recent = self
            .store
            .alliance_snapshots(&alliance, self.window_start(day), day)?;

        let mut missing = Vec::new();
        for snapshot in latest_per_key(recent) {
            if self.store.snapshot_on(snapshot.key, day)?.is_some() {
                continue;
            }
            let active = self
                .store
                .identity(snapshot.key)?
                .is_some_and(|identity| identity.active);
            if !active {
                continue;
            }
            missing.push(MissingPlayer {
                key: snapshot.key,
                name: self.name_of(snapshot.key)?,
                last_seen: snapshot.day,
                power: snapshot.power,
            });
        }
        missing.sort_by(|a, b| b.power.cmp(&a.power).then(a.key.cmp(&b.key)));
        Ok(missing)
    }

    pub fn status(&self, alliance: &str, day: NaiveDate) -> StoreResult<AllianceStatus> {
        let alliance = normalize_name(alliance);
        Ok(AllianceStatus {
            committed: self.store.count_snapshots(&alliance, day)?,
            backlog: BacklogReconciler::new(self.store).list(&alliance, day)?,
            alliance,
            day,
        })
    }
}
