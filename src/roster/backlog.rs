use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::info;

use super::{BacklogEntry, BacklogReason, normalize_name};
use crate::error::StoreResult;
use crate::store::RosterStore;

/// Holding area for rows that could not be committed without an operator.
pub struct BacklogReconciler<'a> {
    store: &'a dyn RosterStore,
}

impl<'a> BacklogReconciler<'a> {
    pub fn new(store: &'a dyn RosterStore) -> Self {
        Self { store }
    }

    /// Stores the entry; a second park for the same name, alliance and day replaces it.
    pub fn park(&self, entry: &BacklogEntry) -> StoreResult<()> {
        info!(
            "Backlogged {} ({}, lv {}, power {}) as {}",
            entry.name, entry.alliance, entry.level, entry.power, entry.reason
        );
        self.store.park_backlog(entry)
    }

    /// Entries for `name`, oldest day first.
    pub fn pending(&self, name: &str) -> StoreResult<Vec<BacklogEntry>> {
        self.store.backlog_for(&normalize_name(name))
    }

    pub fn remove(&self, entry: &BacklogEntry) -> StoreResult<()> {
        self.store
            .remove_backlog_entry(&entry.name, &entry.alliance, entry.day)?;
        Ok(())
    }

    /// Entries for one alliance and day, grouped by reason.
    pub fn list(
        &self,
        alliance: &str,
        day: NaiveDate,
    ) -> StoreResult<BTreeMap<BacklogReason, Vec<BacklogEntry>>> {
        let mut grouped: BTreeMap<BacklogReason, Vec<BacklogEntry>> = BTreeMap::new();
        for entry in self.store.list_backlog(&normalize_name(alliance), day)? {
            grouped.entry(entry.reason).or_default().push(entry);
        }
        Ok(grouped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    fn entry(name: &str, reason: BacklogReason) -> BacklogEntry {
        BacklogEntry {
            name: name.into(),
            alliance: "lve".into(),
            day: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            level: 10,
            power: 5000,
            reason,
        }
    }

    #[test]
    fn test_list_groups_by_reason() {
        let store = SqliteStore::in_memory().unwrap();
        let backlog = BacklogReconciler::new(&store);
        backlog.park(&entry("zed", BacklogReason::Misspelled)).unwrap();
        backlog.park(&entry("amy", BacklogReason::Misspelled)).unwrap();
        backlog.park(&entry("rex", BacklogReason::NewPlayerUnconfirmed)).unwrap();

        let grouped = backlog
            .list("LVE", NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
            .unwrap();
        assert_eq!(grouped.len(), 2);
        let names: Vec<&str> = grouped[&BacklogReason::Misspelled]
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["amy", "zed"]);
        assert!(!grouped.contains_key(&BacklogReason::SuspiciousPowerJump));
    }

    #[test]
    fn test_repark_overwrites() {
        let store = SqliteStore::in_memory().unwrap();
        let backlog = BacklogReconciler::new(&store);
        backlog.park(&entry("zed", BacklogReason::Misspelled)).unwrap();
        backlog.park(&entry("zed", BacklogReason::SuspiciousPowerJump)).unwrap();

        let pending = backlog.pending("Zed").unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].reason, BacklogReason::SuspiciousPowerJump);
        backlog.remove(&pending[0]).unwrap();
        assert!(backlog.pending("zed").unwrap().is_empty());
    }
}
