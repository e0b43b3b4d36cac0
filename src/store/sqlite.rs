use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use tracing::{debug, info, warn};

use super::{InsertOutcome, MergeOutcome, RosterStore};
use crate::error::{StoreError, StoreResult};
use crate::roster::{
    BacklogEntry, BacklogReason, DictionaryWord, PlayerIdentity, PlayerKey, RosterSnapshot,
};

const SCHEMA: &str = include_str!("schema.sql");
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SNAPSHOT_COLUMNS: &str = "key, day, alliance, level, power, recorded_at";
const BACKLOG_COLUMNS: &str = "name, alliance, day, level, power, reason";

impl ToSql for PlayerKey {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}

impl FromSql for PlayerKey {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(PlayerKey)
    }
}

impl ToSql for BacklogReason {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for BacklogReason {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<RosterSnapshot> {
    Ok(RosterSnapshot {
        key: row.get(0)?,
        day: row.get(1)?,
        alliance: row.get(2)?,
        level: row.get(3)?,
        power: row.get::<_, i64>(4)?.max(0) as u64,
        recorded_at: row.get(5)?,
    })
}

fn backlog_from_row(row: &Row<'_>) -> rusqlite::Result<BacklogEntry> {
    Ok(BacklogEntry {
        name: row.get(0)?,
        alliance: row.get(1)?,
        day: row.get(2)?,
        level: row.get(3)?,
        power: row.get::<_, i64>(4)?.max(0) as u64,
        reason: row.get(5)?,
    })
}

/// [`RosterStore`] backed by a single SQLite connection.
///
/// The connection sits behind a mutex so the store can be shared between
/// threads; key allocation additionally takes SQLite's write lock so separate
/// processes on the same file cannot hand out the same key either.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // Not supported by every filesystem; the default journal is fine too.
        if let Err(e) = conn.execute_batch("PRAGMA journal_mode=WAL;") {
            debug!("WAL journal unavailable for {}: {}", path.display(), e);
        }
        info!("Opened roster database at {}", path.display());
        Self::init(conn)
    }

    /// Fresh database that lives only as long as the store.
    pub fn in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a transaction open:
        // rusqlite rolls back when the Transaction is dropped during unwind.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn key_of(conn: &Connection, alias: &str) -> StoreResult<Option<PlayerKey>> {
        Ok(conn
            .query_row(
                "SELECT key FROM aliases WHERE alias = ?1",
                params![alias],
                |row| row.get(0),
            )
            .optional()?)
    }
}

impl RosterStore for SqliteStore {
    fn find_key(&self, alias: &str) -> StoreResult<Option<PlayerKey>> {
        Self::key_of(&self.conn(), alias)
    }

    fn allocate_identity(&self, alias: &str) -> StoreResult<PlayerKey> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if Self::key_of(&tx, alias)?.is_some() {
            return Err(StoreError::AliasTaken(alias.to_string()));
        }

        let key: PlayerKey = tx.query_row(
            "SELECT value FROM state WHERE name = 'next_key'",
            [],
            |row| row.get(0),
        )?;
        tx.execute("INSERT INTO identities (key, active) VALUES (?1, 1)", params![key])?;
        tx.execute(
            "INSERT INTO aliases (alias, key) VALUES (?1, ?2)",
            params![alias, key],
        )?;
        tx.execute(
            "UPDATE state SET value = value + 1 WHERE name = 'next_key'",
            [],
        )?;
        tx.commit()?;

        debug!("Allocated identity {} for alias '{}'", key, alias);
        Ok(key)
    }

    fn add_alias(&self, alias: &str, key: PlayerKey) -> StoreResult<()> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT INTO aliases (alias, key) VALUES (?1, ?2) ON CONFLICT(alias) DO NOTHING",
            params![alias, key],
        )?;
        if inserted == 0 {
            return match Self::key_of(&conn, alias)? {
                Some(existing) if existing == key => Ok(()),
                _ => Err(StoreError::AliasTaken(alias.to_string())),
            };
        }
        debug!("Added alias '{}' for {}", alias, key);
        Ok(())
    }

    fn identity(&self, key: PlayerKey) -> StoreResult<Option<PlayerIdentity>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT active, display_name, merged_into FROM identities WHERE key = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, bool>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<PlayerKey>>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((active, display_name, merged_into)) = row else {
            return Ok(None);
        };

        let mut stmt = conn.prepare("SELECT alias FROM aliases WHERE key = ?1 ORDER BY rowid DESC")?;
        let aliases = stmt
            .query_map(params![key], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(Some(PlayerIdentity {
            key,
            aliases,
            display_name,
            active,
            merged_into,
        }))
    }

    fn set_display_name(&self, key: PlayerKey, name: &str) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE identities SET display_name = ?1 WHERE key = ?2",
            params![name, key],
        )?;
        debug!("Display name of {} set to '{}'", key, name);
        Ok(())
    }

    fn set_active(&self, key: PlayerKey, active: bool) -> StoreResult<()> {
        self.conn().execute(
            "UPDATE identities SET active = ?1 WHERE key = ?2",
            params![active, key],
        )?;
        debug!("Identity {} active = {}", key, active);
        Ok(())
    }

    fn merge_identities(&self, from: PlayerKey, into: PlayerKey) -> StoreResult<MergeOutcome> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let aliases_moved = tx.execute(
            "UPDATE aliases SET key = ?1 WHERE key = ?2",
            params![into, from],
        )?;
        let snapshots_dropped = tx.execute(
            "DELETE FROM snapshots WHERE key = ?2 \
             AND day IN (SELECT day FROM snapshots WHERE key = ?1)",
            params![into, from],
        )?;
        let snapshots_moved = tx.execute(
            "UPDATE snapshots SET key = ?1 WHERE key = ?2",
            params![into, from],
        )?;
        tx.execute(
            "UPDATE identities SET active = 0, merged_into = ?1 WHERE key = ?2",
            params![into, from],
        )?;
        tx.commit()?;

        let outcome = MergeOutcome {
            aliases_moved,
            snapshots_moved,
            snapshots_dropped,
        };
        warn!(
            "Merged identity {} into {}: {} aliases and {} snapshots moved, {} conflicting snapshots dropped",
            from, into, aliases_moved, snapshots_moved, snapshots_dropped
        );
        Ok(outcome)
    }

    fn dictionary_words(&self) -> StoreResult<Vec<DictionaryWord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT word, occurrences FROM dictionary ORDER BY word")?;
        let words = stmt
            .query_map([], |row| {
                Ok(DictionaryWord {
                    word: row.get(0)?,
                    occurrences: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(words)
    }

    fn add_dictionary_word(&self, word: &str) -> StoreResult<()> {
        self.conn().execute(
            "INSERT INTO dictionary (word, occurrences) VALUES (?1, 1) \
             ON CONFLICT(word) DO UPDATE SET occurrences = occurrences + 1",
            params![word],
        )?;
        debug!("Dictionary word '{}' recorded", word);
        Ok(())
    }

    fn snapshot_on(&self, key: PlayerKey, day: NaiveDate) -> StoreResult<Option<RosterSnapshot>> {
        let sql = format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE key = ?1 AND day = ?2");
        Ok(self
            .conn()
            .query_row(&sql, params![key, day], snapshot_from_row)
            .optional()?)
    }

    fn latest_snapshot_before(
        &self,
        key: PlayerKey,
        day: NaiveDate,
    ) -> StoreResult<Option<RosterSnapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE key = ?1 AND day < ?2 \
             ORDER BY day DESC LIMIT 1"
        );
        Ok(self
            .conn()
            .query_row(&sql, params![key, day], snapshot_from_row)
            .optional()?)
    }

    fn insert_snapshot(&self, snapshot: &RosterSnapshot) -> StoreResult<InsertOutcome> {
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO snapshots (key, day, alliance, level, power, recorded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                snapshot.key,
                snapshot.day,
                snapshot.alliance,
                snapshot.level,
                snapshot.power as i64,
                snapshot.recorded_at,
            ],
        )?;
        if inserted == 0 {
            debug!("Snapshot for {} on {} already present", snapshot.key, snapshot.day);
            return Ok(InsertOutcome::AlreadyPresent);
        }
        debug!(
            "Inserted snapshot {} {} {} lv {} power {}",
            snapshot.key, snapshot.day, snapshot.alliance, snapshot.level, snapshot.power
        );
        Ok(InsertOutcome::Inserted)
    }

    fn snapshots_for(
        &self,
        key: PlayerKey,
        since: Option<NaiveDate>,
    ) -> StoreResult<Vec<RosterSnapshot>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE key = ?1 AND (?2 IS NULL OR day >= ?2) \
             ORDER BY day"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![key, since], snapshot_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn alliance_snapshots(
        &self,
        alliance: &str,
        since: NaiveDate,
        until: NaiveDate,
    ) -> StoreResult<Vec<RosterSnapshot>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM snapshots \
             WHERE alliance = ?1 AND day >= ?2 AND day <= ?3 ORDER BY day, key"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![alliance, since, until], snapshot_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn count_snapshots(&self, alliance: &str, day: NaiveDate) -> StoreResult<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM snapshots WHERE alliance = ?1 AND day = ?2",
            params![alliance, day],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    fn alliance_first_day(&self, alliance: &str) -> StoreResult<Option<NaiveDate>> {
        Ok(self.conn().query_row(
            "SELECT MIN(day) FROM snapshots WHERE alliance = ?1",
            params![alliance],
            |row| row.get(0),
        )?)
    }

    fn park_backlog(&self, entry: &BacklogEntry) -> StoreResult<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO backlog (name, alliance, day, level, power, reason) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.name,
                entry.alliance,
                entry.day,
                entry.level,
                entry.power as i64,
                entry.reason,
            ],
        )?;
        debug!(
            "Parked '{}' ({} {}) as {}",
            entry.name, entry.alliance, entry.day, entry.reason
        );
        Ok(())
    }

    fn remove_backlog_entry(&self, name: &str, alliance: &str, day: NaiveDate) -> StoreResult<bool> {
        let removed = self.conn().execute(
            "DELETE FROM backlog WHERE name = ?1 AND alliance = ?2 AND day = ?3",
            params![name, alliance, day],
        )?;
        debug!("Removed backlog entry '{}' ({} {}): {}", name, alliance, day, removed);
        Ok(removed > 0)
    }

    fn backlog_for(&self, name: &str) -> StoreResult<Vec<BacklogEntry>> {
        let conn = self.conn();
        let sql = format!("SELECT {BACKLOG_COLUMNS} FROM backlog WHERE name = ?1 ORDER BY day");
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params![name], backlog_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn list_backlog(&self, alliance: &str, day: NaiveDate) -> StoreResult<Vec<BacklogEntry>> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {BACKLOG_COLUMNS} FROM backlog WHERE alliance = ?1 AND day = ?2 ORDER BY name"
        );
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params![alliance, day], backlog_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn prune_backlog(&self, before: NaiveDate) -> StoreResult<usize> {
        let removed = self
            .conn()
            .execute("DELETE FROM backlog WHERE day < ?1", params![before])?;
        info!("Pruned {} backlog entries older than {}", removed, before);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn snapshot(key: PlayerKey, d: u32, power: u64) -> RosterSnapshot {
        RosterSnapshot {
            key,
            day: day(d),
            alliance: "lve".into(),
            level: 30,
            power,
            recorded_at: day(d).and_hms_opt(12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_allocate_is_sequential_and_registers_alias() {
        let store = SqliteStore::in_memory().unwrap();
        let a = store.allocate_identity("nova").unwrap();
        let b = store.allocate_identity("vega").unwrap();
        assert_eq!(b.0, a.0 + 1);
        assert_eq!(store.find_key("nova").unwrap(), Some(a));
        assert!(matches!(
            store.allocate_identity("nova"),
            Err(StoreError::AliasTaken(_))
        ));
    }

    #[test]
    fn test_concurrent_allocation_never_duplicates_keys() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    (0..25)
                        .map(|i| store.allocate_identity(&format!("p{t}_{i}")).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let keys: Vec<PlayerKey> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let unique: HashSet<_> = keys.iter().copied().collect();
        assert_eq!(keys.len(), 200);
        assert_eq!(unique.len(), 200);
    }

    #[test]
    fn test_concurrent_allocation_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.db");
        SqliteStore::open(&path).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let path = path.clone();
                thread::spawn(move || {
                    let store = SqliteStore::open(&path).unwrap();
                    (0..10)
                        .map(|i| store.allocate_identity(&format!("c{t}_{i}")).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let keys: HashSet<PlayerKey> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(keys.len(), 40);
    }

    #[test]
    fn test_duplicate_snapshot_rejected() {
        let store = SqliteStore::in_memory().unwrap();
        let key = store.allocate_identity("nova").unwrap();
        assert_eq!(
            store.insert_snapshot(&snapshot(key, 5, 1000)).unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            store.insert_snapshot(&snapshot(key, 5, 2000)).unwrap(),
            InsertOutcome::AlreadyPresent
        );
        let rows = store.snapshots_for(key, None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].power, 1000);
    }

    #[test]
    fn test_latest_snapshot_before_excludes_same_day() {
        let store = SqliteStore::in_memory().unwrap();
        let key = store.allocate_identity("nova").unwrap();
        store.insert_snapshot(&snapshot(key, 1, 100)).unwrap();
        store.insert_snapshot(&snapshot(key, 3, 300)).unwrap();
        store.insert_snapshot(&snapshot(key, 4, 400)).unwrap();

        let prior = store.latest_snapshot_before(key, day(4)).unwrap().unwrap();
        assert_eq!(prior.power, 300);
        assert!(store.latest_snapshot_before(key, day(1)).unwrap().is_none());
    }

    #[test]
    fn test_merge_rekeys_snapshots_and_deactivates_source() {
        let store = SqliteStore::in_memory().unwrap();
        let old = store.allocate_identity("nova").unwrap();
        let other = store.allocate_identity("n0va").unwrap();
        store.add_alias("novaa", other).unwrap();
        store.insert_snapshot(&snapshot(old, 1, 100)).unwrap();
        store.insert_snapshot(&snapshot(other, 1, 101)).unwrap();
        store.insert_snapshot(&snapshot(other, 2, 110)).unwrap();
        store.insert_snapshot(&snapshot(other, 3, 120)).unwrap();

        let outcome = store.merge_identities(other, old).unwrap();
        assert_eq!(
            outcome,
            MergeOutcome {
                aliases_moved: 2,
                snapshots_moved: 2,
                snapshots_dropped: 1,
            }
        );

        let rows = store.snapshots_for(old, None).unwrap();
        assert_eq!(rows.iter().map(|s| s.power).collect::<Vec<_>>(), vec![100, 110, 120]);
        assert!(store.snapshots_for(other, None).unwrap().is_empty());
        assert_eq!(store.find_key("n0va").unwrap(), Some(old));
        assert_eq!(store.find_key("novaa").unwrap(), Some(old));

        let absorbed = store.identity(other).unwrap().unwrap();
        assert!(!absorbed.active);
        assert_eq!(absorbed.merged_into, Some(old));
        assert!(absorbed.aliases.is_empty());
    }

    #[test]
    fn test_add_alias_conflicts() {
        let store = SqliteStore::in_memory().unwrap();
        let a = store.allocate_identity("nova").unwrap();
        let b = store.allocate_identity("vega").unwrap();
        store.add_alias("nova", a).unwrap();
        assert!(matches!(store.add_alias("nova", b), Err(StoreError::AliasTaken(_))));
    }

    #[test]
    fn test_identity_lists_newest_alias_first() {
        let store = SqliteStore::in_memory().unwrap();
        let key = store.allocate_identity("nova").unwrap();
        store.add_alias("nova_prime", key).unwrap();
        store.set_display_name(key, "Nova_Prime").unwrap();
        let identity = store.identity(key).unwrap().unwrap();
        assert_eq!(identity.aliases, vec!["nova_prime", "nova"]);
        assert_eq!(identity.display_name.as_deref(), Some("Nova_Prime"));
        assert!(identity.active);
    }

    #[test]
    fn test_backlog_park_replaces_and_remove_deletes_one_entry() {
        let store = SqliteStore::in_memory().unwrap();
        let mut entry = BacklogEntry {
            name: "n0va".into(),
            alliance: "lve".into(),
            day: day(5),
            level: 30,
            power: 1000,
            reason: BacklogReason::Misspelled,
        };
        store.park_backlog(&entry).unwrap();
        entry.power = 1200;
        entry.reason = BacklogReason::SuspiciousPowerJump;
        store.park_backlog(&entry).unwrap();

        let listed = store.list_backlog("lve", day(5)).unwrap();
        assert_eq!(listed, vec![entry.clone()]);

        let mut other_day = entry.clone();
        other_day.day = day(6);
        store.park_backlog(&other_day).unwrap();

        assert!(store.remove_backlog_entry("n0va", "lve", day(5)).unwrap());
        assert!(!store.remove_backlog_entry("n0va", "lve", day(5)).unwrap());
        assert_eq!(store.backlog_for("n0va").unwrap(), vec![other_day]);
    }

    #[test]
    fn test_prune_backlog_keeps_recent_entries() {
        let store = SqliteStore::in_memory().unwrap();
        for (name, d) in [("old", 1), ("new", 9)] {
            store
                .park_backlog(&BacklogEntry {
                    name: name.into(),
                    alliance: "lve".into(),
                    day: day(d),
                    level: 1,
                    power: 1,
                    reason: BacklogReason::Misspelled,
                })
                .unwrap();
        }
        assert_eq!(store.prune_backlog(day(5)).unwrap(), 1);
        assert!(store.backlog_for("old").unwrap().is_empty());
        assert_eq!(store.backlog_for("new").unwrap().len(), 1);
    }

    #[test]
    fn test_dictionary_counts_occurrences() {
        let store = SqliteStore::in_memory().unwrap();
        store.add_dictionary_word("nova").unwrap();
        store.add_dictionary_word("nova").unwrap();
        store.add_dictionary_word("vega").unwrap();
        let words = store.dictionary_words().unwrap();
        assert_eq!(
            words,
            vec![
                DictionaryWord { word: "nova".into(), occurrences: 2 },
                DictionaryWord { word: "vega".into(), occurrences: 1 },
            ]
        );
    }

    #[test]
    fn test_alliance_queries() {
        let store = SqliteStore::in_memory().unwrap();
        let key = store.allocate_identity("nova").unwrap();
        store.insert_snapshot(&snapshot(key, 2, 100)).unwrap();
        store.insert_snapshot(&snapshot(key, 6, 200)).unwrap();

        assert_eq!(store.alliance_first_day("lve").unwrap(), Some(day(2)));
        assert_eq!(store.alliance_first_day("other").unwrap(), None);
        assert_eq!(store.count_snapshots("lve", day(6)).unwrap(), 1);
        assert_eq!(store.alliance_snapshots("lve", day(3), day(6)).unwrap().len(), 1);
        assert_eq!(store.snapshots_for(key, Some(day(3))).unwrap().len(), 1);
    }
}
