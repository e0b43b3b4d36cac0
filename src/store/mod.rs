//! Persistence for identities, snapshots, backlog and dictionary.
//!
//! Only this module talks to the database. The rest of the crate goes through
//! [`RosterStore`], which keeps the pipeline testable against an in-memory store.

mod sqlite;

pub use sqlite::SqliteStore;

use chrono::NaiveDate;

use crate::error::StoreResult;
use crate::roster::{BacklogEntry, DictionaryWord, PlayerIdentity, PlayerKey, RosterSnapshot};

/// Result of inserting a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A snapshot for the same player and day already exists; nothing was written
    AlreadyPresent,
}

/// What an alias-collapse merge changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub aliases_moved: usize,
    pub snapshots_moved: usize,
    /// Snapshots of the absorbed identity on days the target already had
    pub snapshots_dropped: usize,
}

pub trait RosterStore: Send + Sync {
    // Identities and aliases

    fn find_key(&self, alias: &str) -> StoreResult<Option<PlayerKey>>;

    /// Allocates the next key and registers `alias` for it, atomically with
    /// respect to every other allocation.
    fn allocate_identity(&self, alias: &str) -> StoreResult<PlayerKey>;

    fn add_alias(&self, alias: &str, key: PlayerKey) -> StoreResult<()>;

    fn identity(&self, key: PlayerKey) -> StoreResult<Option<PlayerIdentity>>;

    fn set_display_name(&self, key: PlayerKey, name: &str) -> StoreResult<()>;

    fn set_active(&self, key: PlayerKey, active: bool) -> StoreResult<()>;

    /// Moves every alias and snapshot of `from` onto `into` and deactivates `from`.
    fn merge_identities(&self, from: PlayerKey, into: PlayerKey) -> StoreResult<MergeOutcome>;

    // Dictionary

    fn dictionary_words(&self) -> StoreResult<Vec<DictionaryWord>>;

    /// Adds `word` or bumps its occurrence count.
    fn add_dictionary_word(&self, word: &str) -> StoreResult<()>;

    // Snapshots

    fn snapshot_on(&self, key: PlayerKey, day: NaiveDate) -> StoreResult<Option<RosterSnapshot>>;

    /// Most recent snapshot strictly before `day`.
    fn latest_snapshot_before(
        &self,
        key: PlayerKey,
        day: NaiveDate,
    ) -> StoreResult<Option<RosterSnapshot>>;

    fn insert_snapshot(&self, snapshot: &RosterSnapshot) -> StoreResult<InsertOutcome>;

    /// Snapshots of one player, oldest first, optionally from `since` onwards.
    fn snapshots_for(
        &self,
        key: PlayerKey,
        since: Option<NaiveDate>,
    ) -> StoreResult<Vec<RosterSnapshot>>;

    /// Snapshots recorded for `alliance` with `since <= day <= until`, oldest first.
    fn alliance_snapshots(
        &self,
        alliance: &str,
        since: NaiveDate,
        until: NaiveDate,
    ) -> StoreResult<Vec<RosterSnapshot>>;

    fn count_snapshots(&self, alliance: &str, day: NaiveDate) -> StoreResult<usize>;

    /// Day of the first snapshot ever recorded for `alliance`.
    fn alliance_first_day(&self, alliance: &str) -> StoreResult<Option<NaiveDate>>;

    // Backlog

    /// Stores `entry`, replacing any entry with the same name, alliance and day.
    fn park_backlog(&self, entry: &BacklogEntry) -> StoreResult<()>;

    /// Deletes the entry for `name` on `alliance` and `day`; returns whether one existed.
    fn remove_backlog_entry(&self, name: &str, alliance: &str, day: NaiveDate) -> StoreResult<bool>;

    fn backlog_for(&self, name: &str) -> StoreResult<Vec<BacklogEntry>>;

    fn list_backlog(&self, alliance: &str, day: NaiveDate) -> StoreResult<Vec<BacklogEntry>>;

    /// Deletes entries older than `before`; returns how many were removed.
    fn prune_backlog(&self, before: NaiveDate) -> StoreResult<usize>;
}
