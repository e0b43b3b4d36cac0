//! Name to identity resolution.
//!
//! The alias table answers exact lookups; the dictionary supplies fuzzy
//! corrections. A correction only counts as a match if the corrected spelling
//! is itself an alias, so adding a dictionary word and adding an alias stay
//! separate operator actions.

use tracing::{debug, info};

use super::dictionary::Dictionary;
use super::{PlayerKey, normalize_name};
use crate::error::{ResolveError, StoreError, StoreResult};
use crate::store::{MergeOutcome, RosterStore};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Spelling (possibly corrected) is a known alias
    Matched {
        key: PlayerKey,
        spelling: String,
        corrected: bool,
    },
    /// Spelling is a dictionary word no identity owns yet
    Unlinked { spelling: String },
    Unrecognized,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeResult {
    /// The new spelling was unknown and now points at the target
    AliasAdded { key: PlayerKey },
    /// The new spelling already pointed at the target
    AlreadyLinked { key: PlayerKey },
    /// The new spelling belonged to another identity, which was absorbed
    Collapsed {
        from: PlayerKey,
        into: PlayerKey,
        outcome: MergeOutcome,
    },
}

pub struct NameResolver<'a> {
    store: &'a dyn RosterStore,
    dictionary: Dictionary,
    max_distance: usize,
}

impl<'a> NameResolver<'a> {
    pub fn new(store: &'a dyn RosterStore, max_distance: usize) -> StoreResult<Self> {
        let dictionary = Dictionary::load(store)?;
        debug!("Loaded {} dictionary words", dictionary.len());
        Ok(Self {
            store,
            dictionary,
            max_distance,
        })
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn resolve(&self, raw: &str) -> StoreResult<Resolution> {
        let name = normalize_name(raw);
        if let Some(key) = self.store.find_key(&name)? {
            return Ok(Resolution::Matched {
                key,
                spelling: name,
                corrected: false,
            });
        }

        let Some(spelling) = self.dictionary.correction(&name, self.max_distance) else {
            debug!("'{}' is not in the dictionary", name);
            return Ok(Resolution::Unrecognized);
        };
        let spelling = spelling.to_string();

        match self.store.find_key(&spelling)? {
            Some(key) => {
                if spelling != name {
                    info!("Corrected '{}' to '{}'", name, spelling);
                }
                Ok(Resolution::Matched {
                    key,
                    corrected: spelling != name,
                    spelling,
                })
            }
            None => Ok(Resolution::Unlinked { spelling }),
        }
    }

    /// Exact alias lookup for operator commands.
    pub fn resolve_exact(&self, name: &str) -> Result<PlayerKey, ResolveError> {
        let name = normalize_name(name);
        self.store
            .find_key(&name)?
            .ok_or(ResolveError::PlayerNotFound(name))
    }

    pub fn allocate(&self, name: &str) -> StoreResult<PlayerKey> {
        let name = normalize_name(name);
        let key = self.store.allocate_identity(&name)?;
        info!("Registered new player '{}' as {}", name, key);
        Ok(key)
    }

    /// Adds `word` to the dictionary, persisted and in this resolver's copy.
    pub fn learn(&mut self, word: &str) -> StoreResult<()> {
        let word = normalize_name(word);
        self.store.add_dictionary_word(&word)?;
        self.dictionary.insert(&word);
        Ok(())
    }

    /// Key of `name`, allocating a new identity if no alias matches.
    /// Returns the key and whether it is new.
    pub fn find_or_allocate(&self, name: &str) -> StoreResult<(PlayerKey, bool)> {
        let name = normalize_name(name);
        if let Some(key) = self.store.find_key(&name)? {
            return Ok((key, false));
        }
        match self.allocate(&name) {
            Ok(key) => Ok((key, true)),
            // Lost a race with another allocation of the same name
            Err(StoreError::AliasTaken(_)) => self
                .store
                .find_key(&name)?
                .map(|key| (key, false))
                .ok_or(StoreError::AliasTaken(name)),
            Err(e) => Err(e),
        }
    }

    /// Dictionary word plus identity. Returns the key and whether it is new.
    pub fn add_name(&mut self, name: &str) -> StoreResult<(PlayerKey, bool)> {
        self.learn(name)?;
        self.find_or_allocate(name)
    }

    /// Makes `new_name` an alias of the identity `old_name` resolves to.
    ///
    /// If `new_name` already belongs to another identity, that identity's
    /// aliases and snapshots are moved onto the target and it is deactivated.
    /// This cannot be undone.
    pub fn merge(&mut self, new_name: &str, old_name: &str) -> Result<MergeResult, ResolveError> {
        let target = self.resolve_exact(old_name)?;
        let new_name = normalize_name(new_name);

        let result = match self.store.find_key(&new_name)? {
            None => {
                self.store.add_alias(&new_name, target)?;
                MergeResult::AliasAdded { key: target }
            }
            Some(key) if key == target => MergeResult::AlreadyLinked { key },
            Some(other) => {
                let outcome = self.store.merge_identities(other, target)?;
                MergeResult::Collapsed {
                    from: other,
                    into: target,
                    outcome,
                }
            }
        };
        self.learn(&new_name)?;

        info!("Created alias {} for player {}", new_name, normalize_name(old_name));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::RosterSnapshot;
    use crate::store::SqliteStore;
    use chrono::NaiveDate;

    fn snapshot(key: PlayerKey, d: u32, power: u64) -> RosterSnapshot {
        let day = NaiveDate::from_ymd_opt(2024, 5, d).unwrap();
        RosterSnapshot {
            key,
            day,
            alliance: "lve".into(),
            level: 20,
            power,
            recorded_at: day.and_hms_opt(9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_exact_alias_match_is_case_insensitive() {
        let store = SqliteStore::in_memory().unwrap();
        let key = store.allocate_identity("nova_prime").unwrap();
        let resolver = NameResolver::new(&store, 2).unwrap();
        assert_eq!(
            resolver.resolve("Nova_Prime").unwrap(),
            Resolution::Matched { key, spelling: "nova_prime".into(), corrected: false }
        );
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let store = SqliteStore::in_memory().unwrap();
        store.allocate_identity("nova_prime").unwrap();
        store.add_dictionary_word("nova_prime").unwrap();
        let resolver = NameResolver::new(&store, 2).unwrap();

        let first = resolver.resolve("N0va_Prime").unwrap();
        let second = resolver.resolve("N0va_Prime").unwrap();
        assert_eq!(first, second);
        assert!(matches!(first, Resolution::Matched { corrected: true, .. }));
    }

    #[test]
    fn test_dictionary_word_without_alias_is_unlinked() {
        let store = SqliteStore::in_memory().unwrap();
        store.add_dictionary_word("vega").unwrap();
        let resolver = NameResolver::new(&store, 2).unwrap();
        assert_eq!(
            resolver.resolve("Vegaa").unwrap(),
            Resolution::Unlinked { spelling: "vega".into() }
        );
        assert!(store.find_key("vega").unwrap().is_none());
    }

    #[test]
    fn test_unknown_name_is_unrecognized() {
        let store = SqliteStore::in_memory().unwrap();
        let resolver = NameResolver::new(&store, 2).unwrap();
        assert_eq!(resolver.resolve("Zed").unwrap(), Resolution::Unrecognized);
    }

    #[test]
    fn test_merge_unknown_name_adds_alias() {
        let store = SqliteStore::in_memory().unwrap();
        let key = store.allocate_identity("nova").unwrap();
        let mut resolver = NameResolver::new(&store, 2).unwrap();

        let result = resolver.merge("Nova_Prime", "NOVA").unwrap();
        assert_eq!(result, MergeResult::AliasAdded { key });
        assert_eq!(store.find_key("nova_prime").unwrap(), Some(key));
        assert!(resolver.dictionary().contains("nova_prime"));
    }

    #[test]
    fn test_merge_requires_known_target() {
        let store = SqliteStore::in_memory().unwrap();
        let mut resolver = NameResolver::new(&store, 2).unwrap();
        assert!(matches!(
            resolver.merge("nova", "ghost"),
            Err(ResolveError::PlayerNotFound(name)) if name == "ghost"
        ));
    }

    #[test]
    fn test_merge_collapses_other_identity() {
        let store = SqliteStore::in_memory().unwrap();
        let old = store.allocate_identity("nova").unwrap();
        let other = store.allocate_identity("n0va").unwrap();
        store.insert_snapshot(&snapshot(other, 1, 100)).unwrap();
        store.insert_snapshot(&snapshot(other, 2, 105)).unwrap();
        let mut resolver = NameResolver::new(&store, 2).unwrap();

        let result = resolver.merge("n0va", "nova").unwrap();
        assert!(matches!(result, MergeResult::Collapsed { from, into, .. } if from == other && into == old));

        let keys: Vec<PlayerKey> = store
            .snapshots_for(old, None)
            .unwrap()
            .iter()
            .map(|s| s.key)
            .collect();
        assert_eq!(keys, vec![old, old]);
        assert_eq!(resolver.resolve("n0va").unwrap(), Resolution::Matched {
            key: old,
            spelling: "n0va".into(),
            corrected: false,
        });
        assert!(!store.identity(other).unwrap().unwrap().active);
    }

    #[test]
    fn test_add_name_reuses_existing_identity() {
        let store = SqliteStore::in_memory().unwrap();
        let mut resolver = NameResolver::new(&store, 2).unwrap();
        let (first, created) = resolver.add_name("Rex").unwrap();
        assert!(created);
        let (second, created) = resolver.add_name("rex").unwrap();
        assert!(!created);
        assert_eq!(first, second);
    }
}
