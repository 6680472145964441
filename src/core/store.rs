// src/core/store.rs

//! The in-memory store: the authoritative, synchronously readable state of
//! every declared collection.
//!
//! All access goes through a `parking_lot::RwLock` that is only ever held for
//! the duration of a copy or a mutation, never across an `.await`. Every
//! mutation request also bumps a mutation counter under the same lock, which
//! lets the sync engine detect that local writes happened while a bulk read
//! was in flight.

use crate::core::MirrorError;
use crate::core::model::{KeySelector, Record, Snapshot};
use indexmap::IndexMap;
use parking_lot::RwLock;

#[derive(Debug, Default)]
struct StoreInner {
    collections: IndexMap<String, Vec<Record>>,
    /// Number of mutation requests applied since construction.
    mutations: u64,
}

#[derive(Debug, Default)]
pub struct Store {
    inner: RwLock<StoreInner>,
}

impl Store {
    /// Creates a store with one empty record list per collection name.
    pub fn new<I, S>(collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let collections = collections
            .into_iter()
            .map(|name| (name.into(), Vec::new()))
            .collect();
        Self {
            inner: RwLock::new(StoreInner {
                collections,
                mutations: 0,
            }),
        }
    }

    /// Returns a copy of the collection's records in insertion order.
    pub fn list(&self, collection: &str) -> Result<Vec<Record>, MirrorError> {
        let inner = self.inner.read();
        inner
            .collections
            .get(collection)
            .cloned()
            .ok_or_else(|| MirrorError::UnknownCollection(collection.to_string()))
    }

    /// Returns the first record matching `key`, if any.
    pub fn find(&self, collection: &str, key: &KeySelector) -> Result<Option<Record>, MirrorError> {
        let inner = self.inner.read();
        let records = inner
            .collections
            .get(collection)
            .ok_or_else(|| MirrorError::UnknownCollection(collection.to_string()))?;
        Ok(records.iter().find(|r| key.matches(r)).cloned())
    }

    /// Appends a record. Duplicate keys are not detected.
    pub fn insert(&self, collection: &str, record: Record) -> Result<(), MirrorError> {
        let mut inner = self.inner.write();
        let records = inner
            .collections
            .get_mut(collection)
            .ok_or_else(|| MirrorError::UnknownCollection(collection.to_string()))?;
        records.push(record);
        inner.mutations += 1;
        Ok(())
    }

    /// Merges `partial` into the first record matching `key`.
    /// Returns whether a record was found; a miss is not an error.
    pub fn patch(
        &self,
        collection: &str,
        key: &KeySelector,
        partial: &Record,
    ) -> Result<bool, MirrorError> {
        let mut inner = self.inner.write();
        let records = inner
            .collections
            .get_mut(collection)
            .ok_or_else(|| MirrorError::UnknownCollection(collection.to_string()))?;
        let found = match records.iter_mut().find(|r| key.matches(r)) {
            Some(target) => {
                for (field, value) in partial {
                    target.insert(field.clone(), value.clone());
                }
                true
            }
            None => false,
        };
        inner.mutations += 1;
        Ok(found)
    }

    /// Removes every record matching `key`. Returns the number removed.
    pub fn remove(&self, collection: &str, key: &KeySelector) -> Result<usize, MirrorError> {
        let mut inner = self.inner.write();
        let records = inner
            .collections
            .get_mut(collection)
            .ok_or_else(|| MirrorError::UnknownCollection(collection.to_string()))?;
        let before = records.len();
        records.retain(|r| !key.matches(r));
        let removed = before - records.len();
        inner.mutations += 1;
        Ok(removed)
    }

    /// Swaps out every collection's records for the snapshot's.
    /// Declared collections missing from the snapshot become empty; snapshot
    /// entries for undeclared collections are ignored.
    pub fn replace_all(&self, snapshot: Snapshot) {
        let mut inner = self.inner.write();
        Self::swap_in(&mut inner, snapshot);
    }

    /// Like `replace_all`, but only if no mutation was applied since the
    /// counter read `expected_mutations`. Returns whether the swap happened.
    pub fn replace_all_if_unchanged(&self, snapshot: Snapshot, expected_mutations: u64) -> bool {
        let mut inner = self.inner.write();
        if inner.mutations != expected_mutations {
            return false;
        }
        Self::swap_in(&mut inner, snapshot);
        true
    }

    fn swap_in(inner: &mut StoreInner, mut snapshot: Snapshot) {
        for (name, records) in inner.collections.iter_mut() {
            *records = snapshot.collections.swap_remove(name).unwrap_or_default();
        }
    }

    /// The current value of the mutation counter.
    pub fn mutations(&self) -> u64 {
        self.inner.read().mutations
    }

    /// Record counts per collection, in declaration order.
    pub fn sizes(&self) -> Vec<(String, usize)> {
        self.inner
            .read()
            .collections
            .iter()
            .map(|(name, records)| (name.clone(), records.len()))
            .collect()
    }
}
