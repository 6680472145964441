// src/core/model.rs

//! Value types shared by every part of the engine: records, collection
//! schemas, queued jobs and bulk-read snapshots.

use crate::core::MirrorError;
use chrono::{DateTime, TimeDelta, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A single record: field name to string value, in field insertion order.
pub type Record = IndexMap<String, String>;

/// A declared collection with its fixed, ordered header schema.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CollectionSchema {
    pub name: String,
    /// The field used to identify records. Uniqueness is assumed, not enforced.
    pub key_field: String,
    pub headers: Vec<String>,
}

impl CollectionSchema {
    pub fn new(name: &str, key_field: &str, headers: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            key_field: key_field.to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
        }
    }
}

/// The set of collections the engine knows about, fixed at construction time.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: IndexMap<String, CollectionSchema>,
}

impl SchemaRegistry {
    pub fn new(schemas: impl IntoIterator<Item = CollectionSchema>) -> Self {
        Self {
            schemas: schemas.into_iter().map(|s| (s.name.clone(), s)).collect(),
        }
    }

    /// Looks up a schema by its exact local name.
    pub fn get(&self, name: &str) -> Result<&CollectionSchema, MirrorError> {
        self.schemas
            .get(name)
            .ok_or_else(|| MirrorError::UnknownCollection(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn all(&self) -> Vec<CollectionSchema> {
        self.schemas.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// Identifies the record(s) a job targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySelector {
    pub field: String,
    pub value: String,
}

impl KeySelector {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Exact string match against the record's key field.
    pub fn matches(&self, record: &Record) -> bool {
        record.get(&self.field).is_some_and(|v| *v == self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Add,
    Update,
    Delete,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Add => "add",
            JobKind::Update => "update",
            JobKind::Delete => "delete",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The mutation a job replays against the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOp {
    Add { record: Record },
    Update { key: KeySelector, patch: Record },
    Delete { key: KeySelector },
}

/// An immutable, queued mutation request. Once enqueued it is never modified.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub collection: String,
    pub op: JobOp,
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    pub fn new(collection: impl Into<String>, op: JobOp) -> Self {
        Self {
            id: Uuid::new_v4(),
            collection: collection.into(),
            op,
            enqueued_at: Utc::now(),
        }
    }

    pub fn add(collection: impl Into<String>, record: Record) -> Self {
        Self::new(collection, JobOp::Add { record })
    }

    pub fn update(collection: impl Into<String>, key: KeySelector, patch: Record) -> Self {
        Self::new(collection, JobOp::Update { key, patch })
    }

    pub fn delete(collection: impl Into<String>, key: KeySelector) -> Self {
        Self::new(collection, JobOp::Delete { key })
    }

    /// Time since the job was enqueued.
    pub fn queued_for(&self) -> TimeDelta {
        Utc::now() - self.enqueued_at
    }

    pub fn kind(&self) -> JobKind {
        match self.op {
            JobOp::Add { .. } => JobKind::Add,
            JobOp::Update { .. } => JobKind::Update,
            JobOp::Delete { .. } => JobKind::Delete,
        }
    }
}

/// Every collection as read from the remote store in one bulk operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub collections: IndexMap<String, Vec<Record>>,
}

impl Snapshot {
    pub fn insert(&mut self, collection: impl Into<String>, records: Vec<Record>) {
        self.collections.insert(collection.into(), records);
    }

    pub fn get(&self, collection: &str) -> Option<&Vec<Record>> {
        self.collections.get(collection)
    }

    pub fn record_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }
}

/// Builds a `Record` from string pairs. Mostly a convenience for callers and tests.
pub fn record<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Record
where
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
