use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// What a transaction does to its key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kind {
    /// Store a value under the key.
    Insert,
    /// Remove the key.
    Delete,
    /// Read the key. Reads never go through voting, so no coordinator
    /// builds a transaction of this kind.
    Get,
}

/// One state-changing operation, shipped by value with every protocol call.
///
/// Fields are private and there are no setters: a transaction never changes
/// after construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    id: u64,
    kind: Kind,
    key: String,
    value: String,
}

impl Transaction {
    /// Build a transaction; `value` is kept only for [`Kind::Insert`].
    pub fn new(id: u64, kind: Kind, key: impl Into<String>, value: Option<String>) -> Self {
        let value = match kind {
            Kind::Insert => value.unwrap_or_default(),
            Kind::Delete | Kind::Get => String::new(),
        };
        Self {
            id,
            kind,
            key: key.into(),
            value,
        }
    }

    /// Insert `value` under `key`.
    pub fn insert(id: u64, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(id, Kind::Insert, key, Some(value.into()))
    }

    /// Delete `key`.
    pub fn delete(id: u64, key: impl Into<String>) -> Self {
        Self::new(id, Kind::Delete, key, None)
    }

    /// Coordinator-assigned id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Operation kind.
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Target key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Value to insert, empty for anything but [`Kind::Insert`].
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Kind::Insert => write!(f, "#{} insert {}={}", self.id, self.key, self.value),
            Kind::Delete => write!(f, "#{} delete {}", self.id, self.key),
            Kind::Get => write!(f, "#{} get {}", self.id, self.key),
        }
    }
}

/// Source of transaction ids: strictly increasing from 1, never reused
/// within a process.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicU64,
}

impl IdGenerator {
    /// Generator whose first id is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id; lock-free and safe to call from many tasks at once.
    pub fn next_id(&self) -> u64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }
}
