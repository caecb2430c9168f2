use bytes::Bytes;
use thiserror::Error;
use tracing::trace;

use inmemdb_common::clock::mstime;

use crate::list::ValueList;
use crate::table::HashTable;
use crate::value::{parse_i64, Value};

/// Milliseconds between periodic expiry sweeps.
const EXPIRE_SWEEP_INTERVAL_MS: i64 = 100;
/// Live entries sampled per sweep.
const EXPIRE_SWEEP_SAMPLES: usize = 20;

/// Errors reported by typed keyspace operations. Dispatch maps these onto
/// the canonical protocol error strings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DbError {
    #[error("value is not an integer or out of range")]
    NotInteger,

    #[error("operation against a key holding the wrong kind of value")]
    WrongType,
}

/// A value object paired with its expiry deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub value: Value,
    /// Absolute millisecond deadline; `None` means the entry never expires.
    pub expire_at: Option<i64>,
}

impl Entry {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            expire_at: None,
        }
    }

    pub fn with_deadline(value: Value, expire_at: Option<i64>) -> Self {
        Self { value, expire_at }
    }
}

/// The keyspace: a hash table of entries with lazy and sampled expiry.
///
/// Every read path runs the lazy-expiry check first, so an entry whose
/// deadline has passed behaves exactly like a missing key. The sampled
/// sweep bounds how many expired-but-unread entries accumulate.
pub struct Database {
    table: HashTable<Entry>,
    last_sweep: i64,
}

impl Database {
    pub fn new() -> Self {
        Self {
            table: HashTable::new(),
            last_sweep: mstime(),
        }
    }

    /// Stores `value` under `key`, replacing any existing entry and
    /// clearing its expiry. Integer-looking values are stored as integers.
    pub fn set(&mut self, key: Bytes, value: Bytes) {
        self.table.insert(key, Entry::new(Value::from_ingest(value)));
    }

    /// Looks up the value under `key`, expiring it first if its deadline
    /// has passed.
    pub fn get(&mut self, key: &Bytes) -> Option<&Value> {
        if self.check_expired(key) {
            return None;
        }
        self.table.get(key).map(|entry| &entry.value)
    }

    /// Removes `key`. Returns `true` if a live entry was removed.
    pub fn del(&mut self, key: &Bytes) -> bool {
        self.check_expired(key);
        self.table.remove(key).is_some()
    }

    pub fn exists(&mut self, key: &Bytes) -> bool {
        !self.check_expired(key) && self.table.contains_key(key)
    }

    /// Adds `delta` to the integer stored under `key`.
    ///
    /// A missing key becomes `delta`. A string value that parses as an
    /// integer is promoted in place. Anything else, or an overflow, is
    /// `DbError::NotInteger`.
    pub fn incr(&mut self, key: &Bytes, delta: i64) -> Result<i64, DbError> {
        self.check_expired(key);

        if let Some(entry) = self.table.get_mut(key) {
            return match &mut entry.value {
                Value::Int(n) => {
                    let next = n.checked_add(delta).ok_or(DbError::NotInteger)?;
                    *n = next;
                    Ok(next)
                }
                Value::Str(s) => match parse_i64(s) {
                    Some(n) => {
                        let next = n.checked_add(delta).ok_or(DbError::NotInteger)?;
                        entry.value = Value::Int(next);
                        Ok(next)
                    }
                    None => Err(DbError::NotInteger),
                },
                Value::List(_) => Err(DbError::NotInteger),
            };
        }

        self.table.insert(key.clone(), Entry::new(Value::Int(delta)));
        Ok(delta)
    }

    /// Pushes `value` at the head of the list under `key`, creating the
    /// list if the key is missing. Returns the new length.
    pub fn lpush(&mut self, key: &Bytes, value: Bytes) -> Result<usize, DbError> {
        self.check_expired(key);

        if let Some(entry) = self.table.get_mut(key) {
            return match &mut entry.value {
                Value::List(list) => {
                    list.push_front(value);
                    Ok(list.len())
                }
                _ => Err(DbError::WrongType),
            };
        }

        let mut list = ValueList::new();
        list.push_front(value);
        self.table
            .insert(key.clone(), Entry::new(Value::List(list)));
        Ok(1)
    }

    /// Pushes `value` at the tail of the list under `key`, creating the
    /// list if the key is missing. Returns the new length.
    pub fn rpush(&mut self, key: &Bytes, value: Bytes) -> Result<usize, DbError> {
        self.check_expired(key);

        if let Some(entry) = self.table.get_mut(key) {
            return match &mut entry.value {
                Value::List(list) => {
                    list.push_back(value);
                    Ok(list.len())
                }
                _ => Err(DbError::WrongType),
            };
        }

        let mut list = ValueList::new();
        list.push_back(value);
        self.table
            .insert(key.clone(), Entry::new(Value::List(list)));
        Ok(1)
    }

    /// Pops from the head of the list under `key`. The key is removed once
    /// the list empties. Missing keys and non-list values yield `None`.
    pub fn lpop(&mut self, key: &Bytes) -> Option<Bytes> {
        self.pop(key, true)
    }

    /// Pops from the tail of the list under `key`. See [`Self::lpop`].
    pub fn rpop(&mut self, key: &Bytes) -> Option<Bytes> {
        self.pop(key, false)
    }

    fn pop(&mut self, key: &Bytes, front: bool) -> Option<Bytes> {
        if self.check_expired(key) {
            return None;
        }
        let entry = self.table.get_mut(key)?;
        let Value::List(list) = &mut entry.value else {
            return None;
        };

        let popped = if front {
            list.pop_front()
        } else {
            list.pop_back()
        };
        let emptied = list.is_empty();
        if emptied {
            self.table.remove(key);
        }
        popped
    }

    /// Length of the list under `key`; a missing key counts as empty.
    pub fn llen(&mut self, key: &Bytes) -> Result<usize, DbError> {
        if self.check_expired(key) {
            return Ok(0);
        }
        match self.table.get(key) {
            None => Ok(0),
            Some(Entry {
                value: Value::List(list),
                ..
            }) => Ok(list.len()),
            Some(_) => Err(DbError::WrongType),
        }
    }

    /// Elements of the list under `key` between `start` and `stop`
    /// inclusive, with negative indices resolved from the tail. Missing
    /// keys and non-list values yield an empty range.
    pub fn lrange(&mut self, key: &Bytes, start: i64, stop: i64) -> Vec<Bytes> {
        if self.check_expired(key) {
            return Vec::new();
        }
        match self.table.get(key) {
            Some(Entry {
                value: Value::List(list),
                ..
            }) => list.range(start, stop),
            _ => Vec::new(),
        }
    }

    /// Sets the deadline of `key` to now + `seconds`. Returns `true` if the
    /// key existed. Zero and negative values are allowed; the entry is then
    /// already past its deadline and dies on the next access.
    pub fn expire(&mut self, key: &Bytes, seconds: i64) -> bool {
        if self.check_expired(key) {
            return false;
        }
        match self.table.get_mut(key) {
            Some(entry) => {
                entry.expire_at = Some(mstime().saturating_add(seconds.saturating_mul(1000)));
                true
            }
            None => false,
        }
    }

    /// Whole seconds until the deadline of `key`: -2 if the key is missing,
    /// -1 if it has no deadline, otherwise the remaining time floored at 0.
    pub fn ttl(&mut self, key: &Bytes) -> i64 {
        if self.check_expired(key) {
            return -2;
        }
        match self.table.get(key) {
            None => -2,
            Some(Entry {
                expire_at: None, ..
            }) => -1,
            Some(Entry {
                expire_at: Some(at),
                ..
            }) => {
                let remaining = at.saturating_sub(mstime()) / 1000;
                remaining.max(0)
            }
        }
    }

    /// Clears the deadline of `key`. Returns `true` if a deadline existed.
    pub fn persist(&mut self, key: &Bytes) -> bool {
        if self.check_expired(key) {
            return false;
        }
        match self.table.get_mut(key) {
            Some(entry) if entry.expire_at.is_some() => {
                entry.expire_at = None;
                true
            }
            _ => false,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Drops every entry and starts over with a fresh table.
    pub fn flush(&mut self) {
        self.table = HashTable::new();
    }

    /// Iterates live entries, expired or not. Snapshot writing filters
    /// nothing; expired records are skipped at load time instead.
    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &Entry)> {
        self.table.iter()
    }

    /// Inserts a fully-formed entry, used when loading a snapshot.
    pub fn insert_entry(&mut self, key: Bytes, entry: Entry) {
        self.table.insert(key, entry);
    }

    /// Rate-limited sampled deletion of expired entries. A no-op unless at
    /// least 100 ms have passed since the previous sweep.
    pub fn expire_sweep(&mut self) {
        let now = mstime();
        if now - self.last_sweep < EXPIRE_SWEEP_INTERVAL_MS {
            return;
        }
        self.last_sweep = now;
        self.sweep_sample(now);
    }

    /// Samples up to 20 entries and deletes the expired ones. Deletion
    /// happens after sampling completes so the iterator is never used
    /// across a structural mutation.
    fn sweep_sample(&mut self, now: i64) {
        if self.table.is_empty() {
            return;
        }

        let doomed: Vec<Bytes> = self
            .table
            .iter()
            .take(EXPIRE_SWEEP_SAMPLES)
            .filter(|(_, entry)| entry.expire_at.is_some_and(|at| now > at))
            .map(|(key, _)| key.clone())
            .collect();

        for key in doomed {
            trace!(key = %String::from_utf8_lossy(&key), "expiry sweep removing key");
            self.table.remove(&key);
        }
    }

    /// Deletes `key` if its deadline has passed. Returns `true` when the
    /// entry was expired and removed.
    fn check_expired(&mut self, key: &Bytes) -> bool {
        let expired = matches!(
            self.table.get(key),
            Some(entry) if entry.expire_at.is_some_and(|at| mstime() > at)
        );
        if expired {
            self.table.remove(key);
        }
        expired
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}
