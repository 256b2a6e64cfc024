//! Typed Storage Engine with Expiry Support
//!
//! One logical namespace maps each key to exactly one [`Value`] variant:
//! string, list, hash, set, or sorted set. The tagged enum makes the
//! one-type-per-key rule structural: a key cannot live in two families at
//! once, and every command dispatches on the variant before doing anything.
//!
//! ## Concurrency model
//!
//! A single `RwLock` guards the whole table. Every public method takes the
//! lock once, does its work, and releases it; nothing suspends while holding
//! it. That makes each operation atomic with respect to every other,
//! including the ones that span many keys (DEL, MGET, SINTER, KEYS).
//!
//! ## Expiry
//!
//! Each entry carries an optional deadline. Expiry is lazy: write paths
//! remove a dead entry before evaluating the command ("touch"), read paths
//! simply treat it as absent and leave reclamation to the next write or to
//! the background sweeper (see [`crate::storage::expiry`]). A client can
//! never observe the difference.

use crate::storage::glob::GlobPattern;
use crate::storage::zset::SortedSet;
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors a store operation can report to the client.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// The key holds a value of another family
    #[error("wrong type")]
    WrongType,

    /// The stored string is not a signed 64-bit decimal, or arithmetic
    /// overflowed
    #[error("value is not an integer or out of range")]
    NotInteger,
}

/// A value of one of the five families.
#[derive(Debug, Clone)]
pub enum Value {
    Str(Bytes),
    List(VecDeque<Bytes>),
    Hash(HashMap<Bytes, Bytes>),
    Set(HashSet<Bytes>),
    Zset(SortedSet),
}

impl Value {
    /// The type name reported by TYPE.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Hash(_) => "hash",
            Value::Set(_) => "set",
            Value::Zset(_) => "zset",
        }
    }
}

/// A stored value plus its optional expiry deadline.
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Value,
    pub expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }
}

/// Removes the key if its deadline has passed. Write-path touch.
fn purge_expired(entries: &mut HashMap<Bytes, Entry>, key: &[u8]) {
    if let Some(entry) = entries.get(key) {
        if entry.is_expired() {
            entries.remove(key);
        }
    }
}

/// Looks up a key, treating an expired entry as absent. Read-path touch.
fn live<'a>(entries: &'a HashMap<Bytes, Entry>, key: &[u8]) -> Option<&'a Entry> {
    entries.get(key).filter(|entry| !entry.is_expired())
}

/// Maps possibly-negative inclusive range indices onto `0..len`.
///
/// Returns None when the normalized range is empty.
fn normalize_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let mut start = if start < 0 { len + start } else { start };
    let mut stop = if stop < 0 { len + stop } else { stop };

    if start < 0 {
        start = 0;
    }
    if stop >= len {
        stop = len - 1;
    }
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

/// The shared store backing every connection.
///
/// Designed to be wrapped in an `Arc` and cloned into each connection task.
/// All methods are linearizable; see the module docs.
#[derive(Debug, Default)]
pub struct StorageEngine {
    entries: RwLock<HashMap<Bytes, Entry>>,
}

impl StorageEngine {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // String family
    // ========================================================================

    /// GET. Null for an absent key, error for a present non-string.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>, StoreError> {
        let entries = self.entries.read().unwrap();
        match live(&entries, key) {
            Some(entry) => match &entry.value {
                Value::Str(s) => Ok(Some(s.clone())),
                _ => Err(StoreError::WrongType),
            },
            None => Ok(None),
        }
    }

    /// SET. Unconditionally replaces any prior value (of any family) and
    /// clears or resets the expiry.
    pub fn set(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) {
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            key,
            Entry {
                value: Value::Str(value),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
    }

    /// MGET. Never fails; non-string and absent keys yield None.
    pub fn mget(&self, keys: &[Bytes]) -> Vec<Option<Bytes>> {
        let entries = self.entries.read().unwrap();
        keys.iter()
            .map(|key| match live(&entries, key) {
                Some(Entry {
                    value: Value::Str(s),
                    ..
                }) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    /// DEL. Returns how many keys were actually removed.
    pub fn del(&self, keys: &[Bytes]) -> usize {
        let mut entries = self.entries.write().unwrap();
        let mut removed = 0;
        for key in keys {
            purge_expired(&mut entries, key);
            if entries.remove(&key[..]).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// EXISTS. Counts duplicates: `EXISTS a a` with `a` present returns 2.
    pub fn exists(&self, keys: &[Bytes]) -> usize {
        let entries = self.entries.read().unwrap();
        keys.iter().filter(|key| live(&entries, key).is_some()).count()
    }

    /// INCRBY / DECRBY. The key defaults to "0"; the stored form after
    /// success is the canonical decimal. The expiry survives.
    pub fn incr_by(&self, key: &Bytes, delta: i64) -> Result<i64, StoreError> {
        let mut entries = self.entries.write().unwrap();
        purge_expired(&mut entries, key);

        let current = match entries.get(&key[..]) {
            Some(entry) => match &entry.value {
                Value::Str(s) => std::str::from_utf8(s)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .ok_or(StoreError::NotInteger)?,
                _ => return Err(StoreError::WrongType),
            },
            None => 0,
        };

        let next = current.checked_add(delta).ok_or(StoreError::NotInteger)?;
        let value = Value::Str(Bytes::from(next.to_string()));

        match entries.get_mut(&key[..]) {
            Some(entry) => entry.value = value,
            None => {
                entries.insert(key.clone(), Entry::new(value));
            }
        }
        Ok(next)
    }

    /// EXPIRE. 0 when the key is absent; a non-positive ttl deletes the key.
    pub fn expire(&self, key: &Bytes, seconds: i64) -> i64 {
        if seconds <= 0 {
            let mut entries = self.entries.write().unwrap();
            let was_live = live(&entries, key).is_some();
            entries.remove(&key[..]);
            if was_live {
                1
            } else {
                0
            }
        } else {
            self.expire_in(key, Duration::from_secs(seconds as u64))
        }
    }

    /// Sets a deadline `ttl` from now. Split out of [`StorageEngine::expire`]
    /// so sub-second deadlines are reachable.
    pub fn expire_in(&self, key: &Bytes, ttl: Duration) -> i64 {
        let mut entries = self.entries.write().unwrap();
        purge_expired(&mut entries, key);
        match entries.get_mut(&key[..]) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                1
            }
            None => 0,
        }
    }

    /// TTL in whole seconds. -2 absent, -1 no deadline, remainder rounds
    /// down.
    pub fn ttl(&self, key: &[u8]) -> i64 {
        let entries = self.entries.read().unwrap();
        match live(&entries, key) {
            None => -2,
            Some(entry) => match entry.expires_at {
                None => -1,
                Some(deadline) => {
                    deadline.saturating_duration_since(Instant::now()).as_secs() as i64
                }
            },
        }
    }

    // ========================================================================
    // List family (left = head)
    // ========================================================================

    /// LPUSH. Each value is prepended in input order, so the last input ends
    /// up at the head. Returns the new length.
    pub fn lpush(&self, key: &Bytes, values: Vec<Bytes>) -> Result<usize, StoreError> {
        self.push(key, values, true)
    }

    /// RPUSH. Appends to the tail; returns the new length.
    pub fn rpush(&self, key: &Bytes, values: Vec<Bytes>) -> Result<usize, StoreError> {
        self.push(key, values, false)
    }

    fn push(&self, key: &Bytes, values: Vec<Bytes>, front: bool) -> Result<usize, StoreError> {
        let mut entries = self.entries.write().unwrap();
        purge_expired(&mut entries, key);

        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(Value::List(VecDeque::new())));

        match &mut entry.value {
            Value::List(list) => {
                for value in values {
                    if front {
                        list.push_front(value);
                    } else {
                        list.push_back(value);
                    }
                }
                Ok(list.len())
            }
            _ => Err(StoreError::WrongType),
        }
    }

    /// LLEN. Absent key counts as an empty list.
    pub fn llen(&self, key: &[u8]) -> Result<usize, StoreError> {
        let entries = self.entries.read().unwrap();
        match live(&entries, key) {
            None => Ok(0),
            Some(entry) => match &entry.value {
                Value::List(list) => Ok(list.len()),
                _ => Err(StoreError::WrongType),
            },
        }
    }

    /// LRANGE with the usual negative-index normalization; both bounds
    /// inclusive.
    pub fn lrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<Bytes>, StoreError> {
        let entries = self.entries.read().unwrap();
        let list = match live(&entries, key) {
            None => return Ok(Vec::new()),
            Some(entry) => match &entry.value {
                Value::List(list) => list,
                _ => return Err(StoreError::WrongType),
            },
        };

        match normalize_range(list.len(), start, stop) {
            None => Ok(Vec::new()),
            Some((start, stop)) => Ok(list
                .iter()
                .skip(start)
                .take(stop - start + 1)
                .cloned()
                .collect()),
        }
    }

    /// LPOP. The key is removed once the list drains.
    pub fn lpop(&self, key: &Bytes) -> Result<Option<Bytes>, StoreError> {
        self.pop(key, true)
    }

    /// RPOP.
    pub fn rpop(&self, key: &Bytes) -> Result<Option<Bytes>, StoreError> {
        self.pop(key, false)
    }

    fn pop(&self, key: &Bytes, front: bool) -> Result<Option<Bytes>, StoreError> {
        let mut entries = self.entries.write().unwrap();
        purge_expired(&mut entries, key);

        let (popped, now_empty) = match entries.get_mut(&key[..]) {
            None => return Ok(None),
            Some(entry) => match &mut entry.value {
                Value::List(list) => {
                    let popped = if front {
                        list.pop_front()
                    } else {
                        list.pop_back()
                    };
                    (popped, list.is_empty())
                }
                _ => return Err(StoreError::WrongType),
            },
        };

        if now_empty {
            entries.remove(&key[..]);
        }
        Ok(popped)
    }

    /// LINDEX. Negative indices count from the tail.
    pub fn lindex(&self, key: &[u8], index: i64) -> Result<Option<Bytes>, StoreError> {
        let entries = self.entries.read().unwrap();
        let list = match live(&entries, key) {
            None => return Ok(None),
            Some(entry) => match &entry.value {
                Value::List(list) => list,
                _ => return Err(StoreError::WrongType),
            },
        };

        let len = list.len() as i64;
        let index = if index < 0 { len + index } else { index };
        if index < 0 || index >= len {
            return Ok(None);
        }
        Ok(list.get(index as usize).cloned())
    }

    // ========================================================================
    // Hash family
    // ========================================================================

    /// HSET. 1 when the field was new, 0 when it was updated.
    pub fn hset(&self, key: &Bytes, field: Bytes, value: Bytes) -> Result<i64, StoreError> {
        let mut entries = self.entries.write().unwrap();
        purge_expired(&mut entries, key);

        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(Value::Hash(HashMap::new())));

        match &mut entry.value {
            Value::Hash(hash) => Ok(if hash.insert(field, value).is_none() {
                1
            } else {
                0
            }),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn hget(&self, key: &[u8], field: &[u8]) -> Result<Option<Bytes>, StoreError> {
        let entries = self.entries.read().unwrap();
        match live(&entries, key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::Hash(hash) => Ok(hash.get(field).cloned()),
                _ => Err(StoreError::WrongType),
            },
        }
    }

    /// HDEL. Returns how many of the given fields were removed; the key
    /// itself goes once the hash is empty.
    pub fn hdel(&self, key: &Bytes, fields: &[Bytes]) -> Result<usize, StoreError> {
        let mut entries = self.entries.write().unwrap();
        purge_expired(&mut entries, key);

        let (removed, now_empty) = match entries.get_mut(&key[..]) {
            None => return Ok(0),
            Some(entry) => match &mut entry.value {
                Value::Hash(hash) => {
                    let removed = fields
                        .iter()
                        .filter(|field| hash.remove(&field[..]).is_some())
                        .count();
                    (removed, hash.is_empty())
                }
                _ => return Err(StoreError::WrongType),
            },
        };

        if now_empty {
            entries.remove(&key[..]);
        }
        Ok(removed)
    }

    pub fn hexists(&self, key: &[u8], field: &[u8]) -> Result<bool, StoreError> {
        Ok(self.hget(key, field)?.is_some())
    }

    /// HGETALL as (field, value) pairs in the map's iteration order.
    pub fn hgetall(&self, key: &[u8]) -> Result<Vec<(Bytes, Bytes)>, StoreError> {
        let entries = self.entries.read().unwrap();
        match live(&entries, key) {
            None => Ok(Vec::new()),
            Some(entry) => match &entry.value {
                Value::Hash(hash) => Ok(hash
                    .iter()
                    .map(|(field, value)| (field.clone(), value.clone()))
                    .collect()),
                _ => Err(StoreError::WrongType),
            },
        }
    }

    pub fn hkeys(&self, key: &[u8]) -> Result<Vec<Bytes>, StoreError> {
        Ok(self.hgetall(key)?.into_iter().map(|(field, _)| field).collect())
    }

    pub fn hvals(&self, key: &[u8]) -> Result<Vec<Bytes>, StoreError> {
        Ok(self.hgetall(key)?.into_iter().map(|(_, value)| value).collect())
    }

    pub fn hlen(&self, key: &[u8]) -> Result<usize, StoreError> {
        let entries = self.entries.read().unwrap();
        match live(&entries, key) {
            None => Ok(0),
            Some(entry) => match &entry.value {
                Value::Hash(hash) => Ok(hash.len()),
                _ => Err(StoreError::WrongType),
            },
        }
    }

    // ========================================================================
    // Set family
    // ========================================================================

    /// SADD. Returns how many members were actually new.
    pub fn sadd(&self, key: &Bytes, members: Vec<Bytes>) -> Result<usize, StoreError> {
        let mut entries = self.entries.write().unwrap();
        purge_expired(&mut entries, key);

        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(Value::Set(HashSet::new())));

        match &mut entry.value {
            Value::Set(set) => Ok(members
                .into_iter()
                .filter(|member| set.insert(member.clone()))
                .count()),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn smembers(&self, key: &[u8]) -> Result<Vec<Bytes>, StoreError> {
        let entries = self.entries.read().unwrap();
        match live(&entries, key) {
            None => Ok(Vec::new()),
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(set.iter().cloned().collect()),
                _ => Err(StoreError::WrongType),
            },
        }
    }

    pub fn sismember(&self, key: &[u8], member: &[u8]) -> Result<bool, StoreError> {
        let entries = self.entries.read().unwrap();
        match live(&entries, key) {
            None => Ok(false),
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(set.contains(member)),
                _ => Err(StoreError::WrongType),
            },
        }
    }

    /// SREM. The key goes once the set drains.
    pub fn srem(&self, key: &Bytes, members: &[Bytes]) -> Result<usize, StoreError> {
        let mut entries = self.entries.write().unwrap();
        purge_expired(&mut entries, key);

        let (removed, now_empty) = match entries.get_mut(&key[..]) {
            None => return Ok(0),
            Some(entry) => match &mut entry.value {
                Value::Set(set) => {
                    let removed = members
                        .iter()
                        .filter(|member| set.remove(&member[..]))
                        .count();
                    (removed, set.is_empty())
                }
                _ => return Err(StoreError::WrongType),
            },
        };

        if now_empty {
            entries.remove(&key[..]);
        }
        Ok(removed)
    }

    pub fn scard(&self, key: &[u8]) -> Result<usize, StoreError> {
        let entries = self.entries.read().unwrap();
        match live(&entries, key) {
            None => Ok(0),
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(set.len()),
                _ => Err(StoreError::WrongType),
            },
        }
    }

    /// SINTER. A wrong-typed key is an error even when another input is
    /// absent; any absent input makes the intersection empty.
    pub fn sinter(&self, keys: &[Bytes]) -> Result<Vec<Bytes>, StoreError> {
        let entries = self.entries.read().unwrap();

        let mut sets = Vec::with_capacity(keys.len());
        for key in keys {
            match live(&entries, key) {
                None => sets.push(None),
                Some(entry) => match &entry.value {
                    Value::Set(set) => sets.push(Some(set)),
                    _ => return Err(StoreError::WrongType),
                },
            }
        }

        let mut acc: Option<HashSet<Bytes>> = None;
        for set in sets {
            let set = match set {
                Some(set) => set,
                None => return Ok(Vec::new()),
            };
            acc = Some(match acc {
                None => set.iter().cloned().collect(),
                Some(prev) => prev
                    .into_iter()
                    .filter(|member| set.contains(member))
                    .collect(),
            });
        }
        Ok(acc.map(|set| set.into_iter().collect()).unwrap_or_default())
    }

    /// SUNION. Absent keys contribute nothing.
    pub fn sunion(&self, keys: &[Bytes]) -> Result<Vec<Bytes>, StoreError> {
        let entries = self.entries.read().unwrap();

        let mut acc: HashSet<Bytes> = HashSet::new();
        for key in keys {
            match live(&entries, key) {
                None => {}
                Some(entry) => match &entry.value {
                    Value::Set(set) => acc.extend(set.iter().cloned()),
                    _ => return Err(StoreError::WrongType),
                },
            }
        }
        Ok(acc.into_iter().collect())
    }

    // ========================================================================
    // Sorted-set family
    // ========================================================================

    /// ZADD. Existing members have their score replaced; only newly inserted
    /// members count toward the result.
    pub fn zadd(&self, key: &Bytes, pairs: Vec<(f64, Bytes)>) -> Result<usize, StoreError> {
        let mut entries = self.entries.write().unwrap();
        purge_expired(&mut entries, key);

        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(Value::Zset(SortedSet::new())));

        match &mut entry.value {
            Value::Zset(zset) => Ok(pairs
                .into_iter()
                .filter(|(score, member)| zset.insert(member.clone(), *score))
                .count()),
            _ => Err(StoreError::WrongType),
        }
    }

    /// ZRANGE over ranks, LRANGE index rules. Pairs come back in rank order.
    pub fn zrange(
        &self,
        key: &[u8],
        start: i64,
        stop: i64,
    ) -> Result<Vec<(Bytes, f64)>, StoreError> {
        let entries = self.entries.read().unwrap();
        let zset = match live(&entries, key) {
            None => return Ok(Vec::new()),
            Some(entry) => match &entry.value {
                Value::Zset(zset) => zset,
                _ => return Err(StoreError::WrongType),
            },
        };

        match normalize_range(zset.len(), start, stop) {
            None => Ok(Vec::new()),
            Some((start, stop)) => Ok(zset.range(start, stop)),
        }
    }

    pub fn zrank(&self, key: &[u8], member: &[u8]) -> Result<Option<usize>, StoreError> {
        let entries = self.entries.read().unwrap();
        match live(&entries, key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::Zset(zset) => Ok(zset.rank(member)),
                _ => Err(StoreError::WrongType),
            },
        }
    }

    /// ZREM. The key goes once the sorted set drains.
    pub fn zrem(&self, key: &Bytes, members: &[Bytes]) -> Result<usize, StoreError> {
        let mut entries = self.entries.write().unwrap();
        purge_expired(&mut entries, key);

        let (removed, now_empty) = match entries.get_mut(&key[..]) {
            None => return Ok(0),
            Some(entry) => match &mut entry.value {
                Value::Zset(zset) => {
                    let removed = members
                        .iter()
                        .filter(|member| zset.remove(member))
                        .count();
                    (removed, zset.is_empty())
                }
                _ => return Err(StoreError::WrongType),
            },
        };

        if now_empty {
            entries.remove(&key[..]);
        }
        Ok(removed)
    }

    pub fn zscore(&self, key: &[u8], member: &[u8]) -> Result<Option<f64>, StoreError> {
        let entries = self.entries.read().unwrap();
        match live(&entries, key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                Value::Zset(zset) => Ok(zset.score(member)),
                _ => Err(StoreError::WrongType),
            },
        }
    }

    pub fn zcard(&self, key: &[u8]) -> Result<usize, StoreError> {
        let entries = self.entries.read().unwrap();
        match live(&entries, key) {
            None => Ok(0),
            Some(entry) => match &entry.value {
                Value::Zset(zset) => Ok(zset.len()),
                _ => Err(StoreError::WrongType),
            },
        }
    }

    // ========================================================================
    // Keyspace
    // ========================================================================

    /// KEYS. Matches every live key against the pattern; the result is
    /// sorted lexicographically. The pattern is compiled once, not per key.
    pub fn keys(&self, pattern: &[u8]) -> Vec<Bytes> {
        let pattern = GlobPattern::compile(pattern);
        let entries = self.entries.read().unwrap();

        let mut matched: Vec<Bytes> = entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired())
            .filter(|(key, _)| pattern.matches(key))
            .map(|(key, _)| key.clone())
            .collect();
        matched.sort();
        matched
    }

    /// TYPE. "none" for an absent key.
    pub fn key_type(&self, key: &[u8]) -> &'static str {
        let entries = self.entries.read().unwrap();
        match live(&entries, key) {
            Some(entry) => entry.value.type_name(),
            None => "none",
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap();
        entries.values().filter(|entry| !entry.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// FLUSHDB.
    pub fn flush(&self) {
        self.entries.write().unwrap().clear();
    }

    /// Removes every expired entry. Called by the background sweeper.
    ///
    /// Returns the number of entries reclaimed.
    pub fn cleanup_expired(&self) -> u64 {
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        (before - entries.len()) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn test_set_and_get() {
        let engine = StorageEngine::new();
        engine.set(b("key"), b("value"), None);
        assert_eq!(engine.get(b"key").unwrap(), Some(b("value")));
        assert_eq!(engine.get(b"missing").unwrap(), None);
    }

    #[test]
    fn test_get_on_list_is_wrong_type() {
        let engine = StorageEngine::new();
        engine.lpush(&b("queue"), vec![b("a")]).unwrap();
        assert_eq!(engine.get(b"queue").unwrap_err(), StoreError::WrongType);
    }

    #[test]
    fn test_type_exclusivity() {
        let engine = StorageEngine::new();
        engine.set(b("x"), b("1"), None);

        assert_eq!(
            engine.lpush(&b("x"), vec![b("a")]).unwrap_err(),
            StoreError::WrongType
        );
        assert_eq!(
            engine.sadd(&b("x"), vec![b("a")]).unwrap_err(),
            StoreError::WrongType
        );
        assert_eq!(
            engine.hset(&b("x"), b("f"), b("v")).unwrap_err(),
            StoreError::WrongType
        );
        assert_eq!(
            engine.zadd(&b("x"), vec![(1.0, b("a"))]).unwrap_err(),
            StoreError::WrongType
        );

        // The failed writes must not have touched the string
        assert_eq!(engine.get(b"x").unwrap(), Some(b("1")));
        assert_eq!(engine.key_type(b"x"), "string");
    }

    #[test]
    fn test_set_overwrites_any_type() {
        let engine = StorageEngine::new();
        engine.rpush(&b("k"), vec![b("a"), b("b")]).unwrap();
        assert_eq!(engine.key_type(b"k"), "list");

        engine.set(b("k"), b("now a string"), None);
        assert_eq!(engine.key_type(b"k"), "string");
        assert_eq!(engine.get(b"k").unwrap(), Some(b("now a string")));
    }

    #[test]
    fn test_set_clears_ttl() {
        let engine = StorageEngine::new();
        engine.set(b("k"), b("v"), Some(Duration::from_secs(100)));
        assert!(engine.ttl(b"k") >= 0);

        engine.set(b("k"), b("v2"), None);
        assert_eq!(engine.ttl(b"k"), -1);
    }

    #[test]
    fn test_del_counts_and_is_idempotent() {
        let engine = StorageEngine::new();
        engine.set(b("a"), b("1"), None);
        engine.rpush(&b("l"), vec![b("x")]).unwrap();
        engine.sadd(&b("s"), vec![b("m")]).unwrap();

        let keys = vec![b("a"), b("l"), b("s"), b("ghost")];
        assert_eq!(engine.del(&keys), 3);
        assert_eq!(engine.del(&keys), 0);
    }

    #[test]
    fn test_exists_counts_duplicates() {
        let engine = StorageEngine::new();
        engine.set(b("a"), b("1"), None);
        assert_eq!(engine.exists(&[b("a"), b("a"), b("ghost")]), 2);
    }

    #[test]
    fn test_incr_semantics() {
        let engine = StorageEngine::new();
        assert_eq!(engine.incr_by(&b("n"), 1).unwrap(), 1);
        assert_eq!(engine.incr_by(&b("n"), 1).unwrap(), 2);
        assert_eq!(engine.incr_by(&b("n"), -5).unwrap(), -3);
        assert_eq!(engine.get(b"n").unwrap(), Some(b("-3")));

        engine.set(b("n"), b("abc"), None);
        assert_eq!(engine.incr_by(&b("n"), 1).unwrap_err(), StoreError::NotInteger);

        engine.rpush(&b("l"), vec![b("x")]).unwrap();
        assert_eq!(engine.incr_by(&b("l"), 1).unwrap_err(), StoreError::WrongType);
    }

    #[test]
    fn test_incr_overflow() {
        let engine = StorageEngine::new();
        engine.set(b("n"), Bytes::from(i64::MAX.to_string()), None);
        assert_eq!(engine.incr_by(&b("n"), 1).unwrap_err(), StoreError::NotInteger);
        // The stored value is untouched after the failed increment
        assert_eq!(engine.get(b"n").unwrap(), Some(Bytes::from(i64::MAX.to_string())));
    }

    #[test]
    fn test_incr_preserves_ttl() {
        let engine = StorageEngine::new();
        engine.set(b("n"), b("1"), Some(Duration::from_secs(100)));
        engine.incr_by(&b("n"), 1).unwrap();
        assert!(engine.ttl(b"n") >= 0);
    }

    #[test]
    fn test_expire_and_ttl() {
        let engine = StorageEngine::new();
        assert_eq!(engine.expire(&b("ghost"), 10), 0);
        assert_eq!(engine.ttl(b"ghost"), -2);

        engine.set(b("k"), b("v"), None);
        assert_eq!(engine.ttl(b"k"), -1);
        assert_eq!(engine.expire(&b("k"), 10), 1);
        let ttl = engine.ttl(b"k");
        assert!((9..=10).contains(&ttl), "ttl was {}", ttl);
    }

    #[test]
    fn test_expire_non_positive_deletes() {
        let engine = StorageEngine::new();
        engine.set(b("k"), b("v"), None);
        assert_eq!(engine.expire(&b("k"), 0), 1);
        assert_eq!(engine.get(b"k").unwrap(), None);

        engine.set(b("k"), b("v"), None);
        assert_eq!(engine.expire(&b("k"), -5), 1);
        assert_eq!(engine.ttl(b"k"), -2);
    }

    #[test]
    fn test_lazy_expiry() {
        let engine = StorageEngine::new();
        engine.set(b("k"), b("v"), Some(Duration::from_millis(40)));
        assert_eq!(engine.get(b"k").unwrap(), Some(b("v")));

        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(engine.get(b"k").unwrap(), None);
        assert_eq!(engine.exists(&[b("k")]), 0);
        assert_eq!(engine.ttl(b"k"), -2);
    }

    #[test]
    fn test_expired_collection_can_be_recreated_as_other_type() {
        let engine = StorageEngine::new();
        engine.rpush(&b("k"), vec![b("a")]).unwrap();
        engine.expire_in(&b("k"), Duration::from_millis(30));
        std::thread::sleep(Duration::from_millis(60));

        // The dead list must not cause a type error
        assert_eq!(engine.sadd(&b("k"), vec![b("m")]).unwrap(), 1);
        assert_eq!(engine.key_type(b"k"), "set");
    }

    #[test]
    fn test_mget() {
        let engine = StorageEngine::new();
        engine.set(b("a"), b("1"), None);
        engine.rpush(&b("l"), vec![b("x")]).unwrap();

        let got = engine.mget(&[b("a"), b("ghost"), b("l")]);
        assert_eq!(got, vec![Some(b("1")), None, None]);
    }

    #[test]
    fn test_lpush_rpush_order() {
        let engine = StorageEngine::new();
        assert_eq!(engine.lpush(&b("l"), vec![b("a"), b("b")]).unwrap(), 2);
        // b was pushed last, so it is at the head
        assert_eq!(
            engine.lrange(b"l", 0, -1).unwrap(),
            vec![b("b"), b("a")]
        );

        assert_eq!(engine.rpush(&b("l"), vec![b("c")]).unwrap(), 3);
        assert_eq!(
            engine.lrange(b"l", 0, -1).unwrap(),
            vec![b("b"), b("a"), b("c")]
        );
        assert_eq!(engine.llen(b"l").unwrap(), 3);
    }

    #[test]
    fn test_lrange_normalization() {
        let engine = StorageEngine::new();
        engine
            .rpush(&b("l"), vec![b("a"), b("b"), b("c"), b("d"), b("e")])
            .unwrap();

        assert_eq!(engine.lrange(b"l", 1, 3).unwrap(), vec![b("b"), b("c"), b("d")]);
        assert_eq!(engine.lrange(b"l", -3, -1).unwrap(), vec![b("c"), b("d"), b("e")]);
        assert_eq!(engine.lrange(b"l", 0, 100).unwrap().len(), 5);
        assert_eq!(engine.lrange(b"l", -100, 0).unwrap(), vec![b("a")]);
        assert!(engine.lrange(b"l", 3, 1).unwrap().is_empty());
        assert!(engine.lrange(b"l", 5, 9).unwrap().is_empty());
        assert!(engine.lrange(b"ghost", 0, -1).unwrap().is_empty());
    }

    #[test]
    fn test_pop_removes_drained_list() {
        let engine = StorageEngine::new();
        engine.rpush(&b("l"), vec![b("a"), b("b")]).unwrap();

        assert_eq!(engine.lpop(&b("l")).unwrap(), Some(b("a")));
        assert_eq!(engine.rpop(&b("l")).unwrap(), Some(b("b")));
        assert_eq!(engine.lpop(&b("l")).unwrap(), None);

        // Drained list behaves exactly like an absent key
        assert_eq!(engine.exists(&[b("l")]), 0);
        assert_eq!(engine.key_type(b"l"), "none");
    }

    #[test]
    fn test_lindex() {
        let engine = StorageEngine::new();
        engine.rpush(&b("l"), vec![b("a"), b("b"), b("c")]).unwrap();

        assert_eq!(engine.lindex(b"l", 0).unwrap(), Some(b("a")));
        assert_eq!(engine.lindex(b"l", -1).unwrap(), Some(b("c")));
        assert_eq!(engine.lindex(b"l", 3).unwrap(), None);
        assert_eq!(engine.lindex(b"l", -4).unwrap(), None);
    }

    #[test]
    fn test_hash_ops() {
        let engine = StorageEngine::new();
        assert_eq!(engine.hset(&b("h"), b("f1"), b("v1")).unwrap(), 1);
        assert_eq!(engine.hset(&b("h"), b("f1"), b("v2")).unwrap(), 0);
        assert_eq!(engine.hset(&b("h"), b("f2"), b("v3")).unwrap(), 1);

        assert_eq!(engine.hget(b"h", b"f1").unwrap(), Some(b("v2")));
        assert_eq!(engine.hget(b"h", b"ghost").unwrap(), None);
        assert!(engine.hexists(b"h", b"f2").unwrap());
        assert_eq!(engine.hlen(b"h").unwrap(), 2);

        let mut all = engine.hgetall(b"h").unwrap();
        all.sort();
        assert_eq!(all, vec![(b("f1"), b("v2")), (b("f2"), b("v3"))]);

        let mut keys = engine.hkeys(b"h").unwrap();
        keys.sort();
        assert_eq!(keys, vec![b("f1"), b("f2")]);
        assert_eq!(engine.hvals(b"h").unwrap().len(), 2);
    }

    #[test]
    fn test_hdel_removes_drained_hash() {
        let engine = StorageEngine::new();
        engine.hset(&b("h"), b("f1"), b("v1")).unwrap();
        engine.hset(&b("h"), b("f2"), b("v2")).unwrap();

        assert_eq!(engine.hdel(&b("h"), &[b("f1"), b("ghost")]).unwrap(), 1);
        assert_eq!(engine.hdel(&b("h"), &[b("f2")]).unwrap(), 1);
        assert_eq!(engine.key_type(b"h"), "none");
        assert_eq!(engine.hdel(&b("h"), &[b("f1")]).unwrap(), 0);
    }

    #[test]
    fn test_set_ops() {
        let engine = StorageEngine::new();
        assert_eq!(engine.sadd(&b("s"), vec![b("a"), b("b"), b("a")]).unwrap(), 2);
        assert_eq!(engine.sadd(&b("s"), vec![b("b"), b("c")]).unwrap(), 1);

        assert_eq!(engine.scard(b"s").unwrap(), 3);
        assert!(engine.sismember(b"s", b"a").unwrap());
        assert!(!engine.sismember(b"s", b"z").unwrap());
        assert!(!engine.sismember(b"ghost", b"a").unwrap());

        let mut members = engine.smembers(b"s").unwrap();
        members.sort();
        assert_eq!(members, vec![b("a"), b("b"), b("c")]);
        assert_eq!(members.len(), engine.scard(b"s").unwrap());
    }

    #[test]
    fn test_srem_removes_drained_set() {
        let engine = StorageEngine::new();
        engine.sadd(&b("s"), vec![b("a"), b("b")]).unwrap();
        assert_eq!(engine.srem(&b("s"), &[b("a"), b("ghost")]).unwrap(), 1);
        assert_eq!(engine.srem(&b("s"), &[b("b")]).unwrap(), 1);
        assert_eq!(engine.key_type(b"s"), "none");
    }

    #[test]
    fn test_sinter() {
        let engine = StorageEngine::new();
        engine.sadd(&b("s1"), vec![b("a"), b("b"), b("c")]).unwrap();
        engine.sadd(&b("s2"), vec![b("b"), b("c"), b("d")]).unwrap();

        let mut inter = engine.sinter(&[b("s1"), b("s2")]).unwrap();
        inter.sort();
        assert_eq!(inter, vec![b("b"), b("c")]);

        // Absent input key empties the intersection
        assert!(engine.sinter(&[b("s1"), b("ghost")]).unwrap().is_empty());

        // Wrong-typed input is an error even alongside an absent key
        engine.set(b("str"), b("x"), None);
        assert_eq!(
            engine.sinter(&[b("ghost"), b("str")]).unwrap_err(),
            StoreError::WrongType
        );
    }

    #[test]
    fn test_sunion() {
        let engine = StorageEngine::new();
        engine.sadd(&b("s1"), vec![b("a"), b("b")]).unwrap();
        engine.sadd(&b("s2"), vec![b("b"), b("c")]).unwrap();

        let mut union = engine.sunion(&[b("s1"), b("s2"), b("ghost")]).unwrap();
        union.sort();
        assert_eq!(union, vec![b("a"), b("b"), b("c")]);
    }

    #[test]
    fn test_zadd_and_ordering() {
        let engine = StorageEngine::new();
        assert_eq!(
            engine
                .zadd(&b("z"), vec![(2.0, b("bob")), (1.0, b("alice"))])
                .unwrap(),
            2
        );
        // Score update does not count as an insert
        assert_eq!(engine.zadd(&b("z"), vec![(3.0, b("bob"))]).unwrap(), 0);

        let range = engine.zrange(b"z", 0, -1).unwrap();
        assert_eq!(range[0], (b("alice"), 1.0));
        assert_eq!(range[1], (b("bob"), 3.0));
    }

    #[test]
    fn test_zrange_ties_break_on_member() {
        let engine = StorageEngine::new();
        engine
            .zadd(
                &b("z"),
                vec![(1.0, b("delta")), (1.0, b("alpha")), (0.5, b("omega"))],
            )
            .unwrap();

        let members: Vec<Bytes> = engine
            .zrange(b"z", 0, -1)
            .unwrap()
            .into_iter()
            .map(|(member, _)| member)
            .collect();
        assert_eq!(members, vec![b("omega"), b("alpha"), b("delta")]);
    }

    #[test]
    fn test_zrank_zscore_zcard() {
        let engine = StorageEngine::new();
        engine
            .zadd(&b("z"), vec![(1.0, b("alice")), (2.0, b("bob"))])
            .unwrap();

        assert_eq!(engine.zrank(b"z", b"alice").unwrap(), Some(0));
        assert_eq!(engine.zrank(b"z", b"bob").unwrap(), Some(1));
        assert_eq!(engine.zrank(b"z", b"ghost").unwrap(), None);
        assert_eq!(engine.zrank(b"ghost", b"alice").unwrap(), None);

        assert_eq!(engine.zscore(b"z", b"bob").unwrap(), Some(2.0));
        assert_eq!(engine.zscore(b"z", b"ghost").unwrap(), None);
        assert_eq!(engine.zcard(b"z").unwrap(), 2);
        assert_eq!(engine.zcard(b"ghost").unwrap(), 0);
    }

    #[test]
    fn test_zrem_removes_drained_zset() {
        let engine = StorageEngine::new();
        engine.zadd(&b("z"), vec![(1.0, b("a"))]).unwrap();
        assert_eq!(engine.zrem(&b("z"), &[b("a"), b("ghost")]).unwrap(), 1);
        assert_eq!(engine.key_type(b"z"), "none");
    }

    #[test]
    fn test_keys_glob_and_sorted() {
        let engine = StorageEngine::new();
        for key in ["abc", "axc", "az", "abb"] {
            engine.set(b(key), b("1"), None);
        }

        assert_eq!(engine.keys(b"a?c"), vec![b("abc"), b("axc")]);
        assert_eq!(engine.keys(b"ab[bc]"), vec![b("abb"), b("abc")]);
        assert_eq!(engine.keys(b"*"), vec![b("abb"), b("abc"), b("axc"), b("az")]);
        assert!(engine.keys(b"zzz*").is_empty());
    }

    #[test]
    fn test_keys_spans_all_families_and_skips_expired() {
        let engine = StorageEngine::new();
        engine.set(b("str"), b("1"), None);
        engine.rpush(&b("list"), vec![b("x")]).unwrap();
        engine.sadd(&b("set"), vec![b("m")]).unwrap();
        engine.set(b("dead"), b("1"), Some(Duration::from_millis(20)));

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(engine.keys(b"*"), vec![b("list"), b("set"), b("str")]);
    }

    #[test]
    fn test_len_and_flush() {
        let engine = StorageEngine::new();
        engine.set(b("a"), b("1"), None);
        engine.rpush(&b("l"), vec![b("x")]).unwrap();
        assert_eq!(engine.len(), 2);

        engine.flush();
        assert_eq!(engine.len(), 0);
        assert!(engine.is_empty());
    }

    #[test]
    fn test_cleanup_expired() {
        let engine = StorageEngine::new();
        engine.set(b("a"), b("1"), Some(Duration::from_millis(20)));
        engine.set(b("b"), b("2"), Some(Duration::from_millis(20)));
        engine.set(b("c"), b("3"), None);

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(engine.cleanup_expired(), 2);
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let engine = Arc::new(StorageEngine::new());
        let mut handles = vec![];

        for i in 0..8 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let key = b(&format!("key-{}-{}", i, j));
                    engine.set(key.clone(), b("value"), None);
                    engine.get(&key).unwrap();
                    engine.incr_by(&b(&format!("ctr-{}", i)), 1).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.len(), 808);
        for i in 0..8 {
            assert_eq!(
                engine.get(format!("ctr-{}", i).as_bytes()).unwrap(),
                Some(b("100"))
            );
        }
    }

    #[test]
    fn test_normalize_range() {
        assert_eq!(normalize_range(5, 0, -1), Some((0, 4)));
        assert_eq!(normalize_range(5, 1, 3), Some((1, 3)));
        assert_eq!(normalize_range(5, -3, -1), Some((2, 4)));
        assert_eq!(normalize_range(5, -100, 100), Some((0, 4)));
        assert_eq!(normalize_range(5, 3, 1), None);
        assert_eq!(normalize_range(5, 5, 9), None);
        assert_eq!(normalize_range(0, 0, -1), None);
    }
}
