//! In-memory reference implementation of `StoreClient`
//!
//! Backed by a single `RwLock`-guarded map of tagged values. Semantics
//! follow the store the engine was designed against:
//! - keys hold exactly one structure kind; mixing kinds is an error
//! - TTLs are checked lazily on access, expired keys read as absent
//! - sorted sets order by score ascending, ties by member lexicographic
//! - rank ranges are inclusive and accept negative from-the-end indices
//! - `execute_batch` applies its commands under one write lock,
//!   all-or-nothing: every command is type-checked before any applies
//!
//! Useful as the test double for the whole engine and as the reference
//! for what a networked client must implement.

use lattice_core::error::{Error, Result};
use lattice_core::traits::{Aggregate, Command, SortBy, SortOrder, StoreClient};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};

/// One stored structure
#[derive(Debug, Clone)]
enum Stored {
    Str(String),
    Hash(BTreeMap<String, String>),
    Set(BTreeSet<String>),
    /// member → score; rank order is computed on read
    SortedSet(BTreeMap<String, f64>),
}

impl Stored {
    fn kind(&self) -> &'static str {
        match self {
            Stored::Str(_) => "string",
            Stored::Hash(_) => "hash",
            Stored::Set(_) => "set",
            Stored::SortedSet(_) => "sorted set",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Stored,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(value: Stored) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|t| t <= now).unwrap_or(false)
    }
}

/// In-memory store speaking the full `StoreClient` surface
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, Entry>>,
}

fn wrong_type(key: &str, expected: &'static str) -> Error {
    Error::WrongType {
        key: key.to_string(),
        expected,
    }
}

/// Normalize a possibly negative rank index against a length
fn normalize_rank(index: i64, len: usize) -> i64 {
    if index < 0 {
        index + len as i64
    } else {
        index
    }
}

/// Members of a sorted set in rank order for the given traversal
fn ranked_members(map: &BTreeMap<String, f64>, order: SortOrder) -> Vec<(String, f64)> {
    let mut pairs: Vec<(String, f64)> = map.iter().map(|(m, s)| (m.clone(), *s)).collect();
    pairs.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    if order == SortOrder::Desc {
        pairs.reverse();
    }
    pairs
}

/// Slice an ordered list by an inclusive, possibly negative rank range
fn slice_rank_range<T: Clone>(items: &[T], start: i64, stop: i64) -> Vec<T> {
    let len = items.len();
    let start = normalize_rank(start, len).max(0);
    let stop = normalize_rank(stop, len).min(len as i64 - 1);
    if start > stop || start >= len as i64 {
        return Vec::new();
    }
    items[start as usize..=stop as usize].to_vec()
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining time-to-live of a key, if one is set
    ///
    /// Inherent helper for tests asserting expiry was applied; not part
    /// of the `StoreClient` surface.
    pub fn time_to_live(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let data = self.data.read();
        let entry = data.get(key)?;
        if entry.is_expired(now) {
            return None;
        }
        entry.expires_at.map(|t| t.saturating_duration_since(now))
    }

    /// Whether a key currently exists (TTL-aware)
    pub fn key_exists(&self, key: &str) -> bool {
        let now = Instant::now();
        self.data
            .read()
            .get(key)
            .map(|e| !e.is_expired(now))
            .unwrap_or(false)
    }

    fn read_value<T>(&self, key: &str, f: impl FnOnce(Option<&Stored>) -> Result<T>) -> Result<T> {
        let now = Instant::now();
        let data = self.data.read();
        match data.get(key) {
            Some(entry) if !entry.is_expired(now) => f(Some(&entry.value)),
            _ => f(None),
        }
    }

    /// Run `f` over the live entry map with expired keys purged
    fn write_data<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>) -> Result<T>) -> Result<T> {
        let now = Instant::now();
        let mut data = self.data.write();
        data.retain(|_, entry| !entry.is_expired(now));
        f(&mut data)
    }

    /// Member → score view of a source key: sorted sets as-is, plain
    /// sets with score 1, absent keys empty
    fn source_scores(data: &HashMap<String, Entry>, key: &str) -> Result<BTreeMap<String, f64>> {
        match data.get(key).map(|e| &e.value) {
            None => Ok(BTreeMap::new()),
            Some(Stored::Set(members)) => {
                Ok(members.iter().map(|m| (m.clone(), 1.0)).collect())
            }
            Some(Stored::SortedSet(map)) => Ok(map.clone()),
            Some(_) => Err(wrong_type(key, "set or sorted set")),
        }
    }

    fn combine_sorted(
        &self,
        dest: &str,
        sources: &[String],
        weights: Option<&[f64]>,
        aggregate: Aggregate,
        intersect: bool,
    ) -> Result<usize> {
        self.write_data(|data| {
            let mut combined: BTreeMap<String, (f64, usize)> = BTreeMap::new();
            for (i, source) in sources.iter().enumerate() {
                let weight = weights.and_then(|w| w.get(i)).copied().unwrap_or(1.0);
                for (member, score) in Self::source_scores(data, source)? {
                    let weighted = score * weight;
                    combined
                        .entry(member)
                        .and_modify(|(acc, seen)| {
                            *acc = match aggregate {
                                Aggregate::Sum => *acc + weighted,
                                Aggregate::Min => acc.min(weighted),
                                Aggregate::Max => acc.max(weighted),
                            };
                            *seen += 1;
                        })
                        .or_insert((weighted, 1));
                }
            }
            let result: BTreeMap<String, f64> = combined
                .into_iter()
                .filter(|(_, (_, seen))| !intersect || *seen == sources.len())
                .map(|(member, (score, _))| (member, score))
                .collect();
            let size = result.len();
            data.insert(dest.to_string(), Entry::live(Stored::SortedSet(result)));
            Ok(size)
        })
    }

    fn combine_plain(&self, dest: &str, sources: &[String], intersect: bool) -> Result<usize> {
        self.write_data(|data| {
            let mut sets: Vec<BTreeSet<String>> = Vec::with_capacity(sources.len());
            for source in sources {
                let members = Self::source_scores(data, source)?
                    .into_keys()
                    .collect::<BTreeSet<_>>();
                sets.push(members);
            }
            let result: BTreeSet<String> = match sets.split_first() {
                None => BTreeSet::new(),
                Some((first, rest)) => {
                    let mut acc = first.clone();
                    for s in rest {
                        if intersect {
                            acc = acc.intersection(s).cloned().collect();
                        } else {
                            acc.extend(s.iter().cloned());
                        }
                    }
                    acc
                }
            };
            let size = result.len();
            data.insert(dest.to_string(), Entry::live(Stored::Set(result)));
            Ok(size)
        })
    }

    /// Comparator for external sort values: numeric when both parse,
    /// lexicographic otherwise, missing values first
    fn compare_sort_values(a: &Option<String>, b: &Option<String>) -> Ordering {
        match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => match (x.parse::<f64>(), y.parse::<f64>()) {
                (Ok(nx), Ok(ny)) => nx.partial_cmp(&ny).unwrap_or(Ordering::Equal),
                _ => x.cmp(y),
            },
        }
    }

    fn apply_command(data: &mut HashMap<String, Entry>, command: &Command) {
        match command {
            Command::SetAdd { key, member } => {
                let entry = data
                    .entry(key.clone())
                    .or_insert_with(|| Entry::live(Stored::Set(BTreeSet::new())));
                if let Stored::Set(members) = &mut entry.value {
                    members.insert(member.clone());
                }
            }
            Command::SetRemove { key, member } => {
                let mut empty = false;
                if let Some(entry) = data.get_mut(key) {
                    if let Stored::Set(members) = &mut entry.value {
                        members.remove(member);
                        empty = members.is_empty();
                    }
                }
                if empty {
                    data.remove(key);
                }
            }
            Command::SortedSetAdd { key, member, score } => {
                let entry = data
                    .entry(key.clone())
                    .or_insert_with(|| Entry::live(Stored::SortedSet(BTreeMap::new())));
                if let Stored::SortedSet(map) = &mut entry.value {
                    map.insert(member.clone(), *score);
                }
            }
            Command::SortedSetRemove { key, member } => {
                let mut empty = false;
                if let Some(entry) = data.get_mut(key) {
                    if let Stored::SortedSet(map) = &mut entry.value {
                        map.remove(member);
                        empty = map.is_empty();
                    }
                }
                if empty {
                    data.remove(key);
                }
            }
            Command::Delete { key } => {
                data.remove(key);
            }
            Command::Expire { key, ttl } => {
                if let Some(entry) = data.get_mut(key) {
                    entry.expires_at = Some(Instant::now() + *ttl);
                }
            }
        }
    }

    fn check_command(data: &HashMap<String, Entry>, command: &Command) -> Result<()> {
        let check = |key: &str, want_sorted: bool| -> Result<()> {
            match data.get(key).map(|e| &e.value) {
                None => Ok(()),
                Some(Stored::Set(_)) if !want_sorted => Ok(()),
                Some(Stored::SortedSet(_)) if want_sorted => Ok(()),
                Some(_) => Err(wrong_type(key, if want_sorted { "sorted set" } else { "set" })),
            }
        };
        match command {
            Command::SetAdd { key, .. } | Command::SetRemove { key, .. } => check(key, false),
            Command::SortedSetAdd { key, .. } | Command::SortedSetRemove { key, .. } => {
                check(key, true)
            }
            Command::Delete { .. } | Command::Expire { .. } => Ok(()),
        }
    }
}

impl StoreClient for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.read_value(key, |v| match v {
            None => Ok(None),
            Some(Stored::Str(s)) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key, "string")),
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.write_data(|data| {
            data.insert(key.to_string(), Entry::live(Stored::Str(value.to_string())));
            Ok(())
        })
    }

    fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        keys.iter().map(|k| self.get(k)).collect()
    }

    fn increment_by(&self, key: &str, amount: i64) -> Result<i64> {
        self.write_data(|data| {
            let entry = data
                .entry(key.to_string())
                .or_insert_with(|| Entry::live(Stored::Str("0".to_string())));
            match &mut entry.value {
                Stored::Str(raw) => {
                    let current = raw.parse::<i64>().map_err(|_| {
                        Error::Encoding(format!("value at {} is not an integer", key))
                    })?;
                    let next = current + amount;
                    *raw = next.to_string();
                    Ok(next)
                }
                _ => Err(wrong_type(key, "string")),
            }
        })
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.write_data(|data| Ok(data.remove(key).is_some()))
    }

    fn hash_get_all(&self, key: &str) -> Result<Option<BTreeMap<String, String>>> {
        self.read_value(key, |v| match v {
            None => Ok(None),
            Some(Stored::Hash(fields)) => Ok(Some(fields.clone())),
            Some(_) => Err(wrong_type(key, "hash")),
        })
    }

    fn multi_hash_get(&self, keys: &[String]) -> Result<Vec<Option<BTreeMap<String, String>>>> {
        keys.iter().map(|k| self.hash_get_all(k)).collect()
    }

    fn hash_set_multi(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        self.write_data(|data| {
            let entry = data
                .entry(key.to_string())
                .or_insert_with(|| Entry::live(Stored::Hash(BTreeMap::new())));
            match &mut entry.value {
                Stored::Hash(existing) => {
                    for (field, value) in fields {
                        existing.insert(field.clone(), value.clone());
                    }
                    Ok(())
                }
                _ => Err(wrong_type(key, "hash")),
            }
        })
    }

    fn hash_increment_by(&self, key: &str, field: &str, amount: i64) -> Result<i64> {
        self.write_data(|data| {
            let entry = data
                .entry(key.to_string())
                .or_insert_with(|| Entry::live(Stored::Hash(BTreeMap::new())));
            match &mut entry.value {
                Stored::Hash(fields) => {
                    let current = match fields.get(field) {
                        None => 0,
                        Some(raw) => raw.parse::<i64>().map_err(|_| {
                            Error::Encoding(format!(
                                "hash field {}.{} is not an integer",
                                key, field
                            ))
                        })?,
                    };
                    let next = current + amount;
                    fields.insert(field.to_string(), next.to_string());
                    Ok(next)
                }
                _ => Err(wrong_type(key, "hash")),
            }
        })
    }

    fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        self.write_data(|data| {
            let entry = data
                .entry(key.to_string())
                .or_insert_with(|| Entry::live(Stored::Set(BTreeSet::new())));
            match &mut entry.value {
                Stored::Set(members) => Ok(members.insert(member.to_string())),
                _ => Err(wrong_type(key, "set")),
            }
        })
    }

    fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        self.write_data(|data| {
            let (removed, empty) = match data.get_mut(key) {
                None => return Ok(false),
                Some(entry) => match &mut entry.value {
                    Stored::Set(members) => (members.remove(member), members.is_empty()),
                    _ => return Err(wrong_type(key, "set")),
                },
            };
            if empty {
                data.remove(key);
            }
            Ok(removed)
        })
    }

    fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.read_value(key, |v| match v {
            None => Ok(Vec::new()),
            Some(Stored::Set(members)) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key, "set")),
        })
    }

    fn set_cardinality(&self, key: &str) -> Result<usize> {
        self.read_value(key, |v| match v {
            None => Ok(0),
            Some(Stored::Set(members)) => Ok(members.len()),
            Some(_) => Err(wrong_type(key, "set")),
        })
    }

    fn set_is_member(&self, key: &str, member: &str) -> Result<bool> {
        self.read_value(key, |v| match v {
            None => Ok(false),
            Some(Stored::Set(members)) => Ok(members.contains(member)),
            Some(_) => Err(wrong_type(key, "set")),
        })
    }

    fn set_union_into(&self, dest: &str, sources: &[String]) -> Result<usize> {
        self.combine_plain(dest, sources, false)
    }

    fn set_intersect_into(&self, dest: &str, sources: &[String]) -> Result<usize> {
        self.combine_plain(dest, sources, true)
    }

    fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> Result<bool> {
        self.write_data(|data| {
            let entry = data
                .entry(key.to_string())
                .or_insert_with(|| Entry::live(Stored::SortedSet(BTreeMap::new())));
            match &mut entry.value {
                Stored::SortedSet(map) => Ok(map.insert(member.to_string(), score).is_none()),
                _ => Err(wrong_type(key, "sorted set")),
            }
        })
    }

    fn sorted_set_remove(&self, key: &str, member: &str) -> Result<bool> {
        self.write_data(|data| {
            let (removed, empty) = match data.get_mut(key) {
                None => return Ok(false),
                Some(entry) => match &mut entry.value {
                    Stored::SortedSet(map) => (map.remove(member).is_some(), map.is_empty()),
                    _ => return Err(wrong_type(key, "sorted set")),
                },
            };
            if empty {
                data.remove(key);
            }
            Ok(removed)
        })
    }

    fn sorted_set_range(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        order: SortOrder,
    ) -> Result<Vec<String>> {
        Ok(self
            .sorted_set_range_with_scores(key, start, stop, order)?
            .into_iter()
            .map(|(member, _)| member)
            .collect())
    }

    fn sorted_set_range_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        order: SortOrder,
    ) -> Result<Vec<(String, f64)>> {
        self.read_value(key, |v| match v {
            None => Ok(Vec::new()),
            Some(Stored::SortedSet(map)) => {
                Ok(slice_rank_range(&ranked_members(map, order), start, stop))
            }
            Some(_) => Err(wrong_type(key, "sorted set")),
        })
    }

    fn sorted_set_range_by_score(
        &self,
        key: &str,
        min: Option<f64>,
        max: Option<f64>,
        page: Option<(usize, usize)>,
        order: SortOrder,
    ) -> Result<Vec<(String, f64)>> {
        self.read_value(key, |v| match v {
            None => Ok(Vec::new()),
            Some(Stored::SortedSet(map)) => {
                let mut pairs: Vec<(String, f64)> = ranked_members(map, order)
                    .into_iter()
                    .filter(|(_, s)| min.map(|m| *s >= m).unwrap_or(true))
                    .filter(|(_, s)| max.map(|m| *s <= m).unwrap_or(true))
                    .collect();
                if let Some((offset, count)) = page {
                    pairs = pairs.into_iter().skip(offset).take(count).collect();
                }
                Ok(pairs)
            }
            Some(_) => Err(wrong_type(key, "sorted set")),
        })
    }

    fn sorted_set_rank(
        &self,
        key: &str,
        member: &str,
        order: SortOrder,
    ) -> Result<Option<usize>> {
        self.read_value(key, |v| match v {
            None => Ok(None),
            Some(Stored::SortedSet(map)) => Ok(ranked_members(map, order)
                .iter()
                .position(|(m, _)| m == member)),
            Some(_) => Err(wrong_type(key, "sorted set")),
        })
    }

    fn sorted_set_cardinality(&self, key: &str) -> Result<usize> {
        self.read_value(key, |v| match v {
            None => Ok(0),
            Some(Stored::SortedSet(map)) => Ok(map.len()),
            Some(_) => Err(wrong_type(key, "sorted set")),
        })
    }

    fn sorted_set_score(&self, key: &str, member: &str) -> Result<Option<f64>> {
        self.read_value(key, |v| match v {
            None => Ok(None),
            Some(Stored::SortedSet(map)) => Ok(map.get(member).copied()),
            Some(_) => Err(wrong_type(key, "sorted set")),
        })
    }

    fn sorted_set_union_into(
        &self,
        dest: &str,
        sources: &[String],
        weights: Option<&[f64]>,
        aggregate: Aggregate,
    ) -> Result<usize> {
        self.combine_sorted(dest, sources, weights, aggregate, false)
    }

    fn sorted_set_intersect_into(
        &self,
        dest: &str,
        sources: &[String],
        weights: Option<&[f64]>,
        aggregate: Aggregate,
    ) -> Result<usize> {
        self.combine_sorted(dest, sources, weights, aggregate, true)
    }

    fn external_sort(
        &self,
        key: &str,
        by: &SortBy,
        page: Option<(usize, usize)>,
        order: SortOrder,
    ) -> Result<Vec<String>> {
        let now = Instant::now();
        let data = self.data.read();
        let members: Vec<String> = match data.get(key) {
            Some(entry) if !entry.is_expired(now) => match &entry.value {
                Stored::Set(members) => members.iter().cloned().collect(),
                Stored::SortedSet(map) => map.keys().cloned().collect(),
                _ => return Err(wrong_type(key, "set or sorted set")),
            },
            _ => Vec::new(),
        };

        let mut sorted = match by {
            SortBy::Unsorted => members,
            SortBy::Natural => {
                let mut pairs: Vec<(String, Option<String>)> =
                    members.into_iter().map(|m| (m.clone(), Some(m))).collect();
                pairs.sort_by(|a, b| Self::compare_sort_values(&a.1, &b.1));
                pairs.into_iter().map(|(m, _)| m).collect()
            }
            SortBy::Pattern(pattern) => {
                let (key_pattern, field) = pattern.split_once("->").ok_or_else(|| {
                    Error::InvalidQuery(format!("malformed sort pattern: {}", pattern))
                })?;
                let mut pairs: Vec<(String, Option<String>)> = members
                    .into_iter()
                    .map(|member| {
                        let target = key_pattern.replace('*', &member);
                        let value = match data.get(&target).map(|e| &e.value) {
                            Some(Stored::Hash(fields)) => fields.get(field).cloned(),
                            _ => None,
                        };
                        (member, value)
                    })
                    .collect();
                pairs.sort_by(|a, b| Self::compare_sort_values(&a.1, &b.1));
                pairs.into_iter().map(|(m, _)| m).collect()
            }
        };

        if order == SortOrder::Desc && !matches!(by, SortBy::Unsorted) {
            sorted.reverse();
        }
        if let Some((offset, count)) = page {
            sorted = sorted.into_iter().skip(offset).take(count).collect();
        }
        Ok(sorted)
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.write_data(|data| match data.get_mut(key) {
            None => Ok(false),
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
        })
    }

    fn keys_matching_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let now = Instant::now();
        let data = self.data.read();
        let mut keys: Vec<String> = data
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && !e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn execute_batch(&self, commands: &[Command]) -> Result<()> {
        self.write_data(|data| {
            for command in commands {
                Self::check_command(data, command)?;
            }
            for command in commands {
                Self::apply_command(data, command);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::new()
    }

    #[test]
    fn test_string_round_trip() {
        let s = store();
        assert_eq!(s.get("k").unwrap(), None);
        s.set("k", "v").unwrap();
        assert_eq!(s.get("k").unwrap(), Some("v".to_string()));
        assert!(s.delete("k").unwrap());
        assert_eq!(s.get("k").unwrap(), None);
    }

    #[test]
    fn test_multi_get_preserves_order_and_gaps() {
        let s = store();
        s.set("a", "1").unwrap();
        s.set("c", "3").unwrap();
        let out = s
            .multi_get(&["a".to_string(), "b".to_string(), "c".to_string()])
            .unwrap();
        assert_eq!(out, vec![Some("1".to_string()), None, Some("3".to_string())]);
    }

    #[test]
    fn test_wrong_type_guard() {
        let s = store();
        s.set_add("k", "1").unwrap();
        assert!(matches!(s.get("k"), Err(Error::WrongType { .. })));
        assert!(matches!(
            s.sorted_set_add("k", "1", 1.0),
            Err(Error::WrongType { .. })
        ));
    }

    #[test]
    fn test_hash_fields() {
        let s = store();
        s.hash_set_multi(
            "h",
            &[
                ("name".to_string(), "\"a\"".to_string()),
                ("value".to_string(), "1".to_string()),
            ],
        )
        .unwrap();
        let fields = s.hash_get_all("h").unwrap().unwrap();
        assert_eq!(fields.get("name").unwrap(), "\"a\"");
        assert_eq!(fields.len(), 2);
        assert_eq!(s.hash_get_all("missing").unwrap(), None);
    }

    #[test]
    fn test_hash_increment() {
        let s = store();
        assert_eq!(s.hash_increment_by("h", "hits", 2).unwrap(), 2);
        assert_eq!(s.hash_increment_by("h", "hits", 3).unwrap(), 5);
        s.hash_set_multi("h", &[("bad".to_string(), "\"x\"".to_string())])
            .unwrap();
        assert!(matches!(
            s.hash_increment_by("h", "bad", 1),
            Err(Error::Encoding(_))
        ));
    }

    #[test]
    fn test_counter_increment() {
        let s = store();
        assert_eq!(s.increment_by("c", 1).unwrap(), 1);
        assert_eq!(s.increment_by("c", 4).unwrap(), 5);
        assert_eq!(s.get("c").unwrap(), Some("5".to_string()));
        s.set("text", "abc").unwrap();
        assert!(matches!(s.increment_by("text", 1), Err(Error::Encoding(_))));
        s.set_add("s", "1").unwrap();
        assert!(matches!(s.increment_by("s", 1), Err(Error::WrongType { .. })));
    }

    #[test]
    fn test_set_membership() {
        let s = store();
        assert!(s.set_add("k", "1").unwrap());
        assert!(!s.set_add("k", "1").unwrap());
        assert!(s.set_is_member("k", "1").unwrap());
        assert!(!s.set_is_member("k", "2").unwrap());
        assert_eq!(s.set_cardinality("k").unwrap(), 1);
        assert!(s.set_remove("k", "1").unwrap());
        assert_eq!(s.set_cardinality("k").unwrap(), 0);
    }

    #[test]
    fn test_set_intersect_into() {
        let s = store();
        for m in ["1", "2", "3"] {
            s.set_add("a", m).unwrap();
        }
        for m in ["2", "3", "4"] {
            s.set_add("b", m).unwrap();
        }
        let n = s
            .set_intersect_into("dest", &["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(s.set_members("dest").unwrap(), vec!["2", "3"]);
    }

    #[test]
    fn test_set_union_into() {
        let s = store();
        s.set_add("a", "1").unwrap();
        s.set_add("b", "2").unwrap();
        let n = s
            .set_union_into("dest", &["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn test_sorted_set_rank_order() {
        let s = store();
        s.sorted_set_add("z", "a", 3.0).unwrap();
        s.sorted_set_add("z", "b", 1.0).unwrap();
        s.sorted_set_add("z", "c", 2.0).unwrap();
        assert_eq!(
            s.sorted_set_range("z", 0, -1, SortOrder::Asc).unwrap(),
            vec!["b", "c", "a"]
        );
        assert_eq!(
            s.sorted_set_range("z", 0, -1, SortOrder::Desc).unwrap(),
            vec!["a", "c", "b"]
        );
    }

    #[test]
    fn test_sorted_set_tie_break_lexicographic() {
        let s = store();
        s.sorted_set_add("z", "beta", 1.0).unwrap();
        s.sorted_set_add("z", "alpha", 1.0).unwrap();
        assert_eq!(
            s.sorted_set_range("z", 0, -1, SortOrder::Asc).unwrap(),
            vec!["alpha", "beta"]
        );
    }

    #[test]
    fn test_sorted_set_negative_range() {
        let s = store();
        for (m, score) in [("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0)] {
            s.sorted_set_add("z", m, score).unwrap();
        }
        assert_eq!(
            s.sorted_set_range("z", -2, -1, SortOrder::Asc).unwrap(),
            vec!["c", "d"]
        );
        assert_eq!(
            s.sorted_set_range("z", 1, 2, SortOrder::Desc).unwrap(),
            vec!["c", "b"]
        );
        assert!(s.sorted_set_range("z", 5, 9, SortOrder::Asc).unwrap().is_empty());
    }

    #[test]
    fn test_sorted_set_rank_both_orders() {
        let s = store();
        s.sorted_set_add("z", "low", 1.0).unwrap();
        s.sorted_set_add("z", "high", 9.0).unwrap();
        assert_eq!(s.sorted_set_rank("z", "low", SortOrder::Asc).unwrap(), Some(0));
        assert_eq!(s.sorted_set_rank("z", "low", SortOrder::Desc).unwrap(), Some(1));
        assert_eq!(s.sorted_set_rank("z", "missing", SortOrder::Asc).unwrap(), None);
    }

    #[test]
    fn test_sorted_set_range_by_score() {
        let s = store();
        for (m, score) in [("a", 1.0), ("b", 2.0), ("c", 3.0)] {
            s.sorted_set_add("z", m, score).unwrap();
        }
        let out = s
            .sorted_set_range_by_score("z", Some(2.0), None, None, SortOrder::Asc)
            .unwrap();
        assert_eq!(out, vec![("b".to_string(), 2.0), ("c".to_string(), 3.0)]);
        let paged = s
            .sorted_set_range_by_score("z", None, None, Some((1, 1)), SortOrder::Desc)
            .unwrap();
        assert_eq!(paged, vec![("b".to_string(), 2.0)]);
    }

    #[test]
    fn test_sorted_intersect_aggregates_max() {
        let s = store();
        s.sorted_set_add("a", "1", 2.0).unwrap();
        s.sorted_set_add("a", "2", 5.0).unwrap();
        s.sorted_set_add("b", "1", 7.0).unwrap();
        let n = s
            .sorted_set_intersect_into(
                "dest",
                &["a".to_string(), "b".to_string()],
                None,
                Aggregate::Max,
            )
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(s.sorted_set_score("dest", "1").unwrap(), Some(7.0));
    }

    #[test]
    fn test_sorted_intersect_accepts_plain_sets() {
        let s = store();
        s.set_add("plain", "1").unwrap();
        s.set_add("plain", "2").unwrap();
        s.sorted_set_add("ranked", "1", 4.0).unwrap();
        let n = s
            .sorted_set_intersect_into(
                "dest",
                &["plain".to_string(), "ranked".to_string()],
                None,
                Aggregate::Max,
            )
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(s.sorted_set_score("dest", "1").unwrap(), Some(4.0));
    }

    #[test]
    fn test_sorted_union_weights() {
        let s = store();
        s.sorted_set_add("a", "1", 2.0).unwrap();
        s.sorted_set_add("b", "1", 3.0).unwrap();
        let weights = [10.0, 1.0];
        s.sorted_set_union_into(
            "dest",
            &["a".to_string(), "b".to_string()],
            Some(&weights),
            Aggregate::Max,
        )
        .unwrap();
        assert_eq!(s.sorted_set_score("dest", "1").unwrap(), Some(20.0));
    }

    #[test]
    fn test_external_sort_natural() {
        let s = store();
        for m in ["10", "2", "1"] {
            s.set_add("k", m).unwrap();
        }
        assert_eq!(
            s.external_sort("k", &SortBy::Natural, None, SortOrder::Asc).unwrap(),
            vec!["1", "2", "10"]
        );
        assert_eq!(
            s.external_sort("k", &SortBy::Natural, None, SortOrder::Desc).unwrap(),
            vec!["10", "2", "1"]
        );
    }

    #[test]
    fn test_external_sort_by_hash_pattern() {
        let s = store();
        for id in ["1", "2", "3"] {
            s.set_add("ids", id).unwrap();
        }
        s.hash_set_multi("rec:1", &[("name".to_string(), "c".to_string())])
            .unwrap();
        s.hash_set_multi("rec:2", &[("name".to_string(), "a".to_string())])
            .unwrap();
        s.hash_set_multi("rec:3", &[("name".to_string(), "b".to_string())])
            .unwrap();
        let out = s
            .external_sort(
                "ids",
                &SortBy::Pattern("rec:*->name".to_string()),
                None,
                SortOrder::Asc,
            )
            .unwrap();
        assert_eq!(out, vec!["2", "3", "1"]);
    }

    #[test]
    fn test_external_sort_pagination_pushdown() {
        let s = store();
        for m in ["1", "2", "3", "4"] {
            s.set_add("k", m).unwrap();
        }
        let out = s
            .external_sort("k", &SortBy::Natural, Some((1, 2)), SortOrder::Asc)
            .unwrap();
        assert_eq!(out, vec!["2", "3"]);
    }

    #[test]
    fn test_expire_hides_key() {
        let s = store();
        s.set("k", "v").unwrap();
        assert!(s.expire("k", Duration::from_secs(0)).unwrap());
        assert_eq!(s.get("k").unwrap(), None);
        assert!(!s.key_exists("k"));
        assert!(!s.expire("missing", Duration::from_secs(1)).unwrap());
    }

    #[test]
    fn test_time_to_live_reported() {
        let s = store();
        s.set("k", "v").unwrap();
        s.expire("k", Duration::from_secs(300)).unwrap();
        let ttl = s.time_to_live("k").unwrap();
        assert!(ttl <= Duration::from_secs(300));
        assert!(ttl > Duration::from_secs(290));
    }

    #[test]
    fn test_keys_matching_prefix() {
        let s = store();
        s.set("a:1", "x").unwrap();
        s.set("a:2", "y").unwrap();
        s.set("b:1", "z").unwrap();
        assert_eq!(s.keys_matching_prefix("a:").unwrap(), vec!["a:1", "a:2"]);
    }

    #[test]
    fn test_batch_applies_all() {
        let s = store();
        s.execute_batch(&[
            Command::SetAdd {
                key: "k".to_string(),
                member: "1".to_string(),
            },
            Command::SortedSetAdd {
                key: "z".to_string(),
                member: "1".to_string(),
                score: 2.0,
            },
        ])
        .unwrap();
        assert!(s.set_is_member("k", "1").unwrap());
        assert_eq!(s.sorted_set_score("z", "1").unwrap(), Some(2.0));
    }

    #[test]
    fn test_batch_all_or_nothing_on_type_error() {
        let s = store();
        s.set("taken", "a string").unwrap();
        let result = s.execute_batch(&[
            Command::SetAdd {
                key: "fresh".to_string(),
                member: "1".to_string(),
            },
            Command::SetAdd {
                key: "taken".to_string(),
                member: "1".to_string(),
            },
        ]);
        assert!(matches!(result, Err(Error::WrongType { .. })));
        assert!(!s.key_exists("fresh"));
    }

    #[test]
    fn test_multi_hash_get() {
        let s = store();
        s.hash_set_multi("h1", &[("a".to_string(), "1".to_string())])
            .unwrap();
        s.hash_set_multi("h3", &[("b".to_string(), "2".to_string())])
            .unwrap();
        let got = s
            .multi_hash_get(&["h1".to_string(), "h2".to_string(), "h3".to_string()])
            .unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].as_ref().unwrap().get("a"), Some(&"1".to_string()));
        assert!(got[1].is_none());
        assert_eq!(got[2].as_ref().unwrap().get("b"), Some(&"2".to_string()));
    }

    #[test]
    fn test_empty_sets_vanish() {
        let s = store();
        s.set_add("k", "1").unwrap();
        s.set_remove("k", "1").unwrap();
        assert!(!s.key_exists("k"));
        s.sorted_set_add("z", "1", 1.0).unwrap();
        s.sorted_set_remove("z", "1").unwrap();
        assert!(!s.key_exists("z"));
    }

    proptest::proptest! {
        #[test]
        fn prop_sorted_range_orders_are_reverses(
            entries in proptest::collection::hash_map(
                "[a-z]{1,6}",
                -1000i64..1000,
                0..24,
            )
        ) {
            let s = store();
            for (member, score) in &entries {
                s.sorted_set_add("z", member, *score as f64).unwrap();
            }
            let asc = s.sorted_set_range("z", 0, -1, SortOrder::Asc).unwrap();
            let mut desc = s.sorted_set_range("z", 0, -1, SortOrder::Desc).unwrap();
            desc.reverse();
            proptest::prop_assert_eq!(asc, desc);
        }
    }
}
