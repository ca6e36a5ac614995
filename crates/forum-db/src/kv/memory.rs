use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::Mutex;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;

use super::backend::KvBackend;

/// In-process implementation of the key-value primitives, for tests and
/// single-process runs without a Redis server. Data lives as long as the
/// backend value does.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    strings: HashMap<String, String>,
    hashes: HashMap<String, HashMap<String, String>>,
    sorted_sets: HashMap<String, SortedSet>,
}

#[derive(Default)]
struct SortedSet {
    scores: HashMap<i64, i64>,
    ordered: BTreeSet<(i64, i64)>,
}

impl State {
    fn holds(&self, key: &str) -> bool {
        self.strings.contains_key(key)
            || self.hashes.contains_key(key)
            || self.sorted_sets.contains_key(key)
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> Result<T>) -> Result<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| anyhow!("memory backend lock poisoned: {}", e))?;
        f(&mut state)
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn incr(&self, key: &str) -> Result<i64> {
        self.with_state(|state| {
            let current = match state.strings.get(key) {
                Some(raw) => raw
                    .parse::<i64>()
                    .map_err(|_| anyhow!("value at {} is not an integer", key))?,
                None => 0,
            };
            let next = current + 1;
            state.strings.insert(key.to_string(), next.to_string());
            Ok(next)
        })
    }

    async fn hset_multiple(&self, key: &str, fields: &[(&str, String)]) -> Result<()> {
        self.with_state(|state| {
            let hash = state.hashes.entry(key.to_string()).or_default();
            for (field, value) in fields {
                hash.insert(field.to_string(), value.clone());
            }
            Ok(())
        })
    }

    async fn hset(&self, key: &str, field: &str, value: String) -> Result<()> {
        self.with_state(|state| {
            state
                .hashes
                .entry(key.to_string())
                .or_default()
                .insert(field.to_string(), value);
            Ok(())
        })
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        self.with_state(|state| Ok(state.hashes.get(key).cloned().unwrap_or_default()))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.with_state(|state| Ok(state.holds(key)))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_state(|state| Ok(state.strings.get(key).cloned()))
    }

    async fn set_nx(&self, key: &str, value: String) -> Result<bool> {
        self.with_state(|state| {
            if state.holds(key) {
                return Ok(false);
            }
            state.strings.insert(key.to_string(), value);
            Ok(true)
        })
    }

    async fn zadd(&self, key: &str, member: i64, score: i64) -> Result<()> {
        self.with_state(|state| {
            if state.strings.contains_key(key) || state.hashes.contains_key(key) {
                bail!("key {} holds a non sorted-set value", key);
            }
            let set = state.sorted_sets.entry(key.to_string()).or_default();
            if let Some(old) = set.scores.insert(member, score) {
                set.ordered.remove(&(old, member));
            }
            set.ordered.insert((score, member));
            Ok(())
        })
    }

    async fn zrange_by_score_after(
        &self,
        key: &str,
        after: i64,
        count: usize,
    ) -> Result<Vec<i64>> {
        self.with_state(|state| {
            let Some(set) = state.sorted_sets.get(key) else {
                return Ok(Vec::new());
            };
            let members = set
                .ordered
                .range((Bound::Excluded((after, i64::MAX)), Bound::Unbounded))
                .take(count)
                .map(|(_, member)| *member)
                .collect();
            Ok(members)
        })
    }
}
