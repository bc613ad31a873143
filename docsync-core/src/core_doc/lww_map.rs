/*
    lww_map.rs - Last-Write-Wins map

    Each key holds the value of the write with the greatest stamp.
    Stamps compare by Lamport time first, client id second, so every
    replica that has seen the same set of writes picks the same winner
    regardless of the order they were applied in.
*/

use std::collections::BTreeMap;

use super::state_vector::ClientId;

/// Total order over writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Stamp {
    pub lamport: u64,
    pub client: ClientId,
}

#[derive(Debug, Clone)]
struct Entry {
    value: Option<String>,
    stamp: Stamp,
}

#[derive(Debug, Clone, Default)]
pub struct LwwMap {
    entries: BTreeMap<String, Entry>,
}

impl LwwMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a write. Returns true if it became the visible value.
    pub fn apply(&mut self, key: &str, value: Option<String>, stamp: Stamp) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) if entry.stamp >= stamp => false,
            Some(entry) => {
                entry.value = value;
                entry.stamp = stamp;
                true
            }
            None => {
                self.entries.insert(key.to_string(), Entry { value, stamp });
                true
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(|e| e.value.as_deref())
    }

    /// Visible key/value pairs (tombstones excluded)
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .filter_map(|(k, e)| e.value.clone().map(|v| (k.clone(), v)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.values().filter(|e| e.value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
