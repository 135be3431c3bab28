// ===============================
// src/ledger.rs (cargo hold: ship or carrier)
// ===============================
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Resource symbol -> tons. Keys are lower-cased; a missing key means zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CargoLedger {
    items: BTreeMap<String, i64>,
}

impl CargoLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, resource: &str, qty: i64) -> i64 {
        let entry = self.items.entry(resource.to_lowercase()).or_insert(0);
        *entry += qty;
        *entry
    }

    /// Removing more than we hold means we missed an event somewhere; clamp to zero.
    pub fn remove(&mut self, resource: &str, qty: i64) -> i64 {
        let entry = self.items.entry(resource.to_lowercase()).or_insert(0);
        *entry = (*entry - qty).max(0);
        *entry
    }

    pub fn get(&self, resource: &str) -> i64 {
        // fast path: keys from events are usually already lower-case
        match self.items.get(resource) {
            Some(q) => *q,
            None => self.items.get(&resource.to_lowercase()).copied().unwrap_or(0),
        }
    }

    /// Authoritative restatement: drop everything, sum duplicate symbols.
    pub fn replace<I, S>(&mut self, contents: I)
    where
        I: IntoIterator<Item = (S, i64)>,
        S: AsRef<str>,
    {
        self.items.clear();
        for (resource, qty) in contents {
            self.add(resource.as_ref(), qty);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.items.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn total(&self) -> i64 {
        self.items.values().map(|q| (*q).max(0)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.values().all(|q| *q <= 0)
    }
}

impl<S: AsRef<str>> FromIterator<(S, i64)> for CargoLedger {
    fn from_iter<I: IntoIterator<Item = (S, i64)>>(iter: I) -> Self {
        let mut ledger = CargoLedger::new();
        ledger.replace(iter);
        ledger
    }
}
