// ===============================
// src/construction.rs (one tracked construction project)
// ===============================
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDemand {
    pub required: i64,
    pub provided: i64,
    #[serde(default)]
    pub payment: i64,
}

impl ResourceDemand {
    pub fn new(required: i64, provided: i64, payment: i64) -> Self {
        Self { required, provided, payment }
    }

    /// May go negative once over-delivered.
    pub fn needed(&self) -> i64 {
        self.required - self.provided
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructionSite {
    /// Label for sites planned by hand (no station yet).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub station_name: Option<String>,
    #[serde(default)]
    pub market_id: Option<u64>,
    #[serde(default)]
    pub construction_progress: f64,
    #[serde(default)]
    pub construction_complete: bool,
    #[serde(default)]
    pub construction_failed: bool,
    pub required: BTreeMap<String, ResourceDemand>,
}

impl ConstructionSite {
    pub fn new(
        system: Option<String>,
        station_name: Option<String>,
        market_id: Option<u64>,
        required: BTreeMap<String, ResourceDemand>,
    ) -> Self {
        Self {
            name: None,
            system,
            station_name,
            market_id,
            construction_progress: 0.0,
            construction_complete: false,
            construction_failed: false,
            required: normalise_keys(required),
        }
    }

    /// A site planned from a requirement template, not yet bound to any market.
    pub fn planned(name: impl Into<String>, required: BTreeMap<String, ResourceDemand>) -> Self {
        let mut site = Self::new(None, None, None, required);
        site.name = Some(name.into());
        site
    }

    /// Deliveries of anything outside the requirement set are ignored.
    pub fn deliver(&mut self, resource: &str, quantity: i64) -> bool {
        match self.required.get_mut(&resource.to_lowercase()) {
            Some(d) => {
                d.provided += quantity;
                true
            }
            None => false,
        }
    }

    pub fn needed(&self, resource: &str) -> i64 {
        self.required
            .get(&resource.to_lowercase())
            .map(ResourceDemand::needed)
            .unwrap_or(0)
    }

    /// Raw (unclamped) needs per resource, sorted by symbol.
    pub fn needed_map(&self) -> BTreeMap<String, i64> {
        self.required
            .iter()
            .map(|(k, d)| (k.clone(), d.needed()))
            .collect()
    }

    /// Sum of outstanding tons, clamped per resource.
    pub fn remaining(&self) -> i64 {
        self.required.values().map(|d| d.needed().max(0)).sum()
    }

    pub fn rebind(&mut self, system: Option<String>, station_name: Option<String>, market_id: Option<u64>) {
        self.system = system;
        self.station_name = station_name;
        self.market_id = market_id;
    }

    /// Apply a depot snapshot. Required/payment follow the snapshot; provided never
    /// moves backwards so a stale snapshot cannot undo contributions seen after it.
    /// Resources missing from the snapshot keep their history.
    pub fn apply_depot(
        &mut self,
        progress: f64,
        complete: bool,
        failed: bool,
        required: &BTreeMap<String, ResourceDemand>,
    ) {
        self.construction_progress = progress.clamp(0.0, 1.0);
        self.construction_complete = complete;
        self.construction_failed = failed;
        for (resource, incoming) in required {
            let entry = self.required.entry(resource.to_lowercase()).or_default();
            entry.required = incoming.required;
            entry.payment = incoming.payment;
            entry.provided = entry.provided.max(incoming.provided);
        }
    }

    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        short_station_name(self.station_name.as_deref(), self.system.as_deref())
    }
}

fn normalise_keys(required: BTreeMap<String, ResourceDemand>) -> BTreeMap<String, ResourceDemand> {
    let mut out: BTreeMap<String, ResourceDemand> = BTreeMap::new();
    for (k, d) in required {
        let e = out.entry(k.to_lowercase()).or_default();
        e.required += d.required;
        e.provided += d.provided;
        e.payment = e.payment.max(d.payment);
    }
    out
}

const STATION_PREFIXES: [&str; 3] = [
    "Orbital Construction Site: ",
    "Planetary Construction Site: ",
    "Construction Site: ",
];

/// Human label for a raw station name. The colonisation ship has no real name
/// of its own, so it is shown as its system.
pub fn short_station_name(station: Option<&str>, system: Option<&str>) -> String {
    let raw = station.unwrap_or("").trim();
    if raw.is_empty() {
        return String::new();
    }
    if is_colonisation_ship(raw) {
        return match system.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => s.to_string(),
            None => raw.to_string(),
        };
    }
    for prefix in STATION_PREFIXES {
        if let Some(rest) = raw.strip_prefix(prefix) {
            return rest.trim().to_string();
        }
    }
    raw.to_string()
}

fn is_colonisation_ship(station: &str) -> bool {
    station.contains("ColonisationShip") || station.eq_ignore_ascii_case("System Colonisation Ship")
}
