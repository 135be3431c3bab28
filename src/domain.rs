// ===============================
// src/domain.rs
// ===============================
use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// ---- Inbound: journal events (decoded once at the boundary) ----

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event")]
pub enum JournalEvent {
    MarketBuy(MarketTrade),
    MarketSell(MarketTrade),
    CargoTransfer(CargoTransfer),
    Cargo(CargoInventory),
    Loadout(Loadout),
    StartUp(Location),
    Docked(Location),
    Undocked,
    ColonisationContribution(Contribution),
    ColonisationConstructionDepot(ConstructionDepot),
    #[serde(other)]
    Other,
}

impl JournalEvent {
    /// Label dipakai untuk metrics & log.
    pub fn kind(&self) -> &'static str {
        match self {
            JournalEvent::MarketBuy(_) => "MarketBuy",
            JournalEvent::MarketSell(_) => "MarketSell",
            JournalEvent::CargoTransfer(_) => "CargoTransfer",
            JournalEvent::Cargo(_) => "Cargo",
            JournalEvent::Loadout(_) => "Loadout",
            JournalEvent::StartUp(_) => "StartUp",
            JournalEvent::Docked(_) => "Docked",
            JournalEvent::Undocked => "Undocked",
            JournalEvent::ColonisationContribution(_) => "ColonisationContribution",
            JournalEvent::ColonisationConstructionDepot(_) => "ColonisationConstructionDepot",
            JournalEvent::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketTrade {
    #[serde(rename = "Type")]
    pub commodity: String,
    #[serde(rename = "Count")]
    pub count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    ToShip,
    ToCarrier,
    // tosrv and anything newer
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Transfer {
    #[serde(rename = "Type")]
    pub commodity: String,
    #[serde(rename = "Count")]
    pub count: i64,
    #[serde(rename = "Direction")]
    pub direction: TransferDirection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CargoTransfer {
    #[serde(rename = "Transfers", default)]
    pub transfers: Vec<Transfer>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InventoryItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Count")]
    pub count: i64,
}

/// Full restatement of the hold. The host hands us a `Cargo` map; raw journal
/// lines carry an `Inventory` list instead.
#[derive(Debug, Clone, Deserialize)]
pub struct CargoInventory {
    #[serde(rename = "Vessel", default)]
    pub vessel: Option<String>,
    #[serde(rename = "Cargo", default)]
    pub cargo: Option<BTreeMap<String, i64>>,
    #[serde(rename = "Inventory", default)]
    pub inventory: Option<Vec<InventoryItem>>,
}

impl CargoInventory {
    pub fn is_ship(&self) -> bool {
        self.vessel
            .as_deref()
            .map(|v| v.eq_ignore_ascii_case("ship"))
            .unwrap_or(true)
    }

    /// None when the event carries no contents (the journal then points at Cargo.json).
    pub fn contents(&self) -> Option<Vec<(String, i64)>> {
        if let Some(map) = &self.cargo {
            return Some(map.iter().map(|(k, v)| (k.clone(), *v)).collect());
        }
        self.inventory
            .as_ref()
            .map(|items| items.iter().map(|i| (i.name.clone(), i.count)).collect())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Loadout {
    #[serde(rename = "CargoCapacity", default)]
    pub cargo_capacity: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Location {
    #[serde(rename = "StationName", default)]
    pub station_name: Option<String>,
    #[serde(rename = "StationType", default)]
    pub station_type: Option<String>,
    #[serde(rename = "SystemName", alias = "StarSystem", default)]
    pub system_name: Option<String>,
    #[serde(rename = "MarketID", default)]
    pub market_id: Option<u64>,
    #[serde(rename = "Cargo", default)]
    pub cargo: Option<BTreeMap<String, i64>>,
}

impl Location {
    pub fn is_construction_depot(&self) -> bool {
        self.station_type
            .as_deref()
            .map(is_construction_depot)
            .unwrap_or(false)
    }
}

pub fn is_construction_depot(station_type: &str) -> bool {
    matches!(
        station_type,
        "PlanetaryConstructionDepot" | "SpaceConstructionDepot" | "OrbitalConstructionDepot"
    )
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContributionItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Amount")]
    pub amount: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Contribution {
    #[serde(rename = "MarketID")]
    pub market_id: u64,
    #[serde(rename = "Contributions", default)]
    pub contributions: Vec<ContributionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceRequired {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "RequiredAmount", default)]
    pub required_amount: i64,
    #[serde(rename = "ProvidedAmount", default)]
    pub provided_amount: i64,
    #[serde(rename = "Payment", default)]
    pub payment: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConstructionDepot {
    #[serde(rename = "MarketID")]
    pub market_id: u64,
    #[serde(rename = "ConstructionProgress", default)]
    pub construction_progress: f64,
    #[serde(rename = "ConstructionComplete", default)]
    pub construction_complete: bool,
    #[serde(rename = "ConstructionFailed", default)]
    pub construction_failed: bool,
    #[serde(rename = "ResourcesRequired", default)]
    pub resources_required: Vec<ResourceRequired>,
}

// ---- Inbound: companion API payloads (separate channel) ----

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CarrierName {
    #[serde(default)]
    pub callsign: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CarrierCargoItem {
    pub commodity: String,
    pub qty: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CapiFleetCarrier {
    #[serde(default)]
    pub name: CarrierName,
    #[serde(default)]
    pub cargo: Vec<CarrierCargoItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketCommodity {
    pub name: String,
    #[serde(default)]
    pub stock: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Starport {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub commodities: Option<Vec<MarketCommodity>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CapiMarket {
    #[serde(rename = "lastStarport", default)]
    pub last_starport: Starport,
}

// ---- Outbound: what the panel renders ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DockedTo {
    Nothing,
    Market,
    Carrier,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelRow {
    pub symbol: String,
    pub display_name: String,
    pub category: String,
    pub needed: i64,
    pub cargo: i64,
    pub carrier: i64,
    /// needed minus what already sits in the hold and on the carrier
    pub to_buy: i64,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelView {
    pub title: String,
    pub station: String,
    pub docked_to: DockedTo,
    pub can_track: bool,
    pub can_bind: bool,
    pub can_navigate: bool,
    pub tracked_sites: usize,
    pub rows: Vec<PanelRow>,
    pub total_remaining: i64,
    pub max_cargo: i64,
    pub flights: f64,
}

// ---- Resource tokens ----

static RESOURCE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$([^_;]+)_").expect("static resource token regex"));

/// `$steel_name;` -> `steel`. Anything else is taken as a plain symbol.
pub fn resource_symbol(token: &str) -> String {
    match RESOURCE_TOKEN.captures(token) {
        Some(c) => c[1].to_lowercase(),
        None => token.to_lowercase(),
    }
}
