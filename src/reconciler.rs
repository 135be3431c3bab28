// ===============================
// src/reconciler.rs (event façade: one event at a time, to completion)
// ===============================
use std::collections::BTreeMap;
use std::path::Path;

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use tracing::{debug, info};

use crate::carrier::FleetCarrierState;
use crate::commodity::CommodityTable;
use crate::construction::ResourceDemand;
use crate::domain::{
    resource_symbol, CapiFleetCarrier, CapiMarket, CargoInventory, ConstructionDepot, Contribution, DockedTo,
    JournalEvent, Location, PanelRow, PanelView, TransferDirection,
};
use crate::ledger::CargoLedger;
use crate::metrics::{CAPI_UPDATES, EVENTS, STALE_EVENTS};
use crate::registry::{DepotObservation, Direction, SiteRegistry};
use crate::store::{CarrierStore, SiteStore};

/// Capacity assumed for the flights estimate until a Loadout tells us better.
pub const DEFAULT_MAX_CARGO: i64 = 784;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Station {
    market_id: Option<u64>,
    name: Option<String>,
    system: Option<String>,
}

#[derive(Debug, Default)]
pub struct EventReconciler {
    registry: SiteRegistry,
    carrier: FleetCarrierState,
    cargo: CargoLedger,
    markets: HashMap<u64, HashSet<String>>,
    station: Option<Station>,
    max_cargo: Option<i64>,
    commodities: CommodityTable,
    ignore_fc_update: bool,
}

impl EventReconciler {
    pub fn new(registry: SiteRegistry, carrier: FleetCarrierState, commodities: CommodityTable) -> Self {
        Self { registry, carrier, commodities, ..Self::default() }
    }

    /// Restore both snapshots from `data_dir`; every later mutation writes back there.
    pub fn open(data_dir: &Path, commodities: CommodityTable) -> Self {
        Self::new(
            SiteRegistry::open(SiteStore::in_dir(data_dir)),
            FleetCarrierState::open(CarrierStore::in_dir(data_dir)),
            commodities,
        )
    }

    pub fn set_ignore_fc_update(&mut self, ignore: bool) {
        self.ignore_fc_update = ignore;
    }

    pub fn registry(&self) -> &SiteRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SiteRegistry {
        &mut self.registry
    }

    pub fn carrier(&self) -> &FleetCarrierState {
        &self.carrier
    }

    pub fn cargo(&self) -> &CargoLedger {
        &self.cargo
    }

    pub fn max_cargo(&self) -> Option<i64> {
        self.max_cargo
    }

    pub fn available_at(&self, market_id: u64) -> Option<&HashSet<String>> {
        self.markets.get(&market_id)
    }

    fn station_name(&self) -> Option<&str> {
        self.station.as_ref().and_then(|s| s.name.as_deref())
    }

    fn at_carrier(&self) -> bool {
        self.carrier.is_docked_at(self.station_name())
    }

    // ---- journal ----

    pub fn handle(&mut self, event: &JournalEvent) {
        EVENTS.with_label_values(&[event.kind()]).inc();
        match event {
            JournalEvent::MarketBuy(t) => {
                let symbol = t.commodity.to_lowercase();
                self.cargo.add(&symbol, t.count);
                if self.at_carrier() {
                    self.carrier.remove(&symbol, t.count);
                }
            }
            JournalEvent::MarketSell(t) => {
                let symbol = t.commodity.to_lowercase();
                self.cargo.remove(&symbol, t.count);
                if self.at_carrier() {
                    self.carrier.add(&symbol, t.count);
                }
            }
            JournalEvent::CargoTransfer(ct) => {
                for t in &ct.transfers {
                    let symbol = t.commodity.to_lowercase();
                    match t.direction {
                        TransferDirection::ToShip => {
                            self.cargo.add(&symbol, t.count);
                            self.carrier.remove(&symbol, t.count);
                        }
                        TransferDirection::ToCarrier => {
                            self.cargo.remove(&symbol, t.count);
                            self.carrier.add(&symbol, t.count);
                        }
                        TransferDirection::Other => {
                            debug!(commodity = %symbol, "transfer not involving the carrier ignored")
                        }
                    }
                }
            }
            JournalEvent::Cargo(inv) => self.on_cargo(inv),
            JournalEvent::Loadout(l) => {
                if let Some(cap) = l.cargo_capacity {
                    self.max_cargo = Some(cap);
                }
            }
            JournalEvent::StartUp(loc) => {
                if let Some(cargo) = &loc.cargo {
                    self.cargo.replace(cargo.iter().map(|(k, v)| (k.as_str(), *v)));
                }
                if loc.market_id.is_some() {
                    self.on_docked(loc);
                }
            }
            JournalEvent::Docked(loc) => self.on_docked(loc),
            JournalEvent::Undocked => {
                self.station = None;
                self.registry.undock();
            }
            JournalEvent::ColonisationContribution(c) => self.on_contribution(c),
            JournalEvent::ColonisationConstructionDepot(d) => self.on_depot(d),
            JournalEvent::Other => {}
        }
    }

    fn on_cargo(&mut self, inv: &CargoInventory) {
        if !inv.is_ship() {
            return;
        }
        match inv.contents() {
            Some(items) => self.cargo.replace(items),
            None => debug!("cargo event without contents, ledger kept"),
        }
    }

    fn on_docked(&mut self, loc: &Location) {
        let Some(market_id) = loc.market_id else {
            debug!(station = ?loc.station_name, "dock without market id ignored");
            return;
        };
        info!(market_id, station = ?loc.station_name, depot = loc.is_construction_depot(), "docked");
        self.station = Some(Station {
            market_id: Some(market_id),
            name: loc.station_name.clone(),
            system: loc.system_name.clone(),
        });
        self.registry
            .dock(market_id, loc.system_name.clone(), loc.station_name.clone());
    }

    fn on_contribution(&mut self, c: &Contribution) {
        let deliveries: Vec<(String, i64)> = c
            .contributions
            .iter()
            .map(|i| (resource_symbol(&i.name), i.amount))
            .collect();
        self.registry.contribute(c.market_id, deliveries);
    }

    fn on_depot(&mut self, d: &ConstructionDepot) {
        let (system, station_name) = match &self.station {
            Some(s) if s.market_id == Some(d.market_id) => (s.system.clone(), s.name.clone()),
            _ => {
                STALE_EVENTS.with_label_values(&["ColonisationConstructionDepot"]).inc();
                debug!(market_id = d.market_id, "depot data without matching dock");
                (None, None)
            }
        };
        let mut required: BTreeMap<String, ResourceDemand> = BTreeMap::new();
        for r in &d.resources_required {
            required.insert(
                resource_symbol(&r.name),
                ResourceDemand::new(r.required_amount, r.provided_amount, r.payment),
            );
        }
        self.registry.observe_construction_depot(DepotObservation {
            system,
            station_name,
            market_id: d.market_id,
            progress: d.construction_progress,
            complete: d.construction_complete,
            failed: d.construction_failed,
            required,
        });
    }

    // ---- companion API ----

    pub fn apply_capi_fleetcarrier(&mut self, data: &CapiFleetCarrier) -> bool {
        if self.ignore_fc_update {
            CAPI_UPDATES.with_label_values(&["fleetcarrier", "ignored"]).inc();
            return false;
        }
        let ok = self.carrier.sync_from_snapshot(data);
        CAPI_UPDATES
            .with_label_values(&["fleetcarrier", if ok { "applied" } else { "no_carrier" }])
            .inc();
        ok
    }

    /// Rebuild the availability entry for the last visited starport.
    pub fn apply_capi_market(&mut self, data: &CapiMarket) {
        let Some(id) = data.last_starport.id else {
            CAPI_UPDATES.with_label_values(&["market", "no_starport"]).inc();
            return;
        };
        let local: HashSet<String> = data
            .last_starport
            .commodities
            .iter()
            .flatten()
            .filter(|c| c.stock > 0)
            .map(|c| c.name.to_lowercase())
            .collect();
        debug!(market_id = id, purchasable = local.len(), "market availability updated");
        self.markets.insert(id, local);
        CAPI_UPDATES.with_label_values(&["market", "applied"]).inc();
    }

    // ---- panel actions ----

    pub fn navigate(&mut self, dir: Direction) -> bool {
        self.registry.navigate(dir)
    }

    pub fn track(&mut self) -> bool {
        self.registry.track()
    }

    // ---- view ----

    pub fn view(&self) -> PanelView {
        let site = self.registry.current_site();
        let docked_market = self.registry.docked_market_id();
        let at_current_site = matches!(
            (site.and_then(|s| s.market_id), docked_market),
            (Some(a), Some(b)) if a == b
        );

        let (title, station) = match site {
            None => ("Total".to_string(), String::new()),
            Some(s) => {
                let station = match (&s.market_id, s.station_name.as_deref()) {
                    (None, _) => "not bound to a station".to_string(),
                    (Some(_), name) if at_current_site => format!("{} (docked)", name.unwrap_or("")),
                    (Some(_), name) => name.unwrap_or("").to_string(),
                };
                (s.display_name(), station)
            }
        };

        let docked_to = if self.at_carrier() {
            DockedTo::Carrier
        } else if at_current_site {
            DockedTo::Market
        } else {
            DockedTo::Nothing
        };

        let local = docked_market.and_then(|m| self.markets.get(&m));
        let rows: Vec<PanelRow> = self
            .registry
            .current_needs()
            .into_iter()
            .filter(|(_, needed)| *needed > 0)
            .map(|(symbol, needed)| {
                let cargo = self.cargo.get(&symbol);
                let carrier = self.carrier.get(&symbol);
                PanelRow {
                    display_name: self.commodities.display_name(&symbol),
                    category: self.commodities.category(&symbol),
                    available: local.map(|l| l.contains(&symbol)).unwrap_or(false),
                    to_buy: needed - cargo - carrier,
                    symbol,
                    needed,
                    cargo,
                    carrier,
                }
            })
            .collect();

        let total_remaining: i64 = rows.iter().map(|r| r.needed).sum();
        let max_cargo = self.max_cargo.filter(|c| *c > 0).unwrap_or(DEFAULT_MAX_CARGO);
        let can_bind = self.registry.is_docked_at_depot()
            && docked_market.map(|m| self.registry.find_by_market(m).is_none()).unwrap_or(false)
            && self.registry.sites().iter().any(|s| s.market_id.is_none());

        PanelView {
            title,
            station,
            docked_to,
            can_track: self.registry.can_track(),
            can_bind,
            can_navigate: self.registry.can_navigate(),
            tracked_sites: self.registry.len(),
            rows,
            total_remaining,
            max_cargo,
            flights: total_remaining as f64 / max_cargo as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CarrierCargoItem, CarrierName, MarketCommodity, Starport};

    fn ev(json: &str) -> JournalEvent {
        serde_json::from_str(json).expect("event json")
    }

    fn with_carrier(call_sign: &str, cargo: &[(&str, i64)]) -> EventReconciler {
        let mut r = EventReconciler::default();
        r.apply_capi_fleetcarrier(&CapiFleetCarrier {
            name: CarrierName { callsign: Some(call_sign.into()) },
            cargo: cargo
                .iter()
                .map(|(c, q)| CarrierCargoItem { commodity: c.to_string(), qty: *q })
                .collect(),
        });
        r
    }

    #[test]
    fn buying_at_own_carrier_mirrors_stock() {
        let mut r = with_carrier("ABC-123", &[("steel", 100)]);
        r.handle(&ev(r#"{"event":"Docked","StationName":"ABC-123","StationType":"FleetCarrier","StarSystem":"Sol","MarketID":3700}"#));
        r.handle(&ev(r#"{"event":"MarketBuy","Type":"steel","Count":30}"#));
        assert_eq!(r.cargo().get("steel"), 30);
        assert_eq!(r.carrier().get("steel"), 70);
        assert_eq!(r.view().docked_to, DockedTo::Carrier);

        r.handle(&ev(r#"{"event":"MarketSell","Type":"steel","Count":10}"#));
        assert_eq!(r.cargo().get("steel"), 20);
        assert_eq!(r.carrier().get("steel"), 80);
    }

    #[test]
    fn buying_elsewhere_leaves_carrier_alone() {
        let mut r = with_carrier("ABC-123", &[("steel", 100)]);
        r.handle(&ev(r#"{"event":"Docked","StationName":"Jameson Memorial","StationType":"Orbis","StarSystem":"Shinrarta Dezhra","MarketID":128666762}"#));
        r.handle(&ev(r#"{"event":"MarketBuy","Type":"Steel","Count":30}"#));
        assert_eq!(r.cargo().get("steel"), 30);
        assert_eq!(r.carrier().get("steel"), 100);
    }

    #[test]
    fn transfers_move_between_holds() {
        let mut r = with_carrier("ABC-123", &[("gold", 10)]);
        r.handle(&ev(r#"{"event":"CargoTransfer","Transfers":[{"Type":"gold","Count":4,"Direction":"toship"},{"Type":"silver","Count":2,"Direction":"tocarrier"}]}"#));
        assert_eq!(r.cargo().get("gold"), 4);
        assert_eq!(r.carrier().get("gold"), 6);
        assert_eq!(r.carrier().get("silver"), 2);
        assert_eq!(r.cargo().get("silver"), 0);
    }

    #[test]
    fn cargo_event_restates_hold() {
        let mut r = EventReconciler::default();
        r.handle(&ev(r#"{"event":"MarketBuy","Type":"steel","Count":30}"#));
        r.handle(&ev(r#"{"event":"Cargo","Vessel":"Ship","Inventory":[{"Name":"titanium","Count":8}]}"#));
        assert_eq!(r.cargo().get("steel"), 0);
        assert_eq!(r.cargo().get("titanium"), 8);

        r.handle(&ev(r#"{"event":"Cargo","Vessel":"SRV","Inventory":[]}"#));
        r.handle(&ev(r#"{"event":"Cargo","Vessel":"Ship","Count":8}"#));
        assert_eq!(r.cargo().get("titanium"), 8);
    }

    #[test]
    fn loadout_sets_capacity() {
        let mut r = EventReconciler::default();
        assert_eq!(r.view().max_cargo, DEFAULT_MAX_CARGO);
        r.handle(&ev(r#"{"event":"Loadout","Ship":"type9","CargoCapacity":720}"#));
        r.handle(&ev(r#"{"event":"Loadout","Ship":"type9"}"#));
        assert_eq!(r.max_cargo(), Some(720));
    }

    #[test]
    fn depot_flow_builds_view() {
        let mut r = EventReconciler::default();
        r.handle(&ev(r#"{"event":"Docked","StationName":"Orbital Construction Site: Hub","StationType":"SpaceConstructionDepot","StarSystem":"Col 285","MarketID":1}"#));
        r.handle(&ev(r#"{"event":"ColonisationConstructionDepot","MarketID":1,"ConstructionProgress":0.0,"ConstructionComplete":false,"ConstructionFailed":false,
            "ResourcesRequired":[{"Name":"$steel_name;","Name_Localised":"Steel","RequiredAmount":100,"ProvidedAmount":0,"Payment":1200},
                                 {"Name":"$titanium_name;","RequiredAmount":10,"ProvidedAmount":10,"Payment":900}]}"#));
        let v = r.view();
        assert_eq!(v.title, "Hub");
        assert!(v.can_track);
        assert!(!v.can_navigate);
        assert_eq!(v.rows.len(), 1, "fully provided titanium is hidden");

        r.handle(&ev(r#"{"event":"ColonisationContribution","MarketID":1,"Contributions":[{"Name":"$steel_name;","Amount":40}]}"#));
        assert!(r.track());
        let v = r.view();
        assert_eq!(v.rows[0].needed, 60);
        assert_eq!(v.station, "Orbital Construction Site: Hub (docked)");
        assert_eq!(v.docked_to, DockedTo::Market);
        assert_eq!(v.tracked_sites, 1);

        r.handle(&ev(r#"{"event":"Undocked","StationName":"Orbital Construction Site: Hub","MarketID":1}"#));
        let v = r.view();
        assert!(v.can_navigate);
        assert_eq!(v.title, "Hub");
        assert_eq!(v.docked_to, DockedTo::Nothing);
    }

    #[test]
    fn availability_follows_docked_market() {
        let mut r = EventReconciler::default();
        r.registry_mut().plan("Plan", [("steel".to_string(), ResourceDemand::new(50, 0, 0))].into_iter().collect());
        r.apply_capi_market(&CapiMarket {
            last_starport: Starport {
                id: Some(9),
                commodities: Some(vec![
                    MarketCommodity { name: "Steel".into(), stock: 1000 },
                    MarketCommodity { name: "Gold".into(), stock: 0 },
                ]),
            },
        });
        assert!(!r.view().rows[0].available);
        r.handle(&ev(r#"{"event":"Docked","StationName":"Depot","StationType":"Coriolis","StarSystem":"Sol","MarketID":9}"#));
        assert!(r.view().rows[0].available);
        assert!(!r.available_at(9).unwrap().contains("gold"));
        assert!(r.available_at(10).is_none());
    }

    #[test]
    fn ignored_carrier_updates() {
        let mut r = EventReconciler::default();
        r.set_ignore_fc_update(true);
        let applied = r.apply_capi_fleetcarrier(&CapiFleetCarrier {
            name: CarrierName { callsign: Some("ABC-123".into()) },
            cargo: vec![],
        });
        assert!(!applied);
        assert_eq!(r.carrier().call_sign(), None);
    }
}
