// ===============================
// src/registry.rs (tracked sites, cursor, docking state, aggregate demand)
// ===============================
//
// Docking state:
//   UNDOCKED -> dock() -> DOCKED_NO_SITE -> observe_construction_depot() -> DOCKED_AT_SITE
//   undock() dari mana saja -> UNDOCKED
//
// Cursor (Selection):
//   Aggregate       : total semua site
//   Tracked(i)      : sites[i]
//   Untracked       : site transient (depot yang sedang di-dock, belum di-track)
//
use std::collections::BTreeMap;

use ahash::AHashMap as HashMap;
use tracing::{debug, info, warn};

use crate::construction::{ConstructionSite, ResourceDemand};
use crate::metrics::{PERSIST_FAILURES, SITES_REMAINING_TONS, SITES_TRACKED, STALE_EVENTS};
use crate::store::SiteStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    Aggregate,
    Tracked(usize),
    Untracked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Prev,
    Next,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Docking {
    pub market_id: u64,
    pub system: Option<String>,
    pub station_name: Option<String>,
}

/// Site data delivered while docked at a construction depot.
#[derive(Debug, Clone, PartialEq)]
pub struct DepotObservation {
    pub system: Option<String>,
    pub station_name: Option<String>,
    pub market_id: u64,
    pub progress: f64,
    pub complete: bool,
    pub failed: bool,
    pub required: BTreeMap<String, ResourceDemand>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed {
    Tracked(usize),
    Transient,
    /// Not docked there and no site owns the market; nothing changed.
    Stale,
}

#[derive(Debug, Default)]
pub struct SiteRegistry {
    sites: Vec<ConstructionSite>,
    by_market: HashMap<u64, usize>,
    selection: Selection,
    transient: Option<ConstructionSite>,
    docked: Option<Docking>,
    at_depot: bool,
    store: Option<SiteStore>,
}

impl SiteRegistry {
    /// In-memory registry, nothing is persisted.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sites(sites: Vec<ConstructionSite>) -> Self {
        let mut reg = Self { sites, ..Self::default() };
        reg.reindex();
        reg
    }

    /// Restore from the snapshot file; later mutations are written back to it.
    pub fn open(store: SiteStore) -> Self {
        let sites = match store.load() {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "sites snapshot unreadable, starting empty");
                Vec::new()
            }
        };
        info!(sites = sites.len(), path = %store.path().display(), "sites loaded");
        let mut reg = Self::with_sites(sites);
        reg.store = Some(store);
        reg
    }

    // ---- read side ----

    pub fn sites(&self) -> &[ConstructionSite] {
        &self.sites
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn transient(&self) -> Option<&ConstructionSite> {
        self.transient.as_ref()
    }

    pub fn docking(&self) -> Option<&Docking> {
        self.docked.as_ref()
    }

    pub fn docked_market_id(&self) -> Option<u64> {
        self.docked.as_ref().map(|d| d.market_id)
    }

    pub fn is_docked_at_depot(&self) -> bool {
        self.at_depot
    }

    pub fn find_by_market(&self, market_id: u64) -> Option<usize> {
        self.by_market.get(&market_id).copied()
    }

    /// The selected site, or None for the aggregate view.
    pub fn current_site(&self) -> Option<&ConstructionSite> {
        match self.selection {
            Selection::Aggregate => None,
            Selection::Tracked(i) => self.sites.get(i),
            Selection::Untracked => self.transient.as_ref(),
        }
    }

    /// Navigation is pinned while docked at a depot.
    pub fn can_navigate(&self) -> bool {
        !self.at_depot
    }

    pub fn can_track(&self) -> bool {
        self.at_depot && self.selection == Selection::Untracked && self.transient.is_some()
    }

    /// Needs of whatever is selected: one site, or all tracked sites combined.
    pub fn current_needs(&self) -> BTreeMap<String, i64> {
        match self.current_site() {
            Some(site) => site.needed_map(),
            None => self.total_shopping_list(),
        }
    }

    /// Raw needs summed per resource over all tracked sites, sorted by symbol.
    /// Over-delivered sites contribute negative values; clamp when displaying.
    pub fn total_shopping_list(&self) -> BTreeMap<String, i64> {
        let mut total: BTreeMap<String, i64> = BTreeMap::new();
        for site in &self.sites {
            for (resource, demand) in &site.required {
                *total.entry(resource.clone()).or_insert(0) += demand.needed();
            }
        }
        total
    }

    // ---- docking ----

    pub fn dock(&mut self, market_id: u64, system: Option<String>, station_name: Option<String>) {
        // Transient site from another depot is no longer relevant.
        if self.transient.as_ref().and_then(|t| t.market_id) != Some(market_id) {
            self.transient = None;
            if self.selection == Selection::Untracked {
                self.selection = Selection::Aggregate;
            }
        }
        self.docked = Some(Docking { market_id, system, station_name });
        self.at_depot = false;

        if let Some(idx) = self.find_by_market(market_id) {
            debug!(market_id, index = idx, "docked at tracked site");
            self.selection = Selection::Tracked(idx);
        }
    }

    pub fn undock(&mut self) {
        self.docked = None;
        self.at_depot = false;
    }

    /// Depot data for `obs.market_id`. Docking state, cursor and transient
    /// only move when we are docked at that market; a late or repeated event
    /// just refreshes a site we already know.
    pub fn observe_construction_depot(&mut self, obs: DepotObservation) -> Observed {
        let docked = self.docked_market_id();
        let docked_here = docked == Some(obs.market_id);
        if docked_here {
            self.at_depot = true;
        }

        if let Some(idx) = self.find_by_market(obs.market_id) {
            let site = &mut self.sites[idx];
            if obs.station_name.is_some() {
                let system = obs.system.or_else(|| site.system.clone());
                site.rebind(system, obs.station_name, Some(obs.market_id));
            }
            site.apply_depot(obs.progress, obs.complete, obs.failed, &obs.required);
            if docked_here {
                self.selection = Selection::Tracked(idx);
                self.transient = None;
            }
            self.persist();
            return Observed::Tracked(idx);
        }

        match self.transient.as_mut().filter(|t| t.market_id == Some(obs.market_id)) {
            Some(site) => {
                if obs.station_name.is_some() {
                    site.station_name = obs.station_name;
                }
                if obs.system.is_some() {
                    site.system = obs.system;
                }
                site.apply_depot(obs.progress, obs.complete, obs.failed, &obs.required);
            }
            None if !docked_here => {
                debug!(market_id = obs.market_id, ?docked, "depot data for a market we are not docked at");
                return Observed::Stale;
            }
            None => {
                let mut site = ConstructionSite::new(obs.system, obs.station_name, Some(obs.market_id), BTreeMap::new());
                site.apply_depot(obs.progress, obs.complete, obs.failed, &obs.required);
                info!(market_id = obs.market_id, name = %site.display_name(), "untracked construction depot");
                self.transient = Some(site);
            }
        }
        if docked_here {
            self.selection = Selection::Untracked;
        }
        Observed::Transient
    }

    /// Deliveries at `market_id`. Returns false when no site (tracked or
    /// transient) owns that market; the event is then dropped.
    pub fn contribute<I, S>(&mut self, market_id: u64, deliveries: I) -> bool
    where
        I: IntoIterator<Item = (S, i64)>,
        S: AsRef<str>,
    {
        if let Some(idx) = self.find_by_market(market_id) {
            let site = &mut self.sites[idx];
            for (resource, qty) in deliveries {
                site.deliver(resource.as_ref(), qty);
            }
            self.persist();
            return true;
        }
        if let Some(site) = self.transient.as_mut().filter(|t| t.market_id == Some(market_id)) {
            for (resource, qty) in deliveries {
                site.deliver(resource.as_ref(), qty);
            }
            return true;
        }
        STALE_EVENTS.with_label_values(&["ColonisationContribution"]).inc();
        info!(market_id, "contribution for unknown market dropped");
        false
    }

    // ---- user actions ----

    /// Promote the transient depot to the tracked list.
    pub fn track(&mut self) -> bool {
        if !self.can_track() {
            return false;
        }
        let Some(site) = self.transient.take() else { return false };
        if let Some(idx) = site.market_id.and_then(|m| self.find_by_market(m)) {
            self.selection = Selection::Tracked(idx);
            return true;
        }
        info!(name = %site.display_name(), market_id = ?site.market_id, "tracking site");
        self.sites.push(site);
        let idx = self.sites.len() - 1;
        self.reindex();
        self.selection = Selection::Tracked(idx);
        self.persist();
        true
    }

    /// Add a hand-planned site (no market yet). Cursor is left alone.
    pub fn plan(&mut self, name: &str, required: BTreeMap<String, ResourceDemand>) -> usize {
        info!(%name, resources = required.len(), "planning site");
        self.sites.push(ConstructionSite::planned(name, required));
        self.reindex();
        self.persist();
        self.sites.len() - 1
    }

    /// Bind the planned site at `index` to the depot we are docked at. Depot data
    /// already observed for this market is folded in.
    pub fn bind_docked(&mut self, index: usize) -> bool {
        if !self.at_depot {
            return false;
        }
        let Some(dock) = self.docked.clone() else { return false };
        if self.find_by_market(dock.market_id).is_some() {
            return false;
        }
        let Some(site) = self.sites.get_mut(index) else { return false };
        if site.market_id.is_some() {
            return false;
        }

        if site.name.is_none() {
            site.name = Some(site.display_name());
        }
        site.rebind(dock.system, dock.station_name, Some(dock.market_id));
        if let Some(t) = self.transient.take().filter(|t| t.market_id == Some(dock.market_id)) {
            site.apply_depot(t.construction_progress, t.construction_complete, t.construction_failed, &t.required);
            if site.station_name.is_none() {
                site.station_name = t.station_name;
            }
        }
        info!(index, market_id = dock.market_id, "site bound to docked station");
        self.reindex();
        self.selection = Selection::Tracked(index);
        self.persist();
        true
    }

    /// Forget which market a site belongs to, keeping its demand state.
    pub fn unbind(&mut self, market_id: u64) -> bool {
        let Some(idx) = self.find_by_market(market_id) else { return false };
        let site = &mut self.sites[idx];
        if site.name.is_none() {
            site.name = Some(site.display_name());
        }
        site.rebind(None, None, None);
        self.reindex();
        self.persist();
        true
    }

    pub fn remove(&mut self, index: usize) -> Option<ConstructionSite> {
        if index >= self.sites.len() {
            return None;
        }
        let site = self.sites.remove(index);
        self.selection = match self.selection {
            Selection::Tracked(i) if i == index => Selection::Aggregate,
            Selection::Tracked(i) if i > index => Selection::Tracked(i - 1),
            other => other,
        };
        info!(name = %site.display_name(), "site removed");
        self.reindex();
        self.persist();
        Some(site)
    }

    /// Cycle through tracked sites with the aggregate view between last and first.
    pub fn navigate(&mut self, dir: Direction) -> bool {
        if !self.can_navigate() {
            return false;
        }
        let n = self.sites.len();
        let next = match (dir, self.selection) {
            (_, _) if n == 0 => Selection::Aggregate,
            (Direction::Next, Selection::Aggregate | Selection::Untracked) => Selection::Tracked(0),
            (Direction::Next, Selection::Tracked(i)) if i + 1 < n => Selection::Tracked(i + 1),
            (Direction::Next, Selection::Tracked(_)) => Selection::Aggregate,
            (Direction::Prev, Selection::Aggregate | Selection::Untracked) => Selection::Tracked(n - 1),
            (Direction::Prev, Selection::Tracked(0)) => Selection::Aggregate,
            (Direction::Prev, Selection::Tracked(i)) => Selection::Tracked((i - 1).min(n - 1)),
        };
        if self.selection == Selection::Untracked {
            self.transient = None;
        }
        self.selection = next;
        true
    }

    pub fn next(&mut self) -> bool {
        self.navigate(Direction::Next)
    }

    pub fn prev(&mut self) -> bool {
        self.navigate(Direction::Prev)
    }

    // ---- internals ----

    fn reindex(&mut self) {
        self.by_market.clear();
        for (i, site) in self.sites.iter().enumerate() {
            if let Some(m) = site.market_id {
                // first one wins; duplicates only come from hand-edited files
                self.by_market.entry(m).or_insert(i);
            }
        }
        SITES_TRACKED.set(self.sites.len() as i64);
    }

    fn persist(&self) {
        SITES_REMAINING_TONS.set(self.sites.iter().map(ConstructionSite::remaining).sum());
        let Some(store) = &self.store else { return };
        if let Err(e) = store.save(&self.sites) {
            PERSIST_FAILURES.with_label_values(&["sites"]).inc();
            warn!(error = %e, "sites snapshot write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(items: &[(&str, i64)]) -> BTreeMap<String, ResourceDemand> {
        items
            .iter()
            .map(|(k, q)| (k.to_string(), ResourceDemand::new(*q, 0, 0)))
            .collect()
    }

    fn obs(market_id: u64, station: &str, items: &[(&str, i64)]) -> DepotObservation {
        DepotObservation {
            system: Some("Col 285".into()),
            station_name: Some(station.into()),
            market_id,
            progress: 0.1,
            complete: false,
            failed: false,
            required: req(items),
        }
    }

    fn tracked(market_id: u64, items: &[(&str, i64)]) -> ConstructionSite {
        ConstructionSite::new(Some("Sol".into()), Some(format!("Site {market_id}")), Some(market_id), req(items))
    }

    #[test]
    fn depot_then_contribution_reduces_need() {
        let mut reg = SiteRegistry::new();
        reg.dock(1, Some("Col 285".into()), Some("Orbital Construction Site: Hub".into()));
        assert_eq!(reg.observe_construction_depot(obs(1, "Orbital Construction Site: Hub", &[("steel", 100)])), Observed::Transient);
        assert!(reg.contribute(1, [("steel", 40)]));
        assert_eq!(reg.current_site().unwrap().needed("steel"), 60);
    }

    #[test]
    fn unknown_depot_is_transient_until_tracked() {
        let mut reg = SiteRegistry::new();
        reg.dock(42, None, Some("Planetary Construction Site: Dirt".into()));
        reg.observe_construction_depot(obs(42, "Planetary Construction Site: Dirt", &[("steel", 10)]));
        assert!(reg.is_empty());
        assert_eq!(reg.selection(), Selection::Untracked);
        assert!(reg.can_track());

        assert!(reg.track());
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.selection(), Selection::Tracked(0));
        assert_eq!(reg.find_by_market(42), Some(0));
        assert!(reg.transient().is_none());
        assert!(!reg.track());
    }

    #[test]
    fn track_requires_depot() {
        let mut reg = SiteRegistry::new();
        assert!(!reg.track());
        reg.dock(5, None, Some("Jameson Memorial".into()));
        assert!(!reg.track());
    }

    #[test]
    fn docking_at_tracked_market_binds_cursor_without_duplicates() {
        let mut reg = SiteRegistry::with_sites(vec![tracked(10, &[("steel", 5)]), tracked(20, &[("steel", 5)])]);
        reg.dock(20, Some("Sol".into()), Some("Site 20".into()));
        assert_eq!(reg.selection(), Selection::Tracked(1));
        assert_eq!(reg.observe_construction_depot(obs(20, "Renamed Site", &[("steel", 5)])), Observed::Tracked(1));
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.sites()[1].station_name.as_deref(), Some("Renamed Site"));
    }

    #[test]
    fn observation_keeps_provided_history() {
        let mut reg = SiteRegistry::with_sites(vec![tracked(10, &[("steel", 100)])]);
        reg.dock(10, None, None);
        reg.contribute(10, [("steel", 30)]);
        let mut o = obs(10, "Site 10", &[]);
        o.required.insert("steel".into(), ResourceDemand::new(100, 10, 0));
        reg.observe_construction_depot(o);
        assert_eq!(reg.sites()[0].needed("steel"), 70);
    }

    #[test]
    fn stale_contribution_is_dropped() {
        let mut reg = SiteRegistry::with_sites(vec![tracked(10, &[("steel", 100)])]);
        assert!(!reg.contribute(99, [("steel", 30)]));
        assert_eq!(reg.sites()[0].needed("steel"), 100);
    }

    #[test]
    fn navigation_wraps_through_aggregate() {
        let mut reg = SiteRegistry::with_sites(vec![tracked(1, &[]), tracked(2, &[])]);
        assert_eq!(reg.selection(), Selection::Aggregate);
        reg.next();
        assert_eq!(reg.selection(), Selection::Tracked(0));
        reg.next();
        assert_eq!(reg.selection(), Selection::Tracked(1));
        reg.next();
        assert_eq!(reg.selection(), Selection::Aggregate);
        reg.prev();
        assert_eq!(reg.selection(), Selection::Tracked(1));
        reg.prev();
        reg.prev();
        assert_eq!(reg.selection(), Selection::Aggregate);
    }

    #[test]
    fn navigation_pinned_at_depot() {
        let mut reg = SiteRegistry::with_sites(vec![tracked(1, &[]), tracked(2, &[])]);
        reg.dock(2, None, None);
        reg.observe_construction_depot(obs(2, "Site 2", &[]));
        assert!(!reg.next());
        assert_eq!(reg.selection(), Selection::Tracked(1));
        reg.undock();
        assert_eq!(reg.selection(), Selection::Tracked(1));
        assert!(reg.next());
        assert_eq!(reg.selection(), Selection::Aggregate);
    }

    #[test]
    fn removing_selected_site_resets_cursor() {
        let mut reg = SiteRegistry::with_sites(vec![tracked(1, &[]), tracked(2, &[]), tracked(3, &[])]);
        reg.next();
        reg.next();
        assert_eq!(reg.selection(), Selection::Tracked(1));
        reg.remove(1).expect("removed");
        assert_eq!(reg.selection(), Selection::Aggregate);
        assert_eq!(reg.find_by_market(3), Some(1));

        reg.next();
        reg.next();
        assert_eq!(reg.selection(), Selection::Tracked(1));
        reg.remove(0);
        assert_eq!(reg.selection(), Selection::Tracked(0));
        assert!(reg.remove(7).is_none());
    }

    #[test]
    fn tracking_then_removing_returns_to_aggregate() {
        let mut reg = SiteRegistry::with_sites(vec![tracked(1, &[("steel", 5)])]);
        reg.dock(42, Some("Col 285".into()), Some("Planetary Construction Site: Dirt".into()));
        reg.observe_construction_depot(obs(42, "Planetary Construction Site: Dirt", &[("steel", 10)]));
        assert!(reg.track());
        assert_eq!(reg.selection(), Selection::Tracked(1));

        let gone = reg.remove(1).expect("removed");
        assert_eq!(gone.market_id, Some(42));
        assert_eq!(reg.selection(), Selection::Aggregate);
        assert_eq!(reg.find_by_market(42), None);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn late_depot_after_undock_leaves_docking_state() {
        let mut reg = SiteRegistry::with_sites(vec![tracked(50, &[("steel", 100)]), tracked(60, &[])]);
        reg.dock(50, Some("Sol".into()), Some("Site 50".into()));
        reg.observe_construction_depot(obs(50, "Site 50", &[("steel", 100)]));
        assert!(!reg.can_navigate());
        reg.undock();

        // re-delivered depot event, player already in space
        let mut late = obs(50, "Site 50", &[]);
        late.required.insert("steel".into(), ResourceDemand::new(100, 40, 0));
        assert_eq!(reg.observe_construction_depot(late), Observed::Tracked(0));
        assert!(!reg.is_docked_at_depot());
        assert!(reg.can_navigate());
        assert!(!reg.can_track());
        assert!(!reg.track());
        assert_eq!(reg.len(), 2);
        // data is still refreshed in place
        assert_eq!(reg.sites()[0].needed("steel"), 60);
        assert!(reg.next());
    }

    #[test]
    fn depot_for_other_market_creates_nothing() {
        let mut reg = SiteRegistry::new();
        assert_eq!(reg.observe_construction_depot(obs(7, "Nowhere", &[("steel", 10)])), Observed::Stale);
        assert!(reg.transient().is_none());
        assert_eq!(reg.selection(), Selection::Aggregate);
        assert!(!reg.track());

        reg.dock(8, None, Some("Jameson Memorial".into()));
        assert_eq!(reg.observe_construction_depot(obs(7, "Nowhere", &[("steel", 10)])), Observed::Stale);
        assert!(!reg.is_docked_at_depot());
        assert!(reg.is_empty());
    }

    #[test]
    fn shopping_list_is_sorted_and_stable() {
        let reg = SiteRegistry::with_sites(vec![
            tracked(1, &[("steel", 50)]),
            tracked(2, &[("titanium", 10), ("steel", 30)]),
        ]);
        let list = reg.total_shopping_list();
        assert_eq!(list.iter().map(|(k, v)| (k.as_str(), *v)).collect::<Vec<_>>(), vec![("steel", 80), ("titanium", 10)]);
        assert_eq!(reg.total_shopping_list(), list);
    }

    #[test]
    fn docking_elsewhere_drops_transient() {
        let mut reg = SiteRegistry::new();
        reg.dock(42, None, None);
        reg.observe_construction_depot(obs(42, "X", &[("steel", 1)]));
        reg.undock();
        assert_eq!(reg.selection(), Selection::Untracked);
        reg.dock(5, None, Some("Jameson Memorial".into()));
        assert_eq!(reg.selection(), Selection::Aggregate);
        assert!(reg.transient().is_none());
    }

    #[test]
    fn planned_site_binds_to_docked_depot() {
        let mut reg = SiteRegistry::new();
        let idx = reg.plan("Outpost", req(&[("steel", 100)]));
        reg.dock(77, Some("HIP 1".into()), Some("Planetary Construction Site: Rock".into()));
        reg.observe_construction_depot(obs(77, "Planetary Construction Site: Rock", &[("steel", 90)]));
        assert!(reg.bind_docked(idx));
        assert_eq!(reg.find_by_market(77), Some(idx));
        assert_eq!(reg.selection(), Selection::Tracked(idx));
        assert_eq!(reg.sites()[idx].needed("steel"), 90);
        assert_eq!(reg.sites()[idx].display_name(), "Outpost");
        assert!(!reg.bind_docked(idx));

        assert!(reg.unbind(77));
        assert_eq!(reg.find_by_market(77), None);
        assert_eq!(reg.sites()[idx].needed("steel"), 90);
    }
}
