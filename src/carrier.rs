// ===============================
// src/carrier.rs (fleet carrier hold)
// ===============================
use chrono::{DateTime, SubsecRound, Utc};
use tracing::{info, warn};

use crate::domain::CapiFleetCarrier;
use crate::ledger::CargoLedger;
use crate::metrics::PERSIST_FAILURES;
use crate::store::{CarrierSnapshot, CarrierStore};

/// Carrier cargo: replaced wholesale by a CAPI sync, nudged by transfers and
/// carrier-market trades in between.
#[derive(Debug, Default)]
pub struct FleetCarrierState {
    call_sign: Option<String>,
    last_sync: Option<DateTime<Utc>>,
    cargo: CargoLedger,
    store: Option<CarrierStore>,
}

impl FleetCarrierState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore from disk. An unreadable file is logged and treated as unsynced.
    pub fn open(store: CarrierStore) -> Self {
        let snapshot = match store.load() {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "carrier snapshot unreadable, starting empty");
                CarrierSnapshot::default()
            }
        };
        Self {
            call_sign: snapshot.call_sign.filter(|c| !c.is_empty()),
            last_sync: snapshot.last_sync,
            cargo: snapshot.cargo.into_iter().collect(),
            store: Some(store),
        }
    }

    pub fn call_sign(&self) -> Option<&str> {
        self.call_sign.as_deref()
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync
    }

    pub fn cargo(&self) -> &CargoLedger {
        &self.cargo
    }

    pub fn get(&self, resource: &str) -> i64 {
        self.cargo.get(resource)
    }

    /// True when the given station name is this carrier.
    pub fn is_docked_at(&self, station_name: Option<&str>) -> bool {
        match (self.call_sign.as_deref(), station_name) {
            (Some(cs), Some(st)) => cs.eq_ignore_ascii_case(st.trim()),
            _ => false,
        }
    }

    /// Returns false (and changes nothing) when the payload has no call sign:
    /// no carrier owned, or CAPI not queried yet.
    pub fn sync_from_snapshot(&mut self, data: &CapiFleetCarrier) -> bool {
        let call_sign = match data.name.callsign.as_deref().map(str::trim) {
            Some(cs) if !cs.is_empty() => cs.to_string(),
            _ => return false,
        };

        self.cargo.replace(data.cargo.iter().map(|c| (c.commodity.as_str(), c.qty)));
        self.call_sign = Some(call_sign);
        self.last_sync = Some(Utc::now().trunc_subsecs(0));
        info!(
            call_sign = ?self.call_sign,
            items = data.cargo.len(),
            tons = self.cargo.total(),
            "carrier synced"
        );
        self.persist();
        true
    }

    pub fn add(&mut self, resource: &str, qty: i64) -> i64 {
        let v = self.cargo.add(resource, qty);
        self.persist();
        v
    }

    pub fn remove(&mut self, resource: &str, qty: i64) -> i64 {
        let v = self.cargo.remove(resource, qty);
        self.persist();
        v
    }

    pub fn snapshot(&self) -> CarrierSnapshot {
        CarrierSnapshot {
            cargo: self.cargo.iter().map(|(k, v)| (k.to_string(), v)).collect(),
            last_sync: self.last_sync,
            call_sign: self.call_sign.clone(),
        }
    }

    fn persist(&self) {
        let Some(store) = &self.store else { return };
        if let Err(e) = store.save(&self.snapshot()) {
            PERSIST_FAILURES.with_label_values(&["carrier"]).inc();
            warn!(error = %e, "carrier snapshot write failed");
        }
    }
}
