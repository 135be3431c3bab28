// ===============================
// src/store.rs (JSON snapshots: sites & carrier)
// ===============================
//
// Dua file per data dir:
// - constructions.json : list site, ditulis ulang penuh tiap mutasi
// - fccargo.json       : cargo fleet carrier + lastSync + callSign
//
// Tulis via file .tmp lalu rename, supaya crash di tengah tulis tidak
// meninggalkan file setengah jadi.
//
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::construction::ConstructionSite;

pub const SITES_FILE: &str = "constructions.json";
pub const CARRIER_FILE: &str = "fccargo.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("bad json in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Io { path: path.to_path_buf(), source }),
    }
}

fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|source| StoreError::Json { path: path.to_path_buf(), source })?;

    // Pastikan parent directory ada
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|source| StoreError::Io { path: parent.to_path_buf(), source })?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|source| StoreError::Io { path: tmp.clone(), source })?;
    fs::rename(&tmp, path).map_err(|source| StoreError::Io { path: path.to_path_buf(), source })
}

// -------- Sites --------

#[derive(Debug, Clone)]
pub struct SiteStore {
    path: PathBuf,
}

impl SiteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(SITES_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file = nothing tracked yet. Records in the old shape (`needed`
    /// instead of `required`) or otherwise unparsable are skipped one by one.
    pub fn load(&self) -> Result<Vec<ConstructionSite>, StoreError> {
        let Some(bytes) = read_optional(&self.path)? else {
            return Ok(Vec::new());
        };
        let records: Vec<Value> = serde_json::from_slice(&bytes)
            .map_err(|source| StoreError::Json { path: self.path.clone(), source })?;

        let mut sites = Vec::with_capacity(records.len());
        for (i, record) in records.into_iter().enumerate() {
            if record.get("needed").is_some() {
                debug!(index = i, path = %self.path.display(), "skipping legacy site record");
                continue;
            }
            match serde_json::from_value::<ConstructionSite>(record) {
                Ok(site) => sites.push(site),
                Err(e) => warn!(index = i, error = %e, "skipping unreadable site record"),
            }
        }
        Ok(sites)
    }

    pub fn save(&self, sites: &[ConstructionSite]) -> Result<(), StoreError> {
        write_atomic(&self.path, sites)
    }
}

// -------- Fleet carrier --------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CarrierSnapshot {
    #[serde(default)]
    pub cargo: BTreeMap<String, i64>,
    #[serde(rename = "lastSync", default)]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(rename = "callSign", default)]
    pub call_sign: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CarrierStore {
    path: PathBuf,
}

impl CarrierStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(CARRIER_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<CarrierSnapshot, StoreError> {
        match read_optional(&self.path)? {
            None => Ok(CarrierSnapshot::default()),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|source| StoreError::Json { path: self.path.clone(), source }),
        }
    }

    pub fn save(&self, snapshot: &CarrierSnapshot) -> Result<(), StoreError> {
        write_atomic(&self.path, snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construction::ResourceDemand;

    #[test]
    fn missing_files_load_as_empty() {
        let dir = tempfile::tempdir().expect("tmpdir");
        assert!(SiteStore::in_dir(dir.path()).load().expect("load").is_empty());
        assert_eq!(CarrierStore::in_dir(dir.path()).load().expect("load"), CarrierSnapshot::default());
    }

    #[test]
    fn legacy_records_are_skipped() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let path = dir.path().join(SITES_FILE);
        fs::write(
            &path,
            r#"[
                {"name": "old", "needed": {"steel": 100}, "system": null, "stationName": null, "marketId": null},
                {"system": "Col 285", "station_name": "Orbital Construction Site: Hub", "market_id": 7,
                 "construction_progress": 0.25, "construction_complete": false, "construction_failed": false,
                 "required": {"steel": {"required": 100, "provided": 10, "payment": 1000}}},
                {"system": "broken", "required": "not a map"}
            ]"#,
        )
        .expect("write");

        let sites = SiteStore::new(&path).load().expect("load");
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].market_id, Some(7));
        assert_eq!(sites[0].needed("steel"), 90);
    }

    #[test]
    fn sites_survive_save_and_load() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let store = SiteStore::in_dir(dir.path().join("nested"));
        let mut req = BTreeMap::new();
        req.insert("steel".to_string(), ResourceDemand::new(100, 120, 0));
        let site = ConstructionSite::new(Some("Sol".into()), Some("X".into()), Some(9), req);

        store.save(std::slice::from_ref(&site)).expect("save");
        let loaded = store.load().expect("load");
        assert_eq!(loaded, vec![site]);
        // over-delivery is stored as is
        assert_eq!(loaded[0].needed("steel"), -20);
    }

    #[test]
    fn carrier_snapshot_uses_original_field_names() {
        let dir = tempfile::tempdir().expect("tmpdir");
        let store = CarrierStore::in_dir(dir.path());
        fs::write(
            store.path(),
            r#"{"cargo": {"steel": 40}, "lastSync": "2025-04-01T12:00:00+00:00", "callSign": "X7Z-12B"}"#,
        )
        .expect("write");
        let snap = store.load().expect("load");
        assert_eq!(snap.cargo.get("steel"), Some(&40));
        assert_eq!(snap.call_sign.as_deref(), Some("X7Z-12B"));
        assert!(snap.last_sync.is_some());
    }
}
