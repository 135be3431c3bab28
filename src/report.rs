// ===============================
// src/report.rs (background journal scan report)
// ===============================
//
// Scan journal history, hitung kontribusi per commander per station.
// Jalan di worker terpisah (spawn_blocking); progress & log dikirim lewat
// channel, tidak pernah menyentuh state reconciler yang live.
//
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::construction::short_station_name;

#[derive(Debug, Clone, PartialEq)]
pub enum ReportMsg {
    Status(String),
    Progress(u8),
    Log(String),
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationTally {
    pub market_id: u64,
    pub station_name: String,
    pub localised_name: Option<String>,
    pub station_type: String,
    pub system: String,
    pub complete: bool,
    pub failed: bool,
    /// commander -> tons
    pub contributed: BTreeMap<String, i64>,
}

impl StationTally {
    pub fn name(&self) -> String {
        let raw = self.localised_name.as_deref().unwrap_or(&self.station_name);
        short_station_name(Some(raw), Some(&self.system))
    }
}

impl std::fmt::Display for StationTally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self.localised_name.as_deref().unwrap_or(&self.station_name);
        write!(f, "{} in {} ({})", name, self.system, self.market_id)
    }
}

#[derive(Debug, Deserialize)]
struct Stamped {
    timestamp: String,
    #[serde(flatten)]
    entry: ReportEntry,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event")]
enum ReportEntry {
    Fileheader,
    Commander {
        #[serde(rename = "Name")]
        name: String,
        #[serde(rename = "FID", default)]
        fid: String,
    },
    Docked {
        #[serde(rename = "MarketID")]
        market_id: u64,
        #[serde(rename = "StationName")]
        station_name: String,
        #[serde(rename = "StationName_Localised", default)]
        localised: Option<String>,
        #[serde(rename = "StationType", default)]
        station_type: String,
        #[serde(rename = "StarSystem", default)]
        system: String,
    },
    Undocked,
    ColonisationContribution {
        #[serde(rename = "MarketID")]
        market_id: u64,
        #[serde(rename = "Contributions", default)]
        contributions: Vec<Amount>,
    },
    ColonisationConstructionDepot {
        #[serde(rename = "MarketID")]
        market_id: u64,
        #[serde(rename = "ConstructionComplete", default)]
        complete: bool,
        #[serde(rename = "ConstructionFailed", default)]
        failed: bool,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Amount {
    #[serde(rename = "Amount")]
    amount: i64,
}

/// Journal state machine for the report. Feed it lines in file order.
#[derive(Debug, Default)]
pub struct ReportScanner {
    cmdr: Option<(String, String)>,
    market_id: Option<u64>,
    stations: BTreeMap<u64, StationTally>,
    timestamp: String,
}

impl ReportScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stations(&self) -> impl Iterator<Item = &StationTally> {
        self.stations.values()
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Returns a log line when the entry is worth reporting.
    pub fn parse_line(&mut self, line: &str) -> Option<String> {
        let stamped: Stamped = match serde_json::from_str(line) {
            Ok(s) => s,
            Err(e) => return Some(format!("Invalid journal entry:\n{line}\nexception: {e}\n")),
        };
        self.timestamp = stamped.timestamp;

        match stamped.entry {
            ReportEntry::Fileheader => {
                self.cmdr = None;
                self.market_id = None;
                None
            }
            ReportEntry::Commander { name, fid } => {
                if self.cmdr.as_ref() != Some(&(name.clone(), fid.clone())) {
                    self.cmdr = Some((name, fid));
                    self.market_id = None;
                }
                None
            }
            ReportEntry::Docked { market_id, station_name, localised, station_type, system } => {
                self.market_id = Some(market_id);
                let station = self.stations.entry(market_id).or_insert_with(|| StationTally {
                    market_id,
                    station_name: station_name.clone(),
                    localised_name: localised.clone(),
                    station_type,
                    system,
                    complete: false,
                    failed: false,
                    contributed: BTreeMap::new(),
                });
                if station.station_name != station_name {
                    let old = std::mem::replace(&mut station.station_name, station_name);
                    station.localised_name = localised;
                    return Some(format!("Station renamed from \"{old}\" to \"{}\"\n", station.station_name));
                }
                None
            }
            ReportEntry::Undocked => {
                self.market_id = None;
                None
            }
            ReportEntry::ColonisationContribution { market_id, contributions } => {
                if self.market_id != Some(market_id) {
                    return Some(format!(
                        "Invalid \"ColonisationContribution\" entry: {market_id} != {:?}\n",
                        self.market_id
                    ));
                }
                let cmdr = self.cmdr.as_ref().map(|c| c.0.clone()).unwrap_or_default();
                let Some(station) = self.stations.get_mut(&market_id) else {
                    return Some(format!(
                        "Invalid \"ColonisationContribution\" entry: unknown marketId {market_id}\n"
                    ));
                };
                let tons: i64 = contributions.iter().map(|c| c.amount).sum();
                *station.contributed.entry(cmdr.clone()).or_insert(0) += tons;
                Some(format!(
                    "\"ColonisationContribution\" event, cmdr:{cmdr} market: \"{station} contributed {tons} ton\"\n"
                ))
            }
            ReportEntry::ColonisationConstructionDepot { market_id, complete, failed } => {
                if self.market_id != Some(market_id) {
                    return Some(format!(
                        "Invalid \"ColonisationConstructionDepot\" entry: {market_id} != {:?}\n",
                        self.market_id
                    ));
                }
                let Some(station) = self.stations.get_mut(&market_id) else {
                    return Some(format!(
                        "Invalid \"ColonisationConstructionDepot\" entry: unknown marketId {market_id}\n"
                    ));
                };
                let mut out = String::new();
                if complete && !station.complete {
                    station.complete = true;
                    out.push_str(&format!("ConstructionComplete: {station}\n"));
                }
                if failed && !station.failed {
                    station.failed = true;
                    out.push_str(&format!("ConstructionFailed: {station}\n"));
                }
                (!out.is_empty()).then_some(out)
            }
            ReportEntry::Other => None,
        }
    }

    /// One line per commander per station that received anything.
    pub fn summary(&self) -> Vec<String> {
        let mut out = Vec::new();
        for station in self.stations.values() {
            for (cmdr, tons) in &station.contributed {
                out.push(format!(
                    "cmdr {cmdr}: contributed {tons:6} to \"{}\" in system {}\n",
                    station.name(),
                    station.system
                ));
            }
        }
        out
    }
}

/// Blocking worker: scan `files` in order, mirror log lines into `trace_path`.
pub fn generate(
    files: &[PathBuf],
    trace_path: &Path,
    tx: &mpsc::UnboundedSender<ReportMsg>,
) -> std::io::Result<ReportScanner> {
    let mut trace = BufWriter::new(File::create(trace_path)?);
    let mut scanner = ReportScanner::new();
    let total = files.len().max(1);

    let _ = tx.send(ReportMsg::Status("Starting...".into()));
    let _ = tx.send(ReportMsg::Progress(0));
    for (i, path) in files.iter().enumerate() {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let _ = tx.send(ReportMsg::Status(name));
        let _ = tx.send(ReportMsg::Progress(((i * 100) / total) as u8));
        writeln!(trace, "Opening file {}", path.display())?;

        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "report: journal open failed");
                continue;
            }
        };
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Some(text) = scanner.parse_line(&line) {
                write!(trace, "{}: {}", scanner.timestamp(), text)?;
                let _ = tx.send(ReportMsg::Log(text));
            }
        }
    }
    let _ = tx.send(ReportMsg::Status("Done".into()));
    let _ = tx.send(ReportMsg::Progress(100));
    let _ = tx.send(ReportMsg::Clear);

    writeln!(trace, "\nTotal:")?;
    for text in scanner.summary() {
        write!(trace, "{}: {}", scanner.timestamp(), text)?;
        let _ = tx.send(ReportMsg::Log(text));
    }
    trace.flush()?;
    info!(files = files.len(), stations = scanner.stations.len(), "report finished");
    Ok(scanner)
}

/// Run [`generate`] off the async runtime; messages arrive on the returned receiver.
pub fn spawn(
    files: Vec<PathBuf>,
    trace_path: PathBuf,
) -> (JoinHandle<std::io::Result<ReportScanner>>, mpsc::UnboundedReceiver<ReportMsg>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::task::spawn_blocking(move || generate(&files, &trace_path, &tx));
    (handle, rx)
}
