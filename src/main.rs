// ===============================
// src/main.rs
// ===============================
/*
 cd /home/kukuhtw/rust/colonisation_tracker

 # replay satu sesi journal, snapshot ditulis ke ./data
 cargo run -- --data-dir ./data --journal-dir ~/Saved\ Games/Frontier\ Developments/Elite\ Dangerous

 # report kontribusi 4 minggu terakhir
 cargo run -- --data-dir ./data --journal-dir <dir> --report-weeks 4
*/
/*
=============================================================================
Project : colonisation_tracker — colonisation construction tracker in Rust
Module  : main.rs
Version : 0.5.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
Email   : kukuhtw@gmail.com
WhatsApp: https://wa.me/628129893706
LinkedIn: https://id.linkedin.com/in/kukuhtw
License : MIT (see LICENSE)

Summary : Replays game journal events (cargo, docking, colonisation depot
          and contribution events), tracks construction sites, ship and
          fleet-carrier holds, persists JSON snapshots, and renders the
          per-resource shopping list.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
use std::error::Error;
use std::path::Path;
use std::time::{Duration, SystemTime};

use colonisation_tracker::{
    commodity::{CommodityTable, RequirementTemplates},
    config::{self, Args},
    domain::{CapiFleetCarrier, CapiMarket, JournalEvent},
    journal, metrics,
    reconciler::EventReconciler,
    report::{self, ReportMsg},
};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const WEEK: Duration = Duration::from_secs(7 * 24 * 3600);

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Box<dyn Error>> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // ---- Load config ----
    let args = config::load();

    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log_filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ---- Metrics ----
    metrics::init();

    info!(
        data_dir = %args.data_dir.display(),
        journal_files = args.journal_files.len(),
        journal_dir = ?args.journal_dir,
        fdev_dir = ?args.fdev_dir,
        ignore_fc_update = args.ignore_fc_update,
        report_weeks = ?args.report_weeks,
        "startup config"
    );

    if let Some(weeks) = args.report_weeks {
        run_report(&args, weeks).await?;
    } else {
        run_replay(&args).await?;
    }

    if let Some(path) = &args.metrics_file {
        if let Err(e) = metrics::write_to(path) {
            warn!(path = %path.display(), error = %e, "metrics dump failed");
        }
    }
    Ok(())
}

async fn run_replay(args: &Args) -> Result<(), Box<dyn Error>> {
    std::fs::create_dir_all(&args.data_dir)?;

    // ---- Static lookup data ----
    let commodities = match &args.fdev_dir {
        Some(dir) => CommodityTable::load_dir(dir).unwrap_or_else(|e| {
            warn!(error = %e, "commodity table unavailable, showing raw symbols");
            CommodityTable::new()
        }),
        None => CommodityTable::new(),
    };

    let mut state = EventReconciler::open(&args.data_dir, commodities);
    state.set_ignore_fc_update(args.ignore_fc_update);

    if let (Some(name), Some(kind)) = (&args.plan_name, &args.plan_type) {
        let templates = match &args.requirements_csv {
            Some(path) => RequirementTemplates::load(path)?,
            None => RequirementTemplates::default(),
        };
        match templates.get(kind) {
            Some(required) => {
                state.registry_mut().plan(name, required);
            }
            None => warn!(%kind, known = ?templates.types(), "unknown construction type, nothing planned"),
        }
    }

    // ---- Companion API payloads ----
    if let Some(path) = &args.capi_fleetcarrier {
        match read_json::<CapiFleetCarrier>(path) {
            Ok(data) => {
                state.apply_capi_fleetcarrier(&data);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "fleet carrier payload unreadable"),
        }
    }
    if let Some(path) = &args.capi_market {
        match read_json::<CapiMarket>(path) {
            Ok(data) => state.apply_capi_market(&data),
            Err(e) => warn!(path = %path.display(), error = %e, "market payload unreadable"),
        }
    }

    // ---- Journal feed ----
    let (ev_tx, mut ev_rx) = mpsc::channel::<JournalEvent>(4096);
    let mut files = args.journal_files.clone();
    if let Some(dir) = &args.journal_dir {
        files.extend(journal::list_files(dir, None)?);
    }
    let feed = if files.is_empty() {
        info!("reading journal events from stdin");
        tokio::spawn(journal::run_stdin(ev_tx))
    } else {
        info!(files = files.len(), "replaying journal files");
        tokio::spawn(journal::run_files(ev_tx, files))
    };

    // ---- Reconcile, one event at a time ----
    let mut handled: u64 = 0;
    while let Some(ev) = ev_rx.recv().await {
        state.handle(&ev);
        handled += 1;
    }
    let _ = feed.await;

    let view = state.view();
    info!(
        events = handled,
        sites = view.tracked_sites,
        remaining = view.total_remaining,
        "replay finished"
    );
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

async fn run_report(args: &Args, weeks: u32) -> Result<(), Box<dyn Error>> {
    let Some(dir) = &args.journal_dir else {
        return Err("--report-weeks needs --journal-dir".into());
    };
    let since = SystemTime::now().checked_sub(WEEK * weeks);
    let files = journal::list_files(dir, since)?;
    std::fs::create_dir_all(&args.data_dir)?;

    let (worker, mut rx) = report::spawn(files, args.report_trace_path());
    while let Some(msg) = rx.recv().await {
        match msg {
            ReportMsg::Status(s) => info!(status = %s, "report"),
            ReportMsg::Progress(p) => info!(progress = p, "report"),
            ReportMsg::Log(line) => print!("{line}"),
            ReportMsg::Clear => println!(),
        }
    }
    worker.await??;
    Ok(())
}
