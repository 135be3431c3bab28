// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : colonisation_tracker — colonisation construction tracker in Rust
Module  : config.rs
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
use std::path::PathBuf;

use clap::Parser;
use dotenvy::dotenv;

#[derive(Parser, Clone, Debug)]
#[command(name = "colonisation_tracker", version, about = "Colonisation construction tracker")]
pub struct Args {
    /// Directory holding constructions.json and fccargo.json
    #[arg(long, env = "PLUGIN_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    /// Journal files to replay, in order (stdin when none and no journal dir)
    #[arg(long = "journal", env = "JOURNAL_FILES", value_delimiter = ',')]
    pub journal_files: Vec<PathBuf>,

    /// Directory scanned for Journal.*.log files
    #[arg(long, env = "JOURNAL_DIR")]
    pub journal_dir: Option<PathBuf>,

    /// Directory with FDevIDs commodity.csv / rare_commodity.csv
    #[arg(long, env = "FDEV_IDS_DIR")]
    pub fdev_dir: Option<PathBuf>,

    /// Requirement templates (type + one column per commodity)
    #[arg(long = "requirements", env = "REQUIREMENTS_CSV")]
    pub requirements_csv: Option<PathBuf>,

    /// Plan a new site with this name (needs --plan-type)
    #[arg(long, env = "PLAN_NAME", requires = "plan_type")]
    pub plan_name: Option<String>,

    /// Requirement template used by --plan-name
    #[arg(long, env = "PLAN_TYPE")]
    pub plan_type: Option<String>,

    /// Fleet carrier CAPI payload applied before replay
    #[arg(long = "capi-fleetcarrier", env = "CAPI_FLEETCARRIER")]
    pub capi_fleetcarrier: Option<PathBuf>,

    /// Profile CAPI payload (lastStarport) applied before replay
    #[arg(long = "capi-market", env = "CAPI_MARKET")]
    pub capi_market: Option<PathBuf>,

    /// Drop fleet carrier CAPI updates
    #[arg(long, env = "IGNORE_FC_UPDATE", default_value_t = false)]
    pub ignore_fc_update: bool,

    /// Generate the contribution report over the last N weeks instead of replaying
    #[arg(long, env = "REPORT_WEEKS")]
    pub report_weeks: Option<u32>,

    /// Prometheus text dump written at the end of the run
    #[arg(long, env = "METRICS_FILE")]
    pub metrics_file: Option<PathBuf>,

    /// tracing filter, e.g. "info" or "colonisation_tracker=debug"
    #[arg(long, env = "LOG_FILTER", default_value = "info")]
    pub log_filter: String,
}

impl Args {
    /// Where the report writes its trace (next to the data dir, like the plugin did).
    pub fn report_trace_path(&self) -> PathBuf {
        self.data_dir.join("colonization.log")
    }
}

pub fn load() -> Args {
    // Pastikan .env dibaca (agar PLUGIN_DIR, JOURNAL_DIR, dll ter-load)
    let _ = dotenv();
    Args::parse()
}
