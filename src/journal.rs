// ===============================
// src/journal.rs
// ===============================
//
// Journal adapters (mirip feed market data):
// - decode_line    : satu baris JSON -> JournalEvent
// - list_files     : cari Journal.*.log di journal dir, urut waktu
// - run_files      : baca file-file journal, kirim event ke channel
// - run_stdin      : sama, dari stdin (host mem-pipe event satu per baris)
//
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::domain::JournalEvent;
use crate::metrics::UNDECODABLE_LINES;

static JOURNAL_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^Journal(Alpha|Beta)?\.[0-9]{2,4}(-)?[0-9]{2}(-)?[0-9]{2}(T)?[0-9]{2}[0-9]{2}[0-9]{2}\.[0-9]{2}\.log$",
    )
    .expect("static journal filename regex")
});

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("undecodable journal line: {0}")]
    Decode(#[from] serde_json::Error),
}

pub fn decode_line(line: &str) -> Result<JournalEvent, JournalError> {
    Ok(serde_json::from_str(line.trim())?)
}

pub fn is_journal_file(name: &str) -> bool {
    JOURNAL_FILE.is_match(name)
}

/// Journal files in `dir` modified after `since` (all when None), oldest first.
pub fn list_files(dir: &Path, since: Option<SystemTime>) -> Result<Vec<PathBuf>, JournalError> {
    let io_err = |source| JournalError::Io { path: dir.to_path_buf(), source };
    let mut found: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let name = entry.file_name();
        if !is_journal_file(&name.to_string_lossy()) {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        if since.map(|s| modified > s).unwrap_or(true) {
            found.push((modified, entry.path()));
        }
    }
    found.sort();
    Ok(found.into_iter().map(|(_, p)| p).collect())
}

async fn pump<R: AsyncBufRead + Unpin>(reader: R, tx: &mpsc::Sender<JournalEvent>, source: &str) -> bool {
    let mut lines = reader.lines();
    let mut sent: u64 = 0;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match decode_line(&line) {
                    Ok(ev) => {
                        if tx.send(ev).await.is_err() {
                            // consumer gone
                            return false;
                        }
                        sent += 1;
                    }
                    Err(e) => {
                        UNDECODABLE_LINES.inc();
                        debug!(%source, error = %e, "journal line skipped");
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!(%source, error = %e, "journal read failed");
                break;
            }
        }
    }
    info!(%source, events = sent, "journal source drained");
    true
}

pub async fn run_files(tx: mpsc::Sender<JournalEvent>, paths: Vec<PathBuf>) {
    for path in paths {
        let file = match tokio::fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) => {
                error!(path = %path.display(), error = %e, "journal open failed, skipped");
                continue;
            }
        };
        if !pump(BufReader::new(file), &tx, &path.display().to_string()).await {
            break;
        }
    }
}

pub async fn run_stdin(tx: mpsc::Sender<JournalEvent>) {
    pump(BufReader::new(tokio::io::stdin()), &tx, "stdin").await;
}
