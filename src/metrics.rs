// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::path::Path;

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Event intake --------
pub static EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("journal_events_total", "journal events handled (label: kind)"),
        &["kind"],
    )
    .unwrap()
});

pub static UNDECODABLE_LINES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("journal_undecodable_lines_total", "journal lines that failed to decode").unwrap()
});

pub static STALE_EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "stale_events_total",
            "events dropped because no site matched (label: kind)",
        ),
        &["kind"],
    )
    .unwrap()
});

pub static CAPI_UPDATES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("capi_updates_total", "companion API payloads (labels: source, outcome)"),
        &["source", "outcome"],
    )
    .unwrap()
});

// -------- State --------
pub static SITES_TRACKED: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("sites_tracked", "tracked construction sites").unwrap());

pub static SITES_REMAINING_TONS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("sites_remaining_tons", "outstanding tons across tracked sites").unwrap()
});

pub static PERSIST_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("persist_failures_total", "snapshot writes that failed (label: file)"),
        &["file"],
    )
    .unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(EVENTS.clone())),
        REGISTRY.register(Box::new(UNDECODABLE_LINES.clone())),
        REGISTRY.register(Box::new(STALE_EVENTS.clone())),
        REGISTRY.register(Box::new(CAPI_UPDATES.clone())),
        REGISTRY.register(Box::new(SITES_TRACKED.clone())),
        REGISTRY.register(Box::new(SITES_REMAINING_TONS.clone())),
        REGISTRY.register(Box::new(PERSIST_FAILURES.clone())),
    ] {
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
pub fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

/// No HTTP endpoint here; the run ends by dumping the text format to a file.
pub fn write_to(path: &Path) -> std::io::Result<()> {
    std::fs::write(path, encode_metrics())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_registered_counters() {
        init();
        init(); // second registration is ignored
        EVENTS.with_label_values(&["Docked"]).inc();
        let text = String::from_utf8(encode_metrics()).unwrap();
        assert!(text.contains("journal_events_total"));
    }
}
