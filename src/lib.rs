// ===============================
// src/lib.rs
// ===============================
pub mod carrier;
pub mod commodity;
pub mod config;
pub mod construction;
pub mod domain;
pub mod journal;
pub mod ledger;
pub mod metrics;
pub mod reconciler;
pub mod registry;
pub mod report;
pub mod store;
