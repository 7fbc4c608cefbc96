//! Bulk management of Redash data sources
//!
//! Select data sources by database name, by failed connection test or by id,
//! snapshot the selection to disk, delete it, and restore it later from the
//! snapshot. Every fan-out runs behind an [`gate::AdmissionGate`] and records
//! per-item failures instead of aborting.
//!
//! # Module Structure
//!
//! - [`redash`] - HTTP client for `/api/data_sources`
//! - [`gate`] - bounded-concurrency admission gate
//! - [`selection`] - criteria and the concurrent selection engine
//! - [`backup`] - snapshot files
//! - [`bulk`] - bulk delete / restore fan-outs
//! - [`config`] - environments and saved preferences
//! - [`app`] - per-environment session tying the above together

pub mod app;
pub mod backup;
pub mod bulk;
pub mod config;
pub mod datasource;
pub mod error;
pub mod gate;
pub mod redash;
pub mod selection;

pub use error::{Error, Result};
