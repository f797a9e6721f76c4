//! Observation-first audit of inscription evidence.
//!
//! Evidence rasters are segmented into uninterpreted glyph clusters, recorded
//! in a JSONL observation ledger keyed by inscription line, cropped into
//! per-sign images and summarised in a Markdown report.

pub mod analysis;
pub mod auto_annotate;
pub mod cluster_crops;
pub mod error;
pub mod ledger;
pub mod manifest;
pub mod report;
pub mod segment;

pub use error::{AuditError, Result};
