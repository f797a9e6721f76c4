//! The observation ledger: one JSONL record per inscription line.
//!
//! Every mutating operation is a full load, an in-memory change and a full
//! rewrite of the file. There is no locking: callers must guarantee a single
//! writer per ledger file, and a crash during a save can truncate it.

pub mod jsonl;
pub mod observe;
pub mod readings;
pub mod rebuild;
pub mod record;

use std::path::Path;

pub use observe::{
    AUTO_NOTES, AUTO_UNCERTAINTY, ManualObservation, MergeOutcome, add_sign_observation,
    merge_auto_annotations,
};
pub use readings::{
    HANDCOPY_ONLY, PriorReadingRecord, build_prior_readings, load_prior_readings,
    prior_reading_records,
};
pub use rebuild::{build_observations, ensure_record, rebuild};
pub use record::{
    AUTO_SIGN_PREFIX, Direction, Directionality, ObservationRecord, SignBBox, SignObservation,
};

use crate::error::Result;

pub fn load_observations(path: &Path) -> Result<Vec<ObservationRecord>> {
    jsonl::read_jsonl(path)
}

pub fn save_observations(path: &Path, records: &[ObservationRecord]) -> Result<()> {
    jsonl::write_jsonl(path, records)
}

/// Looks up a record by line id.
pub fn find_record<'a>(
    records: &'a [ObservationRecord],
    line_id: &str,
) -> Option<&'a ObservationRecord> {
    records.iter().find(|r| r.line_id == line_id)
}
