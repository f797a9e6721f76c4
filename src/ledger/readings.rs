//! Prior-readings ledger: the published readings of every manifest line,
//! flattened to one JSONL record each.

use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use super::jsonl;
use crate::error::Result;
use crate::manifest::Manifest;

/// Reading type of the placeholder written for a line with no published reading.
pub const HANDCOPY_ONLY: &str = "handcopy_only";
const HANDCOPY_NOTES: &str =
    "No published transliteration/translation recorded for this line in the manifest.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorReadingRecord {
    pub line_id: String,
    pub reading_id: Option<String>,
    pub source_id: Option<String>,
    pub source_item_id: Option<String>,
    pub page: Option<u32>,
    pub reading_type: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub notes: String,
}

impl PriorReadingRecord {
    pub fn is_placeholder(&self) -> bool {
        self.reading_type.as_deref() == Some(HANDCOPY_ONLY)
    }
}

/// One record per prior reading, in manifest order. A line without readings
/// gets a single `handcopy_only` record that points at its relief's source.
pub fn prior_reading_records(manifest: &Manifest) -> Vec<PriorReadingRecord> {
    let mut out = Vec::new();
    for relief in &manifest.corpus {
        for line in &relief.lines {
            if line.prior_readings.is_empty() {
                out.push(PriorReadingRecord {
                    line_id: line.line_id.clone(),
                    reading_id: None,
                    source_id: relief.source_id.clone(),
                    source_item_id: relief.source_item_id.clone(),
                    page: None,
                    reading_type: Some(HANDCOPY_ONLY.to_string()),
                    text: String::new(),
                    notes: HANDCOPY_NOTES.to_string(),
                });
                continue;
            }
            out.extend(line.prior_readings.iter().map(|reading| PriorReadingRecord {
                line_id: line.line_id.clone(),
                reading_id: reading.reading_id.clone(),
                source_id: reading.source_id.clone(),
                source_item_id: reading.source_item_id.clone(),
                page: reading.page,
                reading_type: reading.reading_type.clone(),
                text: reading.text.clone(),
                notes: reading.notes.clone(),
            }));
        }
    }
    out
}

/// Rewrites the prior-readings ledger at `path` from `manifest`.
pub fn build_prior_readings(manifest: &Manifest, path: &Path) -> Result<Vec<PriorReadingRecord>> {
    let records = prior_reading_records(manifest);
    jsonl::write_jsonl(path, &records)?;
    info!("{} prior readings written to {}", records.len(), path.display());
    Ok(records)
}

pub fn load_prior_readings(path: &Path) -> Result<Vec<PriorReadingRecord>> {
    jsonl::read_jsonl(path)
}
