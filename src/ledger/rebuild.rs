use std::collections::{HashMap, HashSet};
use std::path::Path;

use log::{debug, info, warn};

use super::{ObservationRecord, load_observations, save_observations};
use crate::error::Result;
use crate::manifest::{LineEntry, Manifest};

/// Rebuilds the ledger's line membership from `manifest`.
///
/// Existing records keep everything except `evidence_ids`, which is refreshed
/// from the manifest. New lines get [`ObservationRecord::new`]. Lines gone from
/// the manifest are dropped. Running it again on its own output is a no-op.
pub fn rebuild(manifest: &Manifest, existing: Vec<ObservationRecord>) -> Vec<ObservationRecord> {
    let mut by_line: HashMap<String, ObservationRecord> = HashMap::with_capacity(existing.len());
    for record in existing {
        if let Some(previous) = by_line.insert(record.line_id.clone(), record) {
            warn!("ledger holds line {} more than once; keeping the later entry", previous.line_id);
        }
    }

    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for line in manifest.lines() {
        if !seen.insert(line.line_id.as_str()) {
            warn!("manifest lists line {} more than once; ignoring repeat", line.line_id);
            continue;
        }
        let record = match by_line.remove(&line.line_id) {
            Some(mut record) => {
                record.evidence_ids = line.evidence_ids.clone();
                record
            }
            None => {
                debug!("new ledger record for line {}", line.line_id);
                ObservationRecord::new(line.line_id.clone(), line.evidence_ids.clone())
            }
        };
        records.push(record);
    }

    for dropped in by_line.keys() {
        info!("line {dropped} is no longer in the manifest; dropping its record");
    }
    records
}

/// Returns the index of `line`'s record, appending a default record if absent.
pub fn ensure_record(records: &mut Vec<ObservationRecord>, line: &LineEntry) -> usize {
    if let Some(idx) = records.iter().position(|r| r.line_id == line.line_id) {
        return idx;
    }
    records.push(ObservationRecord::new(
        line.line_id.clone(),
        line.evidence_ids.clone(),
    ));
    records.len() - 1
}

/// Loads the ledger at `path`, rebuilds it against `manifest` and saves it.
pub fn build_observations(manifest: &Manifest, path: &Path) -> Result<Vec<ObservationRecord>> {
    let existing = load_observations(path)?;
    let records = rebuild(manifest, existing);
    save_observations(path, &records)?;
    info!("ledger {} rebuilt with {} lines", path.display(), records.len());
    Ok(records)
}
