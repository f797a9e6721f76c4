use std::path::Path;

use log::{debug, info};
use serde_json::Map;

use super::{
    Direction, Directionality, ObservationRecord, SignBBox, SignObservation, load_observations,
    save_observations,
};
use crate::error::{AuditError, Result};

pub const AUTO_NOTES: &str =
    "Auto-segmented glyph clusters from evidence image; uninterpreted and requires review.";
/// Uncertainty of a line whose signs were all machine-segmented.
pub const AUTO_UNCERTAINTY: f64 = 0.9;

const MANUAL_BASIS: &str = "manual";
const MANUAL_DIRECTION_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Applied,
    /// The line already had observations and overwrite was not requested.
    Protected,
}

/// Installs auto-detected signs on `line_id`'s record.
///
/// A record that already has observed signs is left alone unless `overwrite`
/// is set. Otherwise its signs are replaced wholesale, its notes set to the
/// auto provenance string and its uncertainty to [`AUTO_UNCERTAINTY`].
pub fn merge_auto_annotations(
    records: &mut [ObservationRecord],
    line_id: &str,
    detected: Vec<SignObservation>,
    overwrite: bool,
) -> Result<MergeOutcome> {
    let record = records
        .iter_mut()
        .find(|r| r.line_id == line_id)
        .ok_or_else(|| AuditError::NotFound(line_id.to_string()))?;

    if !record.observed_signs.is_empty() && !overwrite {
        debug!(
            "line {line_id} already has {} signs; keeping them",
            record.observed_signs.len()
        );
        return Ok(MergeOutcome::Protected);
    }

    record.observed_signs = detected;
    record.notes = AUTO_NOTES.to_string();
    record.uncertainty = AUTO_UNCERTAINTY;
    Ok(MergeOutcome::Applied)
}

/// A manual observation of one sign, optionally restating the line's direction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManualObservation {
    pub sign_id: String,
    pub description: String,
    pub bbox: Option<[f64; 4]>,
    pub confidence: Option<f64>,
    pub direction: Option<Direction>,
    pub direction_basis: Option<String>,
    pub direction_confidence: Option<f64>,
}

impl ManualObservation {
    pub fn new(sign_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            sign_id: sign_id.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    fn to_sign(&self) -> Result<SignObservation> {
        let mut sign = SignObservation::new(self.sign_id.clone(), self.description.clone());
        if let Some(coords) = self.bbox {
            sign.bbox = Some(SignBBox::from_coords(coords).ok_or_else(|| {
                AuditError::MalformedEvidence {
                    sign_id: self.sign_id.clone(),
                    reason: format!("non-finite coordinate in {coords:?}"),
                }
            })?);
        }
        if let Some(confidence) = self.confidence {
            sign.confidence = Some(unit_interval("confidence", confidence)?);
        }
        Ok(sign)
    }

    fn to_directionality(&self) -> Result<Option<Directionality>> {
        let Some(value) = self.direction.clone() else {
            return Ok(None);
        };
        let basis = self
            .direction_basis
            .as_deref()
            .filter(|b| !b.is_empty())
            .unwrap_or(MANUAL_BASIS);
        let confidence = unit_interval(
            "direction confidence",
            self.direction_confidence.unwrap_or(MANUAL_DIRECTION_CONFIDENCE),
        )?;
        Ok(Some(Directionality {
            value,
            basis: basis.to_string(),
            confidence,
            extra: Map::new(),
        }))
    }
}

fn unit_interval(name: &str, value: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(AuditError::Configuration(format!(
            "{name} must lie in [0, 1], got {value}"
        )))
    }
}

/// Appends `observation` to `line_id`'s record in the ledger at `path`.
///
/// Load, mutate and save happen in one call; on any error the file is not
/// written. Only one writer may touch the ledger at a time. `uncertainty` is left
/// as it was.
pub fn add_sign_observation(
    path: &Path,
    line_id: &str,
    observation: &ManualObservation,
) -> Result<ObservationRecord> {
    let sign = observation.to_sign()?;
    let directionality = observation.to_directionality()?;

    let mut records = load_observations(path)?;
    let record = records
        .iter_mut()
        .find(|r| r.line_id == line_id)
        .ok_or_else(|| AuditError::NotFound(line_id.to_string()))?;

    record.observed_signs.push(sign);
    if let Some(directionality) = directionality {
        record.directionality = directionality;
    }
    let updated = record.clone();

    save_observations(path, &records)?;
    info!(
        "recorded sign {} on line {line_id} ({} signs)",
        observation.sign_id,
        updated.observed_signs.len()
    );
    Ok(updated)
}
