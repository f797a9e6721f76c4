//! Discrepancy scoring between observed sign tokens and prior published readings.

use std::fmt;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ledger::jsonl;
use crate::manifest::Manifest;

const MINOR_LIMIT: f64 = 0.5;
const MAJOR_LIMIT: f64 = 0.8;
const DEFERRED_NOTES: &str = "No observed tokens to compare; discrepancy scoring deferred.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Minor,
    Major,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikelyCause {
    NoData,
    DirectionalityMismatch,
    NoDiscrepancy,
    SignConfusion,
    OmissionOrAddition,
    SubstantialDivergence,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::None => "none",
            Severity::Minor => "minor",
            Severity::Major => "major",
            Severity::Critical => "critical",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiscrepancyScore {
    pub severity: Severity,
    pub diff_ratio: f64,
    pub likely_cause: LikelyCause,
}

/// Scores how far `observed` strays from `prior`.
///
/// Differences are positional mismatches over the shared prefix plus the
/// length difference, divided by the longer length. A directionality mismatch
/// is always `Major`, whatever the tokens say.
pub fn score_discrepancy<A: AsRef<str>, B: AsRef<str>>(
    observed: &[A],
    prior: &[B],
    directionality_mismatch: bool,
) -> DiscrepancyScore {
    if observed.is_empty() && prior.is_empty() {
        return DiscrepancyScore {
            severity: Severity::None,
            diff_ratio: 0.0,
            likely_cause: LikelyCause::NoData,
        };
    }
    if directionality_mismatch {
        return DiscrepancyScore {
            severity: Severity::Major,
            diff_ratio: 1.0,
            likely_cause: LikelyCause::DirectionalityMismatch,
        };
    }

    let total = observed.len().max(prior.len());
    let mismatched = observed
        .iter()
        .zip(prior)
        .filter(|&(a, b)| a.as_ref() != b.as_ref())
        .count();
    let diffs = mismatched + observed.len().abs_diff(prior.len());
    let diff_ratio = diffs as f64 / total as f64;

    let (severity, likely_cause) = if diffs == 0 {
        (Severity::None, LikelyCause::NoDiscrepancy)
    } else if diff_ratio <= MINOR_LIMIT {
        (Severity::Minor, LikelyCause::SignConfusion)
    } else if diff_ratio <= MAJOR_LIMIT {
        (Severity::Major, LikelyCause::OmissionOrAddition)
    } else {
        (Severity::Critical, LikelyCause::SubstantialDivergence)
    };
    DiscrepancyScore {
        severity,
        diff_ratio,
        likely_cause,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscrepancyRecord {
    pub line_id: String,
    pub reading_id: Option<String>,
    pub severity: Severity,
    pub diff_ratio: f64,
    pub likely_cause: LikelyCause,
    pub notes: String,
    /// Set while no observed tokens exist; the severity is then a placeholder.
    #[serde(default)]
    pub deferred: bool,
}

/// One record per prior reading of each manifest line. No sign is ever
/// identified, so the observed side is empty and scoring stays deferred.
pub fn discrepancy_records(manifest: &Manifest) -> Vec<DiscrepancyRecord> {
    let observed: [String; 0] = [];
    manifest
        .lines()
        .flat_map(|line| {
            line.prior_readings.iter().map(|reading| {
                let score = score_discrepancy(&observed, &reading.tokens, false);
                DiscrepancyRecord {
                    line_id: line.line_id.clone(),
                    reading_id: reading.reading_id.clone(),
                    severity: score.severity,
                    diff_ratio: score.diff_ratio,
                    likely_cause: score.likely_cause,
                    notes: DEFERRED_NOTES.to_string(),
                    deferred: true,
                }
            })
        })
        .collect()
}

pub fn build_discrepancies(manifest: &Manifest, output_path: &Path) -> Result<Vec<DiscrepancyRecord>> {
    let records = discrepancy_records(manifest);
    jsonl::write_jsonl(output_path, &records)?;
    info!("{} discrepancy records written to {}", records.len(), output_path.display());
    Ok(records)
}
