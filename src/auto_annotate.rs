//! Turns detected glyph clusters into low-confidence, uninterpreted sign observations.

use std::path::Path;

use log::{debug, info, warn};

use crate::error::{AuditError, Result};
use crate::ledger::{
    self, AUTO_SIGN_PREFIX, MergeOutcome, SignBBox, SignObservation, ensure_record,
    merge_auto_annotations,
};
use crate::manifest::{EvidenceResolver, Manifest};
use crate::segment::{SegmentConfig, segment_glyph_clusters};

pub const AUTO_DESCRIPTION: &str = "auto-segmented glyph cluster (uninterpreted)";
/// Machine-segmented, not machine-identified.
pub const AUTO_CONFIDENCE: f64 = 0.2;

/// Segments one evidence image and returns one sign per cluster, numbered from 1
/// in detection order. The ledger is not touched.
pub fn auto_annotate_line(
    image_path: &Path,
    line_id: &str,
    config: &SegmentConfig,
) -> Result<Vec<SignObservation>> {
    config.validate()?;
    let img = image::open(image_path).map_err(|e| AuditError::image(image_path, e))?;
    let boxes = segment_glyph_clusters(&img, config)?;

    Ok(boxes
        .iter()
        .enumerate()
        .map(|(idx, bbox)| {
            let mut sign = SignObservation::new(
                format!("{AUTO_SIGN_PREFIX}{line_id}-{}", idx + 1),
                AUTO_DESCRIPTION,
            );
            sign.bbox = Some(SignBBox::from_box(bbox));
            sign.confidence = Some(AUTO_CONFIDENCE);
            sign
        })
        .collect())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnotateSummary {
    pub annotated: usize,
    pub protected: usize,
    pub missing_evidence: usize,
    pub failed: usize,
}

/// Auto-annotates every manifest line and saves the ledger once.
///
/// Lines that already carry observations are skipped before any image is
/// decoded unless `overwrite` is set. A line whose evidence cannot be resolved
/// or decoded is logged and skipped; the rest of the batch continues.
pub fn annotate_manifest(
    manifest: &Manifest,
    resolver: &impl EvidenceResolver,
    ledger_path: &Path,
    config: &SegmentConfig,
    overwrite: bool,
) -> Result<AnnotateSummary> {
    config.validate()?;
    let mut records = ledger::load_observations(ledger_path)?;
    let mut summary = AnnotateSummary::default();

    for line in manifest.lines() {
        let idx = ensure_record(&mut records, line);
        if !records[idx].observed_signs.is_empty() && !overwrite {
            summary.protected += 1;
            continue;
        }

        let Some(image_path) = resolver.primary(&line.evidence_ids) else {
            debug!("line {} has no resolvable evidence; skipping", line.line_id);
            summary.missing_evidence += 1;
            continue;
        };

        let signs = match auto_annotate_line(&image_path, &line.line_id, config) {
            Ok(signs) => signs,
            Err(e) => {
                warn!("auto-annotation failed for line {}: {e}", line.line_id);
                summary.failed += 1;
                continue;
            }
        };
        debug!("line {}: {} clusters", line.line_id, signs.len());

        match merge_auto_annotations(&mut records, &line.line_id, signs, overwrite)? {
            MergeOutcome::Applied => summary.annotated += 1,
            MergeOutcome::Protected => summary.protected += 1,
        }
    }

    ledger::save_observations(ledger_path, &records)?;
    info!(
        "auto-annotate: {} annotated, {} protected, {} without evidence, {} failed",
        summary.annotated, summary.protected, summary.missing_evidence, summary.failed
    );
    Ok(summary)
}
