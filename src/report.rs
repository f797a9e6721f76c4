//! Markdown report over the manifest and the observation ledger.

use std::fmt::{self, Write as _};
use std::fs;
use std::path::Path;

use log::{info, warn};

use crate::analysis::{DiscrepancyRecord, Severity};
use crate::error::{AuditError, Result};
use crate::ledger::{Direction, ObservationRecord, PriorReadingRecord, find_record};
use crate::manifest::{EvidenceIndex, Manifest};

const SAMPLE_CROPS: usize = 6;

/// Auto vs manual split of a record's signs, by sign id prefix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObservationStatus {
    pub auto: usize,
    pub manual: usize,
    pub crops: usize,
}

impl ObservationStatus {
    pub fn of(record: &ObservationRecord) -> Self {
        let auto = record.observed_signs.iter().filter(|s| s.is_auto()).count();
        Self {
            auto,
            manual: record.observed_signs.len() - auto,
            crops: record
                .observed_signs
                .iter()
                .filter(|s| s.crop_path.is_some())
                .count(),
        }
    }

    pub fn summary(&self) -> String {
        match (self.manual, self.auto) {
            (0, 0) => "No sign annotations recorded.".to_string(),
            (0, auto) => format!("Auto-annotated clusters {auto} (manual review required)."),
            (manual, auto) => format!("Manual observations {manual}; auto clusters {auto}."),
        }
    }
}

/// Everything the report reads besides the manifest.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportInputs<'a> {
    pub observations: &'a [ObservationRecord],
    pub prior_readings: &'a [PriorReadingRecord],
    pub discrepancies: &'a [DiscrepancyRecord],
}

/// Renders the report. Evidence links use the manifest's relative paths.
pub fn render_report(manifest: &Manifest, inputs: &ReportInputs<'_>) -> String {
    let mut out = String::new();
    // Formatting into a String only fails if a Display impl does.
    if let Err(e) = write_report(&mut out, manifest, inputs) {
        warn!("report rendering stopped early: {e}");
    }
    out
}

fn write_report(out: &mut String, manifest: &Manifest, inputs: &ReportInputs<'_>) -> fmt::Result {
    let index = EvidenceIndex::from_manifest(manifest, "");
    writeln!(out, "# Inscription Observation Report\n")?;
    writeln!(
        out,
        "Observations are uninterpreted: clusters are segmented, never identified.\n"
    )?;

    for relief in &manifest.corpus {
        writeln!(out, "## {}\n", relief.label)?;
        if let Some(notes) = relief.notes.as_deref().filter(|n| !n.is_empty()) {
            writeln!(out, "{notes}\n")?;
        }

        for line in &relief.lines {
            writeln!(out, "### Line: {}\n", line.label)?;
            if let Some(notes) = line.notes.as_deref().filter(|n| !n.is_empty()) {
                writeln!(out, "{notes}\n")?;
            }
            for id in &line.evidence_ids {
                if let Some(path) = index.relative(id) {
                    writeln!(out, "![evidence]({})\n", path.display())?;
                }
            }
            let secondary: Vec<_> = line
                .secondary_evidence_ids
                .iter()
                .filter_map(|id| index.relative(id))
                .collect();
            if !secondary.is_empty() {
                writeln!(out, "**Secondary evidence (uncertain mapping):**\n")?;
                for path in secondary {
                    writeln!(out, "![secondary]({})\n", path.display())?;
                }
            }

            write_observations(out, find_record(inputs.observations, &line.line_id))?;
            let readings: Vec<_> = inputs
                .prior_readings
                .iter()
                .filter(|r| r.line_id == line.line_id)
                .collect();
            write_prior_readings(out, &readings)?;

            let worst = inputs
                .discrepancies
                .iter()
                .filter(|d| d.line_id == line.line_id && !d.deferred)
                .map(|d| d.severity)
                .max();
            match worst {
                Some(severity) if severity > Severity::None => {
                    writeln!(out, "**Discrepancies:** worst severity {severity}.\n")?;
                }
                Some(_) => writeln!(out, "**Discrepancies:** None found.\n")?,
                None => writeln!(out, "**Discrepancies:** None computed (no observed tokens).\n")?,
            }
        }
    }
    Ok(())
}

fn write_observations(out: &mut String, record: Option<&ObservationRecord>) -> fmt::Result {
    let Some(record) = record else {
        return writeln!(out, "**Observation status:** No ledger record.\n");
    };
    let status = ObservationStatus::of(record);
    writeln!(out, "**Observation status:** {}\n", status.summary())?;

    if let Some(sheet) = &record.cluster_contact_sheet {
        writeln!(out, "**Cluster contact sheet:**\n\n![cluster-sheet]({sheet})\n")?;
    } else if status.crops > 0 {
        writeln!(out, "**Cluster crops (sample):**\n")?;
        for crop in record
            .observed_signs
            .iter()
            .filter_map(|s| s.crop_path.as_deref())
            .take(SAMPLE_CROPS)
        {
            writeln!(out, "![cluster]({crop})")?;
        }
        out.push('\n');
    }

    let dir = &record.directionality;
    if dir.value != Direction::Unknown {
        writeln!(
            out,
            "**Directionality:** {} (basis: {}; confidence {})\n",
            dir.value, dir.basis, dir.confidence
        )?;
    }
    Ok(())
}

fn write_prior_readings(out: &mut String, readings: &[&PriorReadingRecord]) -> fmt::Result {
    if readings.is_empty() {
        return Ok(());
    }
    writeln!(out, "**Prior readings:**\n")?;
    for reading in readings {
        let mut provenance = format!(
            "{}/{}",
            reading.source_id.as_deref().unwrap_or("unknown_source"),
            reading.source_item_id.as_deref().unwrap_or("unknown_item"),
        );
        if let Some(page) = reading.page {
            write!(provenance, " p.{page}")?;
        }
        let kind = reading.reading_type.as_deref().unwrap_or("reading");
        writeln!(out, "- {kind}: {provenance}")?;
        if !reading.text.is_empty() {
            writeln!(out, "  text: {}", reading.text)?;
        }
        if !reading.notes.is_empty() {
            writeln!(out, "  notes: {}", reading.notes)?;
        }
    }
    out.push('\n');
    Ok(())
}

pub fn build_report(manifest: &Manifest, inputs: &ReportInputs<'_>, output_path: &Path) -> Result<()> {
    let text = render_report(manifest, inputs);
    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| AuditError::io(parent, e))?;
    }
    fs::write(output_path, text).map_err(|e| AuditError::io(output_path, e))?;
    info!("report written to {}", output_path.display());
    Ok(())
}
