//! Source manifest: the authoritative list of evidence files and inscription lines.
//!
//! The manifest nests evidence as `source -> item -> evidence` and lines as
//! `corpus -> relief -> line`. Schema validation happens upstream; loading here
//! only decodes the structure the ledger passes depend on.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AuditError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_version: Option<String>,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub corpus: Vec<Relief>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub source_id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub items: Vec<SourceItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceItem {
    pub item_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default)]
    pub evidence: Vec<EvidenceEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One rendered raster (full page or crop) produced by the evidence renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceEntry {
    pub evidence_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub output_path: PathBuf,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relief {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relief_id: Option<String>,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub lines: Vec<LineEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineEntry {
    pub line_id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub evidence_ids: Vec<String>,
    #[serde(default)]
    pub secondary_evidence_ids: Vec<String>,
    #[serde(default)]
    pub prior_readings: Vec<PriorReading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A published reading of a line (hand copy, transliteration, translation).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriorReading {
    #[serde(default)]
    pub reading_id: Option<String>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub source_item_id: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub reading_type: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Referential problems found by [`Manifest::check_references`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestIssue {
    UnknownEvidence { line_id: String, evidence_id: String },
    DuplicateLine { line_id: String },
}

impl std::fmt::Display for ManifestIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownEvidence {
                line_id,
                evidence_id,
            } => write!(f, "line {line_id} references unknown evidence {evidence_id}"),
            Self::DuplicateLine { line_id } => write!(f, "line {line_id} appears more than once"),
        }
    }
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| AuditError::io(path, e))?;
        serde_json::from_str(&text)
            .map_err(|e| AuditError::Manifest(format!("{}: {e}", path.display())))
    }

    /// Every line across every relief, in manifest order.
    pub fn lines(&self) -> impl Iterator<Item = &LineEntry> {
        self.corpus.iter().flat_map(|relief| relief.lines.iter())
    }

    pub fn evidence(&self) -> impl Iterator<Item = &EvidenceEntry> {
        self.sources
            .iter()
            .flat_map(|source| source.items.iter())
            .flat_map(|item| item.evidence.iter())
    }

    pub fn check_references(&self) -> Vec<ManifestIssue> {
        let known: HashSet<&str> = self.evidence().map(|e| e.evidence_id.as_str()).collect();
        let mut seen = HashSet::new();
        let mut issues = Vec::new();
        for line in self.lines() {
            if !seen.insert(line.line_id.as_str()) {
                issues.push(ManifestIssue::DuplicateLine {
                    line_id: line.line_id.clone(),
                });
            }
            for id in line.evidence_ids.iter().chain(&line.secondary_evidence_ids) {
                if !known.contains(id.as_str()) {
                    issues.push(ManifestIssue::UnknownEvidence {
                        line_id: line.line_id.clone(),
                        evidence_id: id.clone(),
                    });
                }
            }
        }
        issues
    }
}

/// Maps evidence identifiers to raster files.
pub trait EvidenceResolver {
    fn resolve(&self, evidence_id: &str) -> Option<PathBuf>;

    /// The first of `evidence_ids` that resolves, i.e. the line's primary evidence.
    fn primary(&self, evidence_ids: &[String]) -> Option<PathBuf> {
        evidence_ids.iter().find_map(|id| self.resolve(id))
    }
}

/// Evidence lookup built from a manifest; relative paths are joined onto `root`.
#[derive(Debug, Clone, Default)]
pub struct EvidenceIndex {
    root: PathBuf,
    paths: HashMap<String, PathBuf>,
}

impl EvidenceIndex {
    pub fn from_manifest(manifest: &Manifest, root: impl Into<PathBuf>) -> Self {
        let paths = manifest
            .evidence()
            .map(|e| (e.evidence_id.clone(), e.output_path.clone()))
            .collect();
        Self {
            root: root.into(),
            paths,
        }
    }

    /// The manifest-relative path, without the root applied.
    pub fn relative(&self, evidence_id: &str) -> Option<&Path> {
        self.paths.get(evidence_id).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl EvidenceResolver for EvidenceIndex {
    fn resolve(&self, evidence_id: &str) -> Option<PathBuf> {
        self.paths.get(evidence_id).map(|p| self.root.join(p))
    }
}

impl EvidenceResolver for HashMap<String, PathBuf> {
    fn resolve(&self, evidence_id: &str) -> Option<PathBuf> {
        self.get(evidence_id).cloned()
    }
}
