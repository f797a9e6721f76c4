//! Observation records: one per inscription line, holding sign observations.
//!
//! Fields the ledger does not know about are kept in `extra` maps so that a
//! load/save cycle never drops data written by newer tools.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::{AuditError, Result};
use crate::segment::BoundingBox;

/// Sign ids starting with this prefix were produced by the auto-annotator.
/// Report counts split signs into auto and manual by testing it.
pub const AUTO_SIGN_PREFIX: &str = "auto-";

pub(crate) const DEFAULT_BASIS: &str = "not evaluated";
pub(crate) const DEFAULT_NOTES: &str =
    "No manual sign annotation yet; observations intentionally empty.";

/// Reading direction of a line. Values written by other tools that are not
/// one of the known directions are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Direction {
    LeftToRight,
    RightToLeft,
    TopToBottom,
    BottomToTop,
    #[default]
    Unknown,
    Other(String),
}

impl Direction {
    /// The known directions, the ones the CLI accepts.
    pub const ALL: [Direction; 5] = [
        Direction::LeftToRight,
        Direction::RightToLeft,
        Direction::TopToBottom,
        Direction::BottomToTop,
        Direction::Unknown,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Direction::LeftToRight => "left_to_right",
            Direction::RightToLeft => "right_to_left",
            Direction::TopToBottom => "top_to_bottom",
            Direction::BottomToTop => "bottom_to_top",
            Direction::Unknown => "unknown",
            Direction::Other(raw) => raw,
        }
    }
}

impl From<String> for Direction {
    fn from(raw: String) -> Self {
        Direction::ALL
            .into_iter()
            .find(|d| d.as_str() == raw)
            .unwrap_or(Direction::Other(raw))
    }
}

impl From<Direction> for String {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Direction::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| {
                let names: Vec<String> = Direction::ALL.iter().map(Direction::to_string).collect();
                format!("unknown direction {s:?}, expected one of {}", names.join(", "))
            })
    }
}

/// Claimed reading direction of a line and what it rests on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directionality {
    #[serde(default)]
    pub value: Direction,
    #[serde(default)]
    pub basis: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Directionality {
    fn default() -> Self {
        Self {
            value: Direction::Unknown,
            basis: DEFAULT_BASIS.to_string(),
            confidence: 0.0,
            extra: Map::new(),
        }
    }
}

/// Stored `[x1, y1, x2, y2]`. Anything that is not four numbers is kept
/// verbatim as `Malformed` so it survives a save and is skipped at crop time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignBBox {
    Coords([Number; 4]),
    Malformed(Value),
}

impl SignBBox {
    pub fn from_box(bbox: &BoundingBox) -> Self {
        Self::Coords(bbox.as_array().map(Number::from))
    }

    /// `None` if any coordinate is not finite.
    pub fn from_coords(coords: [f64; 4]) -> Option<Self> {
        let [a, b, c, d] = coords.map(Number::from_f64);
        Some(Self::Coords([a?, b?, c?, d?]))
    }

    pub fn coords(&self) -> Option<[f64; 4]> {
        match self {
            Self::Coords(n) => {
                let [a, b, c, d] = n.clone().map(|v| v.as_f64());
                Some([a?, b?, c?, d?])
            }
            Self::Malformed(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignObservation {
    pub sign_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<SignBBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_path: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SignObservation {
    pub fn new(sign_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            sign_id: sign_id.into(),
            description: description.into(),
            bbox: None,
            confidence: None,
            crop_path: None,
            extra: Map::new(),
        }
    }

    pub fn is_auto(&self) -> bool {
        self.sign_id.starts_with(AUTO_SIGN_PREFIX)
    }

    /// `None` when the sign carries no box, an error when the box is unusable.
    pub fn bbox_coords(&self) -> Option<Result<[f64; 4]>> {
        let bbox = self.bbox.as_ref()?;
        Some(bbox.coords().ok_or_else(|| AuditError::MalformedEvidence {
            sign_id: self.sign_id.clone(),
            reason: match bbox {
                SignBBox::Malformed(v) => format!("expected four numbers, got {v}"),
                SignBBox::Coords(_) => "coordinate out of range".to_string(),
            },
        }))
    }
}

fn default_uncertainty() -> f64 {
    1.0
}

fn default_observed_only() -> bool {
    true
}

/// Ledger entry for one inscription line.
///
/// `uncertainty` and `observed_only` are written by whichever operation
/// mutates the record; nothing recomputes them from `observed_signs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub line_id: String,
    #[serde(default)]
    pub evidence_ids: Vec<String>,
    #[serde(default)]
    pub observed_signs: Vec<SignObservation>,
    #[serde(default)]
    pub directionality: Directionality,
    #[serde(default = "default_uncertainty")]
    pub uncertainty: f64,
    #[serde(default = "default_observed_only")]
    pub observed_only: bool,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_contact_sheet: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ObservationRecord {
    /// The empty, fully unknown record every new line starts from.
    pub fn new(line_id: impl Into<String>, evidence_ids: Vec<String>) -> Self {
        Self {
            line_id: line_id.into(),
            evidence_ids,
            observed_signs: Vec::new(),
            directionality: Directionality::default(),
            uncertainty: default_uncertainty(),
            observed_only: default_observed_only(),
            notes: DEFAULT_NOTES.to_string(),
            cluster_contact_sheet: None,
            extra: Map::new(),
        }
    }
}
