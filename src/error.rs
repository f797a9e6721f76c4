use std::path::PathBuf;

use kornia::image::ImageError;

/// Errors raised by the segmentation, ledger and materialization passes.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("line_id not found in observations: {0}")]
    NotFound(String),

    #[error("malformed bbox on sign {sign_id}: {reason}")]
    MalformedEvidence { sign_id: String, reason: String },

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image error on {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("raster error: {0}")]
    Raster(String),

    #[error("kornia image error: {0}")]
    Kornia(#[from] ImageError),

    #[error("{}:{line}: {source}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("manifest error: {0}")]
    Manifest(String),
}

impl AuditError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn image(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Image {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;
