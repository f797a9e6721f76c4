//! Glyph-cluster segmentation of evidence rasters.

pub mod clusters;
pub mod config;
pub mod threshold;

pub use clusters::{BoundingBox, Component, connected_components, detect_clusters};
pub use config::SegmentConfig;
pub use threshold::{ForegroundMask, threshold_mask};

use image::{DynamicImage, GenericImageView};
use log::debug;

use crate::error::Result;

/// Thresholds `source` and returns its glyph clusters in reading-default order.
pub fn segment_glyph_clusters(
    source: &DynamicImage,
    config: &SegmentConfig,
) -> Result<Vec<BoundingBox>> {
    let (width, height) = source.dimensions();
    let mask = threshold_mask(source, config)?;
    let boxes = detect_clusters(&mask, config, width, height);
    debug!(
        "segmented {width}x{height} image: mask {}x{}, {} foreground cells, {} clusters",
        mask.width(),
        mask.height(),
        mask.foreground_count(),
        boxes.len()
    );
    Ok(boxes)
}
