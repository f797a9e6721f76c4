use serde::{Deserialize, Serialize};

use crate::error::{AuditError, Result};

const THRESHOLD: u8 = 140;
const SCALE: f64 = 0.5;
const MIN_AREA: usize = 80;
const DILATION: u32 = 3;
const MARGIN: u32 = 4;

/// Parameters for glyph-cluster segmentation.
///
/// `threshold`, `scale` and `dilation` drive the thresholder; `min_area`,
/// `margin` and `scale` (again, to map back to source pixels) drive the
/// cluster detector. Input rasters are assumed to carry dark ink on a light
/// background.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentConfig {
    pub threshold: u8,
    pub scale: f64,
    pub min_area: usize,
    pub dilation: u32,
    pub margin: u32,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            threshold: THRESHOLD,
            scale: SCALE,
            min_area: MIN_AREA,
            dilation: DILATION,
            margin: MARGIN,
        }
    }
}

impl SegmentConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(AuditError::Configuration(format!(
                "scale must be a positive finite number, got {}",
                self.scale
            )));
        }
        if self.dilation == 0 {
            return Err(AuditError::Configuration(
                "dilation window must be at least 1".to_string(),
            ));
        }
        if self.dilation > 1 && self.dilation % 2 == 0 {
            return Err(AuditError::Configuration(format!(
                "dilation window must be odd, got {}",
                self.dilation
            )));
        }
        if self.dilation_radius().is_none() {
            return Err(AuditError::Configuration(format!(
                "dilation window {} is too large",
                self.dilation
            )));
        }
        Ok(())
    }

    /// Half-width of the dilation window, `None` if it does not fit the filter.
    pub(crate) fn dilation_radius(&self) -> Option<u8> {
        u8::try_from(self.dilation.saturating_sub(1) / 2).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(SegmentConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_scale_and_dilation() {
        let bad = [
            SegmentConfig { scale: 0.0, ..Default::default() },
            SegmentConfig { scale: -1.0, ..Default::default() },
            SegmentConfig { scale: f64::NAN, ..Default::default() },
            SegmentConfig { dilation: 0, ..Default::default() },
            SegmentConfig { dilation: 4, ..Default::default() },
            SegmentConfig { dilation: 1001, ..Default::default() },
        ];
        for cfg in bad {
            assert!(
                matches!(cfg.validate(), Err(AuditError::Configuration(_))),
                "{cfg:?} should be rejected"
            );
        }
    }
}
