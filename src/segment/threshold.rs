//! Raster thresholder: evidence image -> boolean ink mask.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use kornia::{
    image::{Image, ImageSize, allocator::CpuAllocator},
    imgproc,
};

use super::SegmentConfig;
use crate::error::{AuditError, Result};

type CpuImage<T, const C: usize> = Image<T, C, CpuAllocator>;

const INK: u8 = 255;

/// Row-major boolean mask, `true` on foreground (ink) cells.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ForegroundMask {
    width: usize,
    height: usize,
    cells: Vec<bool>,
}

impl ForegroundMask {
    /// Builds a mask from row-major cells. Returns `None` on a size mismatch.
    pub fn from_cells(width: usize, height: usize, cells: Vec<bool>) -> Option<Self> {
        (width.checked_mul(height)? == cells.len()).then_some(Self {
            width,
            height,
            cells,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.cells[y * self.width + x]
    }

    pub fn cells(&self) -> &[bool] {
        &self.cells
    }

    pub fn foreground_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    fn from_binary(binary: &GrayImage) -> Self {
        Self {
            width: binary.width() as usize,
            height: binary.height() as usize,
            cells: binary.as_raw().iter().map(|&px| px == INK).collect(),
        }
    }
}

/// Converts `source` into an ink mask.
///
/// Luminance is taken with the ITU-R 601 weights, optionally resampled by
/// `config.scale` (bilinear, dimensions rounded down), thresholded so that
/// cells darker than `config.threshold` become foreground, then grown with a
/// square max-filter of `config.dilation` cells so that the disconnected
/// strokes of one sign merge into one cluster.
pub fn threshold_mask(source: &DynamicImage, config: &SegmentConfig) -> Result<ForegroundMask> {
    config.validate()?;

    let gray = luminance(source)?;
    let gray = if config.scale != 1.0 {
        let width = (gray.width() as f64 * config.scale) as u32;
        let height = (gray.height() as f64 * config.scale) as u32;
        if width == 0 || height == 0 {
            return Ok(ForegroundMask::default());
        }
        imageops::resize(&gray, width, height, FilterType::Triangle)
    } else {
        gray
    };
    if gray.width() == 0 || gray.height() == 0 {
        return Ok(ForegroundMask::default());
    }

    let mut binary = binarize(gray, config.threshold)?;

    if config.dilation > 1 {
        let radius = config.dilation_radius().ok_or_else(|| {
            AuditError::Configuration(format!("dilation window {} is too large", config.dilation))
        })?;
        binary = morphology::dilate(&binary, Norm::LInf, radius);
    }

    Ok(ForegroundMask::from_binary(&binary))
}

/// Marks cells strictly darker than `threshold` as [`INK`]. A threshold of 0
/// admits no ink at all.
fn binarize(gray: GrayImage, threshold: u8) -> Result<GrayImage> {
    let (width, height) = gray.dimensions();
    let Some(cutoff) = threshold.checked_sub(1) else {
        return Ok(GrayImage::new(width, height));
    };

    let gray = CpuImage::<u8, 1>::new(
        ImageSize {
            width: width as usize,
            height: height as usize,
        },
        gray.into_raw(),
        CpuAllocator,
    )?;
    let mut binary = CpuImage::<u8, 1>::from_size_val(gray.size(), 0u8, CpuAllocator)?;
    imgproc::threshold::threshold_binary_inverse(&gray, &mut binary, cutoff, INK)?;

    GrayImage::from_raw(width, height, binary.as_slice().to_vec())
        .ok_or_else(|| AuditError::Raster(format!("binary buffer does not fit {width}x{height}")))
}

fn luminance(source: &DynamicImage) -> Result<GrayImage> {
    let rgb = source.to_rgb8();
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Ok(GrayImage::new(width, height));
    }

    let image = CpuImage::<u8, 3>::new(
        ImageSize {
            width: width as usize,
            height: height as usize,
        },
        rgb.into_raw(),
        CpuAllocator,
    )?;
    let mut gray = CpuImage::<u8, 1>::from_size_val(image.size(), 0u8, CpuAllocator)?;
    imgproc::color::gray_from_rgb_u8(&image, &mut gray)?;

    GrayImage::from_raw(width, height, gray.as_slice().to_vec())
        .ok_or_else(|| AuditError::Raster(format!("luminance buffer does not fit {width}x{height}")))
}
