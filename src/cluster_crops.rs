//! Per-sign crops and per-line contact sheets cut from the primary evidence image.

use std::fs;
use std::path::{Path, PathBuf};

use image::imageops;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use log::{debug, info, warn};

use crate::error::{AuditError, Result};
use crate::ledger::{self, ObservationRecord, SignObservation};
use crate::manifest::EvidenceResolver;

/// Crop directory, relative to the output root.
pub const CLUSTER_DIR: &str = "evidence/clusters";
pub const CONTACT_SHEET_NAME: &str = "contact_sheet.png";

const TILE_SIZE: u32 = 96;
const COLUMNS: u32 = 10;
const SHEET_BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Grid geometry of a contact sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetLayout {
    pub tile_size: u32,
    pub columns: u32,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            tile_size: TILE_SIZE,
            columns: COLUMNS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CropSummary {
    pub lines: usize,
    pub crops: usize,
    pub skipped_signs: usize,
    pub failed_lines: usize,
}

/// Tiles `crops` row-major onto a white sheet. Each crop is shrunk to fit its
/// tile, keeping its aspect ratio, and pasted at the tile's top-left corner.
pub fn make_contact_sheet(crops: &[DynamicImage], layout: &SheetLayout) -> Option<RgbImage> {
    if crops.is_empty() || layout.tile_size == 0 || layout.columns == 0 {
        return None;
    }
    let count = crops.len() as u32;
    let rows = count.div_ceil(layout.columns);
    let tile = layout.tile_size;
    let mut sheet = RgbImage::from_pixel(tile * layout.columns, tile * rows, SHEET_BACKGROUND);

    for (idx, crop) in crops.iter().enumerate() {
        let idx = idx as u32;
        let thumb = if crop.width() > tile || crop.height() > tile {
            crop.thumbnail(tile, tile).to_rgb8()
        } else {
            crop.to_rgb8()
        };
        let x = (idx % layout.columns) * tile;
        let y = (idx / layout.columns) * tile;
        imageops::replace(&mut sheet, &thumb, x as i64, y as i64);
    }
    Some(sheet)
}

/// Clamped pixel rectangle `(x, y, width, height)` for `sign` on a
/// `width` x `height` image. `x2`/`y2` are exclusive.
fn crop_rect(sign: &SignObservation, coords: [f64; 4], width: u32, height: u32) -> Result<(u32, u32, u32, u32)> {
    let [x1, y1, x2, y2] = coords.map(|v| v as i64);
    let clamp_x = |v: i64| v.clamp(0, width as i64) as u32;
    let clamp_y = |v: i64| v.clamp(0, height as i64) as u32;
    let (x1, x2) = (clamp_x(x1), clamp_x(x2));
    let (y1, y2) = (clamp_y(y1), clamp_y(y2));
    if x2 <= x1 || y2 <= y1 {
        return Err(AuditError::MalformedEvidence {
            sign_id: sign.sign_id.clone(),
            reason: format!("box {coords:?} is empty on a {width}x{height} image"),
        });
    }
    Ok((x1, y1, x2 - x1, y2 - y1))
}

fn is_path_safe(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

fn crop_file_stem(sign: &SignObservation, idx: usize) -> Result<String> {
    if sign.sign_id.is_empty() {
        return Ok(format!("cluster-{idx}"));
    }
    if !is_path_safe(&sign.sign_id) {
        return Err(AuditError::MalformedEvidence {
            sign_id: sign.sign_id.clone(),
            reason: "sign id cannot be used as a file name".to_string(),
        });
    }
    Ok(sign.sign_id.clone())
}

fn save_image(img: &DynamicImage, path: &Path) -> Result<()> {
    img.save(path).map_err(|e| AuditError::image(path, e))
}

/// Writes a crop for every sign of `record` with a usable box and, when at
/// least one crop was written, the line's contact sheet. Returns the number of
/// crops written and the number of signs skipped.
pub fn materialize_record(
    record: &mut ObservationRecord,
    source: &DynamicImage,
    output_root: &Path,
    layout: &SheetLayout,
) -> Result<(usize, usize)> {
    if !is_path_safe(&record.line_id) {
        return Err(AuditError::MalformedEvidence {
            sign_id: record.line_id.clone(),
            reason: "line id cannot be used as a directory name".to_string(),
        });
    }
    let rel_dir = format!("{CLUSTER_DIR}/{}", record.line_id);
    let out_dir: PathBuf = output_root.join(&rel_dir);
    let (width, height) = source.dimensions();

    let mut crops = Vec::new();
    let mut skipped = 0;
    for (idx, sign) in record.observed_signs.iter_mut().enumerate() {
        let Some(coords) = sign.bbox_coords() else {
            continue;
        };
        let rect = coords
            .and_then(|c| crop_rect(sign, c, width, height))
            .and_then(|rect| crop_file_stem(sign, idx + 1).map(|stem| (rect, stem)));
        let ((x, y, w, h), stem) = match rect {
            Ok(v) => v,
            Err(e) => {
                debug!("line {}: skipping sign: {e}", record.line_id);
                skipped += 1;
                continue;
            }
        };

        if crops.is_empty() {
            fs::create_dir_all(&out_dir).map_err(|e| AuditError::io(&out_dir, e))?;
        }
        let crop = source.crop_imm(x, y, w, h);
        let file_name = format!("{stem}.png");
        save_image(&crop, &out_dir.join(&file_name))?;
        sign.crop_path = Some(format!("{rel_dir}/{file_name}"));
        crops.push(crop);
    }

    if let Some(sheet) = make_contact_sheet(&crops, layout) {
        save_image(
            &DynamicImage::ImageRgb8(sheet),
            &out_dir.join(CONTACT_SHEET_NAME),
        )?;
        record.cluster_contact_sheet = Some(format!("{rel_dir}/{CONTACT_SHEET_NAME}"));
    }
    Ok((crops.len(), skipped))
}

/// Materializes crops for every record in memory. Records whose primary
/// evidence does not resolve to an existing file are left untouched; a line
/// that fails part way is logged and the pass moves on.
pub fn materialize_records(
    records: &mut [ObservationRecord],
    resolver: &impl EvidenceResolver,
    output_root: &Path,
    layout: &SheetLayout,
) -> CropSummary {
    let mut summary = CropSummary::default();
    for record in records.iter_mut() {
        let Some(image_path) = resolver.primary(&record.evidence_ids) else {
            continue;
        };
        if !image_path.is_file() {
            debug!(
                "line {}: evidence {} does not exist; skipping",
                record.line_id,
                image_path.display()
            );
            continue;
        }
        if !record.observed_signs.iter().any(|s| s.bbox.is_some()) {
            continue;
        }

        let source = match image::open(&image_path) {
            Ok(img) => img,
            Err(e) => {
                warn!("line {}: cannot open {}: {e}", record.line_id, image_path.display());
                summary.failed_lines += 1;
                continue;
            }
        };
        match materialize_record(record, &source, output_root, layout) {
            Ok((crops, skipped)) => {
                summary.skipped_signs += skipped;
                if crops > 0 {
                    summary.lines += 1;
                    summary.crops += crops;
                }
            }
            Err(e) => {
                warn!("line {}: crop export failed: {e}", record.line_id);
                summary.failed_lines += 1;
            }
        }
    }
    summary
}

/// Loads the ledger, writes crops and contact sheets under `output_root`,
/// records their relative paths and saves the ledger once.
pub fn generate_cluster_crops(
    resolver: &impl EvidenceResolver,
    ledger_path: &Path,
    output_root: &Path,
) -> Result<Vec<ObservationRecord>> {
    let mut records = ledger::load_observations(ledger_path)?;
    let summary = materialize_records(&mut records, resolver, output_root, &SheetLayout::default());
    ledger::save_observations(ledger_path, &records)?;
    info!(
        "cluster crops: {} crops over {} lines, {} signs skipped, {} lines failed",
        summary.crops, summary.lines, summary.skipped_signs, summary.failed_lines
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([0, 0, 0])))
    }

    #[test]
    fn sheet_has_ceil_rows_and_white_gaps() {
        let crops: Vec<DynamicImage> = (0..11).map(|_| solid(20, 10)).collect();
        let sheet = make_contact_sheet(&crops, &SheetLayout::default()).unwrap();
        assert_eq!(sheet.dimensions(), (960, 192));
        assert_eq!(sheet.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(sheet.get_pixel(50, 50), &SHEET_BACKGROUND);
        assert_eq!(sheet.get_pixel(0, 96), &Rgb([0, 0, 0]));
        assert_eq!(sheet.get_pixel(96, 96), &SHEET_BACKGROUND);
    }

    #[test]
    fn large_crops_shrink_with_aspect() {
        let sheet = make_contact_sheet(&[solid(400, 100)], &SheetLayout::default()).unwrap();
        assert_eq!(sheet.get_pixel(95, 0), &Rgb([0, 0, 0]));
        assert_eq!(sheet.get_pixel(0, 30), &SHEET_BACKGROUND);
    }

    #[test]
    fn no_crops_no_sheet() {
        assert!(make_contact_sheet(&[], &SheetLayout::default()).is_none());
    }

    #[test]
    fn crop_rect_clamps_and_rejects_empty() {
        let sign = SignObservation::new("S1", "");
        assert_eq!(crop_rect(&sign, [-5.0, 2.9, 500.0, 8.0], 100, 50).unwrap(), (0, 2, 100, 6));
        assert!(crop_rect(&sign, [10.0, 10.0, 10.0, 20.0], 100, 50).is_err());
        assert!(crop_rect(&sign, [120.0, 0.0, 130.0, 10.0], 100, 50).is_err());
    }

    #[test]
    fn unsafe_sign_ids_are_refused() {
        assert!(crop_file_stem(&SignObservation::new("../x", ""), 1).is_err());
        assert_eq!(crop_file_stem(&SignObservation::new("", ""), 3).unwrap(), "cluster-3");
    }
}
