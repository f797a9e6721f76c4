//! Cluster detector: 8-connected foreground components -> ordered bounding boxes.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::{ForegroundMask, SegmentConfig};

/// Inclusive pixel bounds `[x1, y1, x2, y2]` in source-image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BoundingBox {
    pub fn as_array(&self) -> [u32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// A connected component in mask coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
    pub area: usize,
}

const NEIGHBOURS: [(isize, isize); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Labels every 8-connected run of foreground cells, in raster-scan order of
/// each component's first cell.
pub fn connected_components(mask: &ForegroundMask) -> Vec<Component> {
    let (width, height) = (mask.width(), mask.height());
    let cells = mask.cells();
    let mut visited = vec![false; cells.len()];
    let mut out = Vec::new();

    for start in 0..cells.len() {
        if !cells[start] || visited[start] {
            continue;
        }

        let mut queue = VecDeque::new();
        queue.push_back(start);
        visited[start] = true;

        let mut comp = Component {
            min_x: start % width,
            min_y: start / width,
            max_x: start % width,
            max_y: start / width,
            area: 0,
        };

        while let Some(idx) = queue.pop_front() {
            let y = idx / width;
            let x = idx % width;
            comp.area += 1;
            comp.min_x = comp.min_x.min(x);
            comp.max_x = comp.max_x.max(x);
            comp.min_y = comp.min_y.min(y);
            comp.max_y = comp.max_y.max(y);

            for (dx, dy) in NEIGHBOURS {
                let nx = x as isize + dx;
                let ny = y as isize + dy;
                if nx < 0 || ny < 0 {
                    continue;
                }
                let nxu = nx as usize;
                let nyu = ny as usize;
                if nxu >= width || nyu >= height {
                    continue;
                }
                let next_idx = nyu * width + nxu;
                if !cells[next_idx] || visited[next_idx] {
                    continue;
                }
                visited[next_idx] = true;
                queue.push_back(next_idx);
            }
        }

        out.push(comp);
    }

    out
}

/// Finds glyph clusters in `mask` and returns their boxes in the coordinate
/// space of the `source_width` x `source_height` image the mask came from.
///
/// Components smaller than `config.min_area` cells are dropped as noise. Kept
/// boxes are divided by `config.scale` (truncating), padded by
/// `config.margin`, clamped to the source image and sorted by `(x1, y1)`.
/// That order is a geometric default only; it says nothing about the
/// direction the line is read in.
pub fn detect_clusters(
    mask: &ForegroundMask,
    config: &SegmentConfig,
    source_width: u32,
    source_height: u32,
) -> Vec<BoundingBox> {
    if mask.is_empty() || source_width == 0 || source_height == 0 {
        return Vec::new();
    }
    let max_x = source_width - 1;
    let max_y = source_height - 1;
    let to_source = |v: usize| (v as f64 / config.scale) as u32;

    let mut boxes: Vec<BoundingBox> = connected_components(mask)
        .into_iter()
        .filter(|c| c.area >= config.min_area)
        .map(|c| BoundingBox {
            x1: to_source(c.min_x).saturating_sub(config.margin).min(max_x),
            y1: to_source(c.min_y).saturating_sub(config.margin).min(max_y),
            x2: to_source(c.max_x).saturating_add(config.margin).min(max_x),
            y2: to_source(c.max_y).saturating_add(config.margin).min(max_y),
        })
        .collect();

    boxes.sort_by_key(|b| (b.x1, b.y1));
    boxes
}
