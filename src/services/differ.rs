//! Frame differencing - extracts candidate change regions from a
//! before/after frame pair
//!
//! Pipeline per zone: box blur (noise suppression) → absolute luminance
//! difference → binary threshold → morphological closing → connected
//! components → minimum-area filter → overlap merge. Regions come back
//! sorted by descending pixel-delta magnitude.
//!
//! A pair with mismatched dimensions is a per-zone error; the caller
//! skips the zone and the rest of the cycle proceeds.

use crate::domain::types::{BoundingBox, ChangeRegion, ZoneId};
use crate::infra::config::Config;
use image::GrayImage;

/// Per-zone differencing failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffError {
    DimensionMismatch { before: (u32, u32), after: (u32, u32) },
}

impl std::fmt::Display for DiffError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffError::DimensionMismatch { before, after } => write!(
                f,
                "dimension mismatch: before {}x{}, after {}x{}",
                before.0, before.1, after.0, after.1
            ),
        }
    }
}

impl std::error::Error for DiffError {}

pub struct FrameDiffer {
    threshold: u8,
    blur_radius: u32,
    close_radius: u32,
    min_area: u64,
    merge_ratio: f32,
}

impl FrameDiffer {
    pub fn new(
        threshold: u8,
        blur_radius: u32,
        close_radius: u32,
        min_area: u64,
        merge_ratio: f32,
    ) -> Self {
        Self { threshold, blur_radius, close_radius, min_area, merge_ratio }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.diff_threshold(),
            config.blur_radius(),
            config.close_radius(),
            config.min_region_area(),
            config.merge_overlap_ratio(),
        )
    }

    /// Diff one before/after pair and extract change regions
    pub fn diff_pair(
        &self,
        zone: &ZoneId,
        before: &GrayImage,
        after: &GrayImage,
    ) -> Result<Vec<ChangeRegion>, DiffError> {
        let (width, height) = before.dimensions();
        if after.dimensions() != (width, height) {
            return Err(DiffError::DimensionMismatch {
                before: (width, height),
                after: after.dimensions(),
            });
        }

        let blurred_before = box_blur(before, self.blur_radius);
        let blurred_after = box_blur(after, self.blur_radius);

        let mut mask = vec![false; (width * height) as usize];
        for (i, (a, b)) in blurred_before.as_raw().iter().zip(blurred_after.as_raw()).enumerate() {
            mask[i] = a.abs_diff(*b) > self.threshold;
        }

        if self.close_radius > 0 {
            let dilated = dilate(&mask, width, height, self.close_radius);
            mask = erode(&dilated, width, height, self.close_radius);
        }

        let mut boxes: Vec<BoundingBox> = connected_components(&mask, width, height)
            .into_iter()
            .filter(|(_, pixel_count)| *pixel_count >= self.min_area)
            .map(|(bbox, _)| bbox)
            .collect();
        boxes = self.merge_overlapping(boxes);

        let frame_area = (u64::from(width) * u64::from(height)) as f32;
        let mut regions: Vec<ChangeRegion> = boxes
            .into_iter()
            .map(|bbox| ChangeRegion {
                zone: zone.clone(),
                bbox,
                delta: mean_abs_diff(before, after, &bbox),
                relative_size: bbox.area() as f32 / frame_area,
            })
            .collect();

        // Largest, most confident change first
        regions.sort_by(|a, b| b.delta.partial_cmp(&a.delta).unwrap_or(std::cmp::Ordering::Equal));
        Ok(regions)
    }

    /// Merge boxes whose overlap ratio exceeds the configured threshold,
    /// so one physical object does not emit many overlapping fragments.
    fn merge_overlapping(&self, mut boxes: Vec<BoundingBox>) -> Vec<BoundingBox> {
        loop {
            boxes.sort_by(|a, b| b.area().cmp(&a.area()));

            let mut merged: Vec<BoundingBox> = Vec::with_capacity(boxes.len());
            let mut changed = false;
            'next_box: for bbox in &boxes {
                for kept in merged.iter_mut() {
                    if kept.overlap_ratio(bbox) > self.merge_ratio {
                        *kept = kept.union(bbox);
                        changed = true;
                        continue 'next_box;
                    }
                }
                merged.push(*bbox);
            }

            boxes = merged;
            // Unions can create fresh overlaps; iterate to a fixpoint
            if !changed {
                return boxes;
            }
        }
    }
}

/// Separable box blur with edge clamping; radius 0 is a copy
fn box_blur(img: &GrayImage, radius: u32) -> GrayImage {
    if radius == 0 {
        return img.clone();
    }
    let (width, height) = img.dimensions();
    let r = radius as i64;
    let src = img.as_raw();

    // Horizontal pass
    let mut horizontal = vec![0u8; src.len()];
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let mut sum = 0u32;
            let mut count = 0u32;
            for dx in -r..=r {
                let sx = (x + dx).clamp(0, width as i64 - 1);
                sum += u32::from(src[(y * width as i64 + sx) as usize]);
                count += 1;
            }
            horizontal[(y * width as i64 + x) as usize] = (sum / count) as u8;
        }
    }

    // Vertical pass
    let mut out = vec![0u8; src.len()];
    for y in 0..height as i64 {
        for x in 0..width as i64 {
            let mut sum = 0u32;
            let mut count = 0u32;
            for dy in -r..=r {
                let sy = (y + dy).clamp(0, height as i64 - 1);
                sum += u32::from(horizontal[(sy * width as i64 + x) as usize]);
                count += 1;
            }
            out[(y * width as i64 + x) as usize] = (sum / count) as u8;
        }
    }

    GrayImage::from_raw(width, height, out).expect("blur output matches input dimensions")
}

fn dilate(mask: &[bool], width: u32, height: u32, radius: u32) -> Vec<bool> {
    morph(mask, width, height, radius, true)
}

fn erode(mask: &[bool], width: u32, height: u32, radius: u32) -> Vec<bool> {
    morph(mask, width, height, radius, false)
}

/// Square structuring element; `any` selects dilation over erosion
fn morph(mask: &[bool], width: u32, height: u32, radius: u32, any: bool) -> Vec<bool> {
    let r = radius as i64;
    let (w, h) = (width as i64, height as i64);
    let mut out = vec![false; mask.len()];

    for y in 0..h {
        for x in 0..w {
            let mut hit = !any;
            'window: for dy in -r..=r {
                for dx in -r..=r {
                    let sx = x + dx;
                    let sy = y + dy;
                    // Border handling: out-of-frame pixels never create
                    // dilation hits and never erode the frame edge
                    let value = if sx < 0 || sy < 0 || sx >= w || sy >= h {
                        !any
                    } else {
                        mask[(sy * w + sx) as usize]
                    };
                    if value == any {
                        hit = any;
                        break 'window;
                    }
                }
            }
            out[(y * w + x) as usize] = hit;
        }
    }
    out
}

/// 4-connected components over the binary mask.
/// Returns each component's bounding box and pixel count.
fn connected_components(mask: &[bool], width: u32, height: u32) -> Vec<(BoundingBox, u64)> {
    let (w, h) = (width as usize, height as usize);
    let mut visited = vec![false; mask.len()];
    let mut components = Vec::new();
    let mut stack = Vec::new();

    for start in 0..mask.len() {
        if !mask[start] || visited[start] {
            continue;
        }

        let (mut min_x, mut min_y) = (w, h);
        let (mut max_x, mut max_y) = (0usize, 0usize);
        let mut pixel_count = 0u64;

        visited[start] = true;
        stack.push(start);
        while let Some(idx) = stack.pop() {
            let x = idx % w;
            let y = idx / w;
            pixel_count += 1;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);

            if x > 0 {
                try_visit(idx - 1, mask, &mut visited, &mut stack);
            }
            if x + 1 < w {
                try_visit(idx + 1, mask, &mut visited, &mut stack);
            }
            if y > 0 {
                try_visit(idx - w, mask, &mut visited, &mut stack);
            }
            if y + 1 < h {
                try_visit(idx + w, mask, &mut visited, &mut stack);
            }
        }

        let bbox = BoundingBox {
            x: min_x as u32,
            y: min_y as u32,
            width: (max_x - min_x + 1) as u32,
            height: (max_y - min_y + 1) as u32,
        };
        components.push((bbox, pixel_count));
    }

    components
}

#[inline]
fn try_visit(idx: usize, mask: &[bool], visited: &mut [bool], stack: &mut Vec<usize>) {
    if mask[idx] && !visited[idx] {
        visited[idx] = true;
        stack.push(idx);
    }
}

/// Mean absolute luminance difference inside the box, on the raw frames
fn mean_abs_diff(before: &GrayImage, after: &GrayImage, bbox: &BoundingBox) -> f32 {
    let mut sum = 0u64;
    for y in bbox.y..bbox.y + bbox.height {
        for x in bbox.x..bbox.x + bbox.width {
            sum += u64::from(before.get_pixel(x, y).0[0].abs_diff(after.get_pixel(x, y).0[0]));
        }
    }
    let area = bbox.area();
    if area == 0 {
        return 0.0;
    }
    sum as f32 / area as f32
}
