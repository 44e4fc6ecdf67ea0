//! Change classification - labels and confidence scores for change regions
//!
//! Works purely on the before/after pixel statistics already in hand; no
//! model call. Object identification is a downstream collaborator.

use crate::domain::types::{ChangeLabel, ChangeRecord, ChangeRegion, BoundingBox};
use crate::infra::config::Config;
use image::GrayImage;

pub struct ChangeClassifier {
    /// Mean brightness delta below which a region is ambiguous
    brightness_delta: f32,
    delta_weight: f32,
    size_weight: f32,
    /// Overlap ratio beyond which classified records form one cluster
    overlap_ratio: f32,
}

impl ChangeClassifier {
    pub fn new(brightness_delta: f32, delta_weight: f32, size_weight: f32, overlap_ratio: f32) -> Self {
        Self { brightness_delta, delta_weight, size_weight, overlap_ratio }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.brightness_delta(),
            config.delta_weight(),
            config.size_weight(),
            config.merge_overlap_ratio(),
        )
    }

    /// Classify one region against its frame pair
    pub fn classify(
        &self,
        region: &ChangeRegion,
        before: &GrayImage,
        after: &GrayImage,
    ) -> ChangeRecord {
        let before_brightness = region_mean(before, &region.bbox);
        let after_brightness = region_mean(after, &region.bbox);

        let label = if after_brightness - before_brightness > self.brightness_delta {
            ChangeLabel::Addition
        } else if before_brightness - after_brightness > self.brightness_delta {
            ChangeLabel::Removal
        } else {
            ChangeLabel::Ambiguous
        };

        ChangeRecord {
            zone: region.zone.clone(),
            region: region.clone(),
            label,
            confidence: self.confidence(region.delta, region.relative_size),
        }
    }

    /// Classify a zone's regions and resolve overlapping clusters: only
    /// the highest-confidence record per cluster survives.
    pub fn classify_zone(
        &self,
        regions: &[ChangeRegion],
        before: &GrayImage,
        after: &GrayImage,
    ) -> Vec<ChangeRecord> {
        let mut records: Vec<ChangeRecord> =
            regions.iter().map(|region| self.classify(region, before, after)).collect();

        records.sort_by(|a, b| {
            b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut kept: Vec<ChangeRecord> = Vec::with_capacity(records.len());
        for record in records {
            let overlaps_kept = kept
                .iter()
                .any(|k| k.region.bbox.overlap_ratio(&record.region.bbox) > self.overlap_ratio);
            if !overlaps_kept {
                kept.push(record);
            }
        }
        kept
    }

    /// Monotonic in delta magnitude and region size, clipped to [0, 1]
    fn confidence(&self, delta: f32, relative_size: f32) -> f32 {
        (self.delta_weight * (delta / 255.0) + self.size_weight * relative_size).clamp(0.0, 1.0)
    }
}

/// Mean luminance inside the box
fn region_mean(img: &GrayImage, bbox: &BoundingBox) -> f32 {
    let mut sum = 0u64;
    for y in bbox.y..bbox.y + bbox.height {
        for x in bbox.x..bbox.x + bbox.width {
            sum += u64::from(img.get_pixel(x, y).0[0]);
        }
    }
    let area = bbox.area();
    if area == 0 {
        return 0.0;
    }
    sum as f32 / area as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ZoneId;

    fn gray(width: u32, height: u32, value: u8) -> GrayImage {
        GrayImage::from_pixel(width, height, image::Luma([value]))
    }

    fn classifier() -> ChangeClassifier {
        ChangeClassifier::new(12.0, 0.75, 0.25, 0.5)
    }

    fn region(bbox: BoundingBox, delta: f32, relative_size: f32) -> ChangeRegion {
        ChangeRegion { zone: ZoneId::new("shelf_1_left"), bbox, delta, relative_size }
    }

    #[test]
    fn test_brighter_region_is_addition() {
        let before = gray(16, 16, 20);
        let after = gray(16, 16, 180);
        let r = region(BoundingBox { x: 0, y: 0, width: 16, height: 16 }, 160.0, 1.0);

        let record = classifier().classify(&r, &before, &after);
        assert_eq!(record.label, ChangeLabel::Addition);
    }

    #[test]
    fn test_darker_region_is_removal() {
        let before = gray(16, 16, 180);
        let after = gray(16, 16, 20);
        let r = region(BoundingBox { x: 0, y: 0, width: 16, height: 16 }, 160.0, 1.0);

        let record = classifier().classify(&r, &before, &after);
        assert_eq!(record.label, ChangeLabel::Removal);
    }

    #[test]
    fn test_small_brightness_shift_is_ambiguous() {
        let before = gray(16, 16, 100);
        let after = gray(16, 16, 106);
        let r = region(BoundingBox { x: 0, y: 0, width: 16, height: 16 }, 6.0, 1.0);

        let record = classifier().classify(&r, &before, &after);
        assert_eq!(record.label, ChangeLabel::Ambiguous);
    }

    #[test]
    fn test_confidence_monotonic_in_delta_at_fixed_size() {
        let classifier = classifier();
        let mut last = -1.0f32;
        for delta in [0.0f32, 10.0, 50.0, 120.0, 200.0, 255.0] {
            let confidence = classifier.confidence(delta, 0.25);
            assert!(confidence >= last, "confidence dipped at delta {}", delta);
            last = confidence;
        }
    }

    #[test]
    fn test_confidence_clamped_to_unit_interval() {
        let c = ChangeClassifier::new(12.0, 2.0, 2.0, 0.5);
        assert_eq!(c.confidence(255.0, 1.0), 1.0);
        assert_eq!(c.confidence(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_full_frame_black_to_white_high_confidence_addition() {
        let before = gray(32, 32, 0);
        let after = gray(32, 32, 255);
        let r = region(BoundingBox { x: 0, y: 0, width: 32, height: 32 }, 255.0, 1.0);

        let record = classifier().classify(&r, &before, &after);
        assert_eq!(record.label, ChangeLabel::Addition);
        assert!(record.confidence >= 0.9);
    }

    #[test]
    fn test_overlapping_cluster_keeps_highest_confidence() {
        let before = gray(64, 64, 20);
        let after = gray(64, 64, 220);

        let strong = region(BoundingBox { x: 10, y: 10, width: 20, height: 20 }, 200.0, 0.1);
        let weak = region(BoundingBox { x: 12, y: 12, width: 16, height: 16 }, 80.0, 0.06);
        let distant = region(BoundingBox { x: 44, y: 44, width: 10, height: 10 }, 150.0, 0.02);

        let records = classifier().classify_zone(&[strong.clone(), weak, distant], &before, &after);

        assert_eq!(records.len(), 2);
        // Cluster winner is the strong region
        assert!(records.iter().any(|r| r.region == strong));
        assert!(records.iter().all(|r| r.region.bbox.x != 12));
    }

    #[test]
    fn test_classify_zone_orders_by_confidence() {
        let before = gray(64, 64, 20);
        let after = gray(64, 64, 220);

        let mild = region(BoundingBox { x: 0, y: 0, width: 8, height: 8 }, 60.0, 0.01);
        let strong = region(BoundingBox { x: 40, y: 40, width: 16, height: 16 }, 220.0, 0.06);

        let records = classifier().classify_zone(&[mild, strong], &before, &after);
        assert_eq!(records.len(), 2);
        assert!(records[0].confidence >= records[1].confidence);
    }
}
