//! Reduction of class scores to a segmentation map and region statistics.

use crate::enums::TumorClass;

use ndarray::{Array3, ArrayView1, ArrayView4, Axis, Zip};
use serde::Serialize;
use std::collections::BTreeMap;

/// Voxel count and share of one tumor region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionStatistic {
    pub name: String,
    pub voxels: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationStatistics {
    pub total_voxels: usize,
    pub tumor_voxels: usize,
    pub tumor_percentage: f64,
    /// Non-background classes present in the map, keyed by class id.
    pub regions: BTreeMap<u32, RegionStatistic>,
    /// Voxel count of every class present, background included.
    #[serde(skip)]
    pub class_counts: BTreeMap<u32, usize>,
}

impl SegmentationStatistics {
    pub fn count_of(&self, class_id: u32) -> usize {
        self.class_counts.get(&class_id).copied().unwrap_or(0)
    }
}

pub struct RegionStatistics;

impl RegionStatistics {
    /// Arg-max over the trailing class axis of an `(x, y, z, class)` score
    /// array. Ties go to the lowest class index.
    pub fn segment(scores: &ArrayView4<'_, f32>) -> Array3<u32> {
        Zip::from(scores.lanes(Axis(3))).par_map_collect(|lane| Self::argmax(lane))
    }

    /// First index of the maximum; a NaN score wins like in a left-to-right scan.
    fn argmax(scores: ArrayView1<'_, f32>) -> u32 {
        let mut best_index = 0usize;
        let mut best_score = f32::NEG_INFINITY;
        for (index, &score) in scores.iter().enumerate() {
            if index == 0 || score > best_score || (score.is_nan() && !best_score.is_nan()) {
                best_index = index;
                best_score = score;
            }
            if best_score.is_nan() {
                break;
            }
        }
        best_index as u32
    }

    /// Segmentation map flattened row-major over `(x, y, z)`.
    pub fn flatten(segmentation: &Array3<u32>) -> Vec<u32> {
        segmentation.iter().copied().collect()
    }

    pub fn summarize(segmentation: &Array3<u32>) -> SegmentationStatistics {
        let total_voxels = segmentation.len();

        let mut class_counts = BTreeMap::new();
        for &class_id in segmentation {
            *class_counts.entry(class_id).or_insert(0usize) += 1;
        }

        let background = class_counts
            .get(&TumorClass::Background.id())
            .copied()
            .unwrap_or(0);
        let tumor_voxels = total_voxels - background;

        let regions = class_counts
            .iter()
            .filter(|&(&class_id, _)| class_id != TumorClass::Background.id())
            .map(|(&class_id, &voxels)| {
                let region = RegionStatistic {
                    name: TumorClass::label_for(class_id),
                    voxels,
                    percentage: percentage(voxels, total_voxels),
                };
                (class_id, region)
            })
            .collect();

        SegmentationStatistics {
            total_voxels,
            tumor_voxels,
            tumor_percentage: percentage(tumor_voxels, total_voxels),
            regions,
            class_counts,
        }
    }
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array4, array};

    #[test]
    fn argmax_breaks_ties_towards_lowest_index() {
        assert_eq!(RegionStatistics::argmax(array![0.1, 0.4, 0.4, 0.1].view()), 1);
        assert_eq!(RegionStatistics::argmax(array![0.25, 0.25, 0.25, 0.25].view()), 0);
        assert_eq!(RegionStatistics::argmax(array![0.0, 0.1, 0.2, 0.7].view()), 3);
        assert_eq!(
            RegionStatistics::argmax(array![f32::NEG_INFINITY, f32::NEG_INFINITY].view()),
            0
        );
        assert_eq!(RegionStatistics::argmax(array![0.1, f32::NAN, 0.9].view()), 1);
    }

    #[test]
    fn segments_every_voxel() {
        let scores = Array4::from_shape_fn((2, 3, 4, 4), |(x, y, z, c)| {
            if c == (x + y + z) % 4 { 1.0 } else { 0.0 }
        });
        let segmentation = RegionStatistics::segment(&scores.view());

        assert_eq!(segmentation.dim(), (2, 3, 4));
        assert_eq!(segmentation[[1, 2, 3]], 2);
        assert_eq!(segmentation[[0, 0, 0]], 0);
    }

    #[test]
    fn flattens_row_major() {
        let segmentation = Array3::from_shape_fn((2, 2, 2), |(x, y, z)| (x * 4 + y * 2 + z) as u32);
        assert_eq!(
            RegionStatistics::flatten(&segmentation),
            vec![0, 1, 2, 3, 4, 5, 6, 7]
        );
    }

    #[test]
    fn counts_add_up_to_total() {
        let segmentation = Array3::from_shape_fn((4, 5, 6), |(x, y, z)| ((x * y + z) % 4) as u32);
        let stats = RegionStatistics::summarize(&segmentation);

        assert_eq!(stats.total_voxels, 120);
        assert_eq!(stats.class_counts.values().sum::<usize>(), stats.total_voxels);
        assert_eq!(stats.tumor_voxels + stats.count_of(0), stats.total_voxels);
        assert_eq!(
            stats.regions.values().map(|r| r.voxels).sum::<usize>(),
            stats.tumor_voxels
        );
        assert!(!stats.regions.contains_key(&0));
        assert_eq!(stats.regions[&1].name, "NCR/NET");
        assert_eq!(stats.regions[&2].name, "Edema");
    }

    #[test]
    fn unknown_classes_keep_generic_label() {
        let mut segmentation = Array3::<u32>::zeros((2, 2, 1));
        segmentation[[0, 0, 0]] = 5;
        let stats = RegionStatistics::summarize(&segmentation);

        assert_eq!(stats.tumor_voxels, 1);
        assert_eq!(stats.tumor_percentage, 25.0);
        assert_eq!(
            stats.regions[&5],
            RegionStatistic {
                name: "Class 5".to_string(),
                voxels: 1,
                percentage: 25.0,
            }
        );
    }

    #[test]
    fn serializes_with_camel_case_and_string_keys() {
        let segmentation = Array3::from_elem((1, 1, 2), 3u32);
        let json = serde_json::to_value(RegionStatistics::summarize(&segmentation)).unwrap();

        assert_eq!(json["totalVoxels"], 2);
        assert_eq!(json["tumorVoxels"], 2);
        assert_eq!(json["tumorPercentage"], 100.0);
        assert_eq!(json["regions"]["3"]["name"], "Enhancing Tumor");
        assert!(json.get("classCounts").is_none());
    }
}
