//! Particle box placement inside a volume.

use std::collections::HashMap;

use ndarray::ArrayView3;

use crate::error::{ExtractError, Result};

/// An integer particle box, guaranteed fully inside its volume.
///
/// `center` is the box center after boundary correction; it differs from
/// the requested center by exactly the clamp shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BoundingBox {
    pub left: [usize; 3],
    pub size: usize,
    pub center: [usize; 3],
}

/// Place a cubic box of `box_size` around `center` within `shape`.
///
/// Two-pass clamp: the left corner is clamped to 0 first, then the right
/// corner to the shape bound with the left corner recomputed from it.
/// A single-sided clamp is not enough — near a corner the first shift can
/// push the opposite face back out of the volume.
///
/// Requires `box_size <= shape` on every axis; the center itself may lie
/// outside the volume.
pub fn resolve(center: [i64; 3], box_size: usize, shape: [usize; 3]) -> Result<BoundingBox> {
    if shape.iter().any(|&s| s < box_size) {
        return Err(ExtractError::BoxTooLarge { box_size, shape });
    }

    let half = (box_size / 2) as i64;
    let size = box_size as i64;
    let mut left = [0usize; 3];
    let mut corrected = [0usize; 3];
    for axis in 0..3 {
        let naive = center[axis] - half;
        let left_fixed = naive.max(0);
        let right = (left_fixed + size).min(shape[axis] as i64);
        let l = right - size;
        left[axis] = l as usize;
        corrected[axis] = (l + half) as usize;
    }
    Ok(BoundingBox {
        left,
        size: box_size,
        center: corrected,
    })
}

/// Integer center of mass of each requested label id.
///
/// Returned in the order of `ids`. An id with no foreground voxels is a
/// configuration error: the caller asked for an object the segmentation
/// does not contain.
pub fn label_centroids(labels: &ArrayView3<'_, i32>, ids: &[i32]) -> Result<Vec<(i32, [i64; 3])>> {
    let mut sums: HashMap<i32, ([u64; 3], u64)> = ids.iter().map(|&id| (id, Default::default())).collect();

    for ((x, y, z), &v) in labels.indexed_iter() {
        if let Some((sum, count)) = sums.get_mut(&v) {
            sum[0] += x as u64;
            sum[1] += y as u64;
            sum[2] += z as u64;
            *count += 1;
        }
    }

    ids.iter()
        .map(|&id| {
            let (sum, count) = sums[&id];
            if count == 0 {
                return Err(ExtractError::Configuration(format!(
                    "label id {} has no voxels in the segmentation",
                    id
                )));
            }
            let center = [
                (sum[0] as f64 / count as f64).round() as i64,
                (sum[1] as f64 / count as f64).round() as i64,
                (sum[2] as f64 / count as f64).round() as i64,
            ];
            Ok((id, center))
        })
        .collect()
}

/// All distinct positive label ids present in a segmentation, sorted.
pub fn present_ids(labels: &ArrayView3<'_, i32>) -> Vec<i32> {
    labels
        .iter()
        .copied()
        .filter(|&v| v > 0)
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn interior_center_is_untouched() {
        let b = resolve([50, 50, 50], 10, [100, 100, 100]).unwrap();
        assert_eq!(b.left, [45, 45, 45]);
        assert_eq!(b.center, [50, 50, 50]);
    }

    #[test]
    fn near_origin_clamps_left() {
        let b = resolve([2, 2, 2], 10, [100, 100, 100]).unwrap();
        assert_eq!(b.left, [0, 0, 0]);
        assert_eq!(b.center, [5, 5, 5]);
    }

    #[test]
    fn near_far_face_clamps_right() {
        let b = resolve([98, 98, 98], 10, [100, 100, 100]).unwrap();
        assert_eq!(b.left, [90, 90, 90]);
        assert_eq!(b.center, [95, 95, 95]);
    }

    #[test]
    fn center_outside_volume_still_yields_inner_box() {
        let b = resolve([-20, 50, 140], 10, [100, 100, 100]).unwrap();
        assert_eq!(b.left, [0, 45, 90]);

        // per-axis containment for a sweep of pathological centers
        for &c in &[[-100, -1, 0], [100, 100, 100], [0, 99, -50]] {
            let b = resolve(c, 30, [100, 60, 40]).unwrap();
            for axis in 0..3 {
                assert!(b.left[axis] + 30 <= [100, 60, 40][axis]);
            }
        }
    }

    #[test]
    fn oversized_box_rejected() {
        let err = resolve([5, 5, 5], 50, [100, 40, 100]).unwrap_err();
        assert!(matches!(err, ExtractError::BoxTooLarge { .. }));
    }

    #[test]
    fn odd_box_size_uses_floor_half() {
        let b = resolve([10, 10, 10], 7, [50, 50, 50]).unwrap();
        assert_eq!(b.left, [7, 7, 7]);
        assert_eq!(b.center, [10, 10, 10]);
    }

    #[test]
    fn centroids_of_two_blobs() {
        let mut labels = Array3::<i32>::zeros((20, 20, 20));
        for x in 2..5 {
            labels[[x, 3, 4]] = 1;
        }
        labels[[10, 10, 10]] = 7;

        let got = label_centroids(&labels.view(), &[1, 7]).unwrap();
        assert_eq!(got, vec![(1, [3, 3, 4]), (7, [10, 10, 10])]);
    }

    #[test]
    fn missing_label_is_configuration_error() {
        let labels = Array3::<i32>::zeros((5, 5, 5));
        let err = label_centroids(&labels.view(), &[3]).unwrap_err();
        assert!(matches!(err, ExtractError::Configuration(_)));
    }

    #[test]
    fn present_ids_skips_background() {
        let mut labels = Array3::<i32>::zeros((4, 4, 4));
        labels[[0, 0, 0]] = 5;
        labels[[1, 1, 1]] = 2;
        labels[[2, 2, 2]] = 5;
        assert_eq!(present_ids(&labels.view()), vec![2, 5]);
    }
}
