use crate::enums::Orientation;
use crate::geometry::{Geometry, GeometryError};
use crate::volume::Volume;

use ndarray::{Array3, ArrayView2, s};
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("Voxel ({0}, {1}, {2}) outside mask of dimensions {3:?}")]
    OutOfBounds(usize, usize, usize, (usize, usize, usize)),

    #[error("Undo requested with empty history")]
    NoHistory,
}

#[derive(Debug, Clone, Copy)]
pub struct LabelConfig {
    /// Number of edit batches retained for undo; the oldest is dropped first.
    pub undo_depth: usize,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self { undo_depth: 64 }
    }
}

/// Inclusive voxel-index bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bbox {
    pub min: [usize; 3],
    pub max: [usize; 3],
}

impl Bbox {
    pub fn of_voxel(v: (usize, usize, usize)) -> Self {
        Self {
            min: [v.0, v.1, v.2],
            max: [v.0, v.1, v.2],
        }
    }

    pub fn include(&mut self, v: (usize, usize, usize)) {
        let v = [v.0, v.1, v.2];
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(v[axis]);
            self.max[axis] = self.max[axis].max(v[axis]);
        }
    }
}

/// One committed edit: the touched voxels with their previous values, in
/// application order. Reverting in reverse order restores the exact
/// pre-batch mask even when a batch touches a voxel twice.
struct EditBatch {
    voxels: Vec<((usize, usize, usize), u8)>,
}

/// Summary of a committed batch (or an undo), used to drive view refresh and
/// mesh re-extraction.
#[derive(Debug, Clone)]
pub struct EditReceipt {
    /// Mask revision after the edit.
    pub revision: u64,
    /// Number of voxels whose value actually changed.
    pub changed: usize,
    /// Bounding box of the changed voxels, `None` for a no-op batch.
    pub bbox: Option<Bbox>,
    /// Non-background labels whose surface may have changed.
    pub affected_labels: Vec<u8>,
}

/// The mutable per-voxel label mask, geometry-aligned with its [`Volume`].
///
/// All mutation goes through [`LabelVolume::set_region`], which applies a
/// batch atomically (bounds are validated before the first write) and records
/// a sparse diff for undo.
pub struct LabelVolume {
    data: Array3<u8>,
    geometry: Geometry,
    history: VecDeque<EditBatch>,
    undo_depth: usize,
    revision: u64,
    /// Running per-label bounding boxes. Grow-only: undo and erasure keep the
    /// conservative box, so it always contains every voxel of the label.
    bounds: [Option<Bbox>; 256],
}

impl LabelVolume {
    /// Zero-initialized mask matching the volume's dimensions and geometry.
    pub fn create(volume: &Volume, config: LabelConfig) -> Self {
        Self {
            data: Array3::zeros(volume.dim()),
            geometry: volume.geometry().clone(),
            history: VecDeque::new(),
            undo_depth: config.undo_depth.max(1),
            revision: 0,
            bounds: [None; 256],
        }
    }

    /// Adopt an existing mask array for the given volume. Dimension mismatch
    /// is a fatal construction error.
    pub fn from_array(
        data: Array3<u8>,
        volume: &Volume,
        config: LabelConfig,
    ) -> Result<Self, GeometryError> {
        if data.dim() != volume.dim() {
            return Err(GeometryError::ShapeMismatch {
                expected: volume.dim(),
                actual: data.dim(),
            });
        }
        let mut bounds = [None; 256];
        for ((z, y, x), &value) in data.indexed_iter() {
            if value != 0 {
                grow(&mut bounds[value as usize], (z, y, x));
            }
        }
        Ok(Self {
            data,
            geometry: volume.geometry().clone(),
            history: VecDeque::new(),
            undo_depth: config.undo_depth.max(1),
            revision: 0,
            bounds,
        })
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn data(&self) -> &Array3<u8> {
        &self.data
    }

    /// Monotonic counter, bumped once per committed batch or undo.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn get(&self, z: usize, y: usize, x: usize) -> Option<u8> {
        self.data.get((z, y, x)).copied()
    }

    /// 2D view of the mask along one orientation, mirroring
    /// [`Volume::slice_at`].
    pub fn slice_at(&self, orientation: Orientation, index: usize) -> Option<ArrayView2<'_, u8>> {
        if index >= orientation.axis_len(self.dim()) {
            return None;
        }
        let slice = match orientation {
            Orientation::Axial => self.data.slice(s![index, .., ..]),
            Orientation::Coronal => self.data.slice(s![.., index, ..]),
            Orientation::Sagittal => self.data.slice(s![.., .., index]),
        };
        Some(slice)
    }

    /// Apply `label` to every voxel in `voxels` as one atomic batch.
    ///
    /// Every coordinate is validated before the first write, so an
    /// out-of-bounds voxel leaves the mask untouched. Voxels that already
    /// carry `label` are skipped; a batch where nothing changes still counts
    /// as a revision but pushes no history entry.
    pub fn set_region(
        &mut self,
        voxels: &[(usize, usize, usize)],
        label: u8,
    ) -> Result<EditReceipt, LabelError> {
        let dim = self.dim();
        for &(z, y, x) in voxels {
            if z >= dim.0 || y >= dim.1 || x >= dim.2 {
                return Err(LabelError::OutOfBounds(z, y, x, dim));
            }
        }

        let mut batch = EditBatch { voxels: Vec::new() };
        let mut bbox: Option<Bbox> = None;
        let mut affected = AffectedLabels::new(label);
        for &(z, y, x) in voxels {
            let previous = self.data[[z, y, x]];
            if previous == label {
                continue;
            }
            batch.voxels.push(((z, y, x), previous));
            self.data[[z, y, x]] = label;
            grow(&mut bbox, (z, y, x));
            if label != 0 {
                grow(&mut self.bounds[label as usize], (z, y, x));
            }
            affected.add(previous);
        }

        let changed = batch.voxels.len();
        if changed > 0 {
            if self.history.len() == self.undo_depth {
                self.history.pop_front();
            }
            self.history.push_back(batch);
        }
        self.revision += 1;
        Ok(EditReceipt {
            revision: self.revision,
            changed,
            bbox,
            affected_labels: affected.into_vec(),
        })
    }

    /// Pop the most recent batch and restore every voxel it touched.
    pub fn undo(&mut self) -> Result<EditReceipt, LabelError> {
        let batch = self.history.pop_back().ok_or(LabelError::NoHistory)?;
        let mut bbox: Option<Bbox> = None;
        let mut affected = AffectedLabels::new(0);
        for &((z, y, x), previous) in batch.voxels.iter().rev() {
            let current = self.data[[z, y, x]];
            self.data[[z, y, x]] = previous;
            grow(&mut bbox, (z, y, x));
            if previous != 0 {
                grow(&mut self.bounds[previous as usize], (z, y, x));
            }
            affected.add(current);
            affected.add(previous);
        }
        self.revision += 1;
        Ok(EditReceipt {
            revision: self.revision,
            changed: batch.voxels.len(),
            bbox,
            affected_labels: affected.into_vec(),
        })
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Conservative bounding box of all voxels carrying `label`.
    pub fn label_bounds(&self, label: u8) -> Option<Bbox> {
        self.bounds[label as usize]
    }

    /// Owned copy of the mask inside `bbox`, for lock-free background work.
    pub fn region(&self, bbox: Bbox) -> Array3<u8> {
        self.data
            .slice(s![
                bbox.min[0]..=bbox.max[0],
                bbox.min[1]..=bbox.max[1],
                bbox.min[2]..=bbox.max[2]
            ])
            .to_owned()
    }
}

fn grow(bbox: &mut Option<Bbox>, v: (usize, usize, usize)) {
    match bbox {
        Some(b) => b.include(v),
        None => *bbox = Some(Bbox::of_voxel(v)),
    }
}

/// Small distinct-value accumulator for the handful of labels a batch can
/// touch.
struct AffectedLabels {
    values: Vec<u8>,
}

impl AffectedLabels {
    fn new(first: u8) -> Self {
        let mut values = Vec::new();
        if first != 0 {
            values.push(first);
        }
        Self { values }
    }

    fn add(&mut self, value: u8) {
        if value != 0 && !self.values.contains(&value) {
            self.values.push(value);
        }
    }

    fn into_vec(self) -> Vec<u8> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;

    fn volume(dim: (usize, usize, usize)) -> Volume {
        Volume::new(
            Array3::zeros(dim),
            Geometry::axis_aligned((1.0, 1.0, 1.0)).unwrap(),
        )
    }

    #[test]
    fn from_array_rejects_dimension_mismatch() {
        let vol = volume((4, 4, 4));
        let result = LabelVolume::from_array(Array3::zeros((4, 4, 5)), &vol, LabelConfig::default());
        assert!(matches!(result, Err(GeometryError::ShapeMismatch { .. })));
    }

    #[test]
    fn set_region_updates_only_listed_voxels() {
        let vol = volume((4, 4, 4));
        let mut mask = LabelVolume::create(&vol, LabelConfig::default());
        mask.set_region(&[(1, 1, 1)], 2).unwrap();

        for ((z, y, x), &value) in mask.data().indexed_iter() {
            let expected = if (z, y, x) == (1, 1, 1) { 2 } else { 0 };
            assert_eq!(value, expected);
        }
    }

    #[test]
    fn out_of_bounds_batch_is_atomic() {
        let vol = volume((4, 4, 4));
        let mut mask = LabelVolume::create(&vol, LabelConfig::default());
        let result = mask.set_region(&[(0, 0, 0), (9, 0, 0)], 1);
        assert!(matches!(result, Err(LabelError::OutOfBounds(..))));
        assert_eq!(mask.get(0, 0, 0), Some(0));
        assert_eq!(mask.history_len(), 0);
    }

    #[test]
    fn undo_is_a_strict_inverse() {
        let vol = volume((4, 4, 4));
        let mut mask = LabelVolume::create(&vol, LabelConfig::default());
        mask.set_region(&[(0, 0, 0), (1, 2, 3)], 1).unwrap();
        mask.set_region(&[(1, 2, 3), (2, 2, 2)], 2).unwrap();

        mask.undo().unwrap();
        assert_eq!(mask.get(1, 2, 3), Some(1));
        assert_eq!(mask.get(2, 2, 2), Some(0));

        mask.undo().unwrap();
        assert_eq!(mask.get(0, 0, 0), Some(0));
        assert_eq!(mask.get(1, 2, 3), Some(0));

        assert!(matches!(mask.undo(), Err(LabelError::NoHistory)));
    }

    #[test]
    fn history_is_bounded() {
        let vol = volume((4, 4, 4));
        let mut mask = LabelVolume::create(&vol, LabelConfig { undo_depth: 2 });
        mask.set_region(&[(0, 0, 0)], 1).unwrap();
        mask.set_region(&[(0, 0, 1)], 1).unwrap();
        mask.set_region(&[(0, 0, 2)], 1).unwrap();

        assert_eq!(mask.history_len(), 2);
        mask.undo().unwrap();
        mask.undo().unwrap();
        assert!(matches!(mask.undo(), Err(LabelError::NoHistory)));
        // The oldest edit is no longer revertible.
        assert_eq!(mask.get(0, 0, 0), Some(1));
    }

    #[test]
    fn affected_labels_cover_overwritten_values() {
        let vol = volume((4, 4, 4));
        let mut mask = LabelVolume::create(&vol, LabelConfig::default());
        mask.set_region(&[(1, 1, 1)], 1).unwrap();
        let receipt = mask.set_region(&[(1, 1, 1), (2, 2, 2)], 2).unwrap();
        assert!(receipt.affected_labels.contains(&1));
        assert!(receipt.affected_labels.contains(&2));
    }

    #[test]
    fn label_bounds_track_edits() {
        let vol = volume((8, 8, 8));
        let mut mask = LabelVolume::create(&vol, LabelConfig::default());
        assert!(mask.label_bounds(1).is_none());
        mask.set_region(&[(1, 2, 3), (5, 2, 3)], 1).unwrap();
        let bbox = mask.label_bounds(1).unwrap();
        assert_eq!(bbox.min, [1, 2, 3]);
        assert_eq!(bbox.max, [5, 2, 3]);
    }
}
