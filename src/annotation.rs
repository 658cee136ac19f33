use crate::enums::{Connectivity, Label, Orientation, ToolMode};
use crate::label::{EditReceipt, LabelError, LabelVolume};
use crate::volume::Volume;

use log::debug;
use std::collections::{HashSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("Region growing exceeded the configured bound of {max} voxels")]
    RegionGrowBound { max: usize },

    #[error("Seed voxel ({0}, {1}, {2}) outside volume")]
    SeedOutOfBounds(usize, usize, usize),

    #[error("Brush radius must be positive, got {0}")]
    NonPositiveRadius(f32),

    #[error("Magic wand threshold must be non-negative, got {0}")]
    InvalidThreshold(f32),

    #[error("Operation does not match the active tool")]
    ToolMismatch,

    #[error("No stroke in progress")]
    NoStroke,

    #[error(transparent)]
    Label(#[from] LabelError),
}

#[derive(Debug, Clone, Copy)]
pub struct AnnotationConfig {
    /// Hard cap on magic-wand region size; growth beyond it aborts the
    /// operation with the mask unchanged.
    pub max_region_size: usize,
    /// Neighborhood for region growing.
    pub connectivity: Connectivity,
    /// HU band treated as airway by the threshold pre-segmentation.
    pub airway_band: (f32, f32),
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            max_region_size: 262_144,
            connectivity: Connectivity::Six,
            airway_band: (-1000.0, -950.0),
        }
    }
}

/// An in-progress brush gesture: mouse-down to mouse-up accumulates one voxel
/// set, committed as a single undoable batch.
struct Stroke {
    orientation: Orientation,
    slice_index: usize,
    radius: f32,
    label: u8,
    last: (f32, f32),
    voxels: HashSet<(usize, usize, usize)>,
    dim: (usize, usize, usize),
}

/// Translates user gestures into voxel-selection sets and submits them to the
/// label mask.
pub struct AnnotationEngine {
    config: AnnotationConfig,
    tool: ToolMode,
    active_label: Label,
    stroke: Option<Stroke>,
}

impl AnnotationEngine {
    pub fn new(config: AnnotationConfig) -> Self {
        Self {
            config,
            tool: ToolMode::Brush { radius: 5.0 },
            active_label: Label::Lesion,
            stroke: None,
        }
    }

    pub fn tool(&self) -> ToolMode {
        self.tool
    }

    pub fn set_tool(&mut self, tool: ToolMode) -> Result<(), AnnotationError> {
        match tool {
            ToolMode::Brush { radius } | ToolMode::Eraser { radius } if radius <= 0.0 => {
                return Err(AnnotationError::NonPositiveRadius(radius));
            }
            ToolMode::MagicWand { threshold } if threshold < 0.0 => {
                return Err(AnnotationError::InvalidThreshold(threshold));
            }
            _ => {}
        }
        self.tool = tool;
        Ok(())
    }

    pub fn active_label(&self) -> Label {
        self.active_label
    }

    pub fn set_active_label(&mut self, label: Label) {
        self.active_label = label;
    }

    /// Start a brush or eraser stroke at an in-plane point `(u, v)` on the
    /// given slice. The disk under the point is stamped immediately.
    pub fn begin_stroke(
        &mut self,
        labels: &LabelVolume,
        orientation: Orientation,
        slice_index: usize,
        u: f32,
        v: f32,
    ) -> Result<(), AnnotationError> {
        let (radius, label) = match self.tool {
            ToolMode::Brush { radius } => (radius, self.active_label.value()),
            ToolMode::Eraser { radius } => (radius, Label::Background.value()),
            ToolMode::MagicWand { .. } => return Err(AnnotationError::ToolMismatch),
        };
        let mut stroke = Stroke {
            orientation,
            slice_index,
            radius,
            label,
            last: (u, v),
            voxels: HashSet::new(),
            dim: labels.dim(),
        };
        stamp_disk(&mut stroke, u, v);
        self.stroke = Some(stroke);
        Ok(())
    }

    /// Extend the current stroke to `(u, v)`, rasterizing the dragged segment
    /// as a union of disks so fast cursor motion leaves no gaps.
    pub fn extend_stroke(&mut self, u: f32, v: f32) -> Result<(), AnnotationError> {
        let stroke = self.stroke.as_mut().ok_or(AnnotationError::NoStroke)?;
        let (lu, lv) = stroke.last;
        let (du, dv) = (u - lu, v - lv);
        let length = (du * du + dv * dv).sqrt();
        let steps = (length / 0.5).ceil().max(1.0) as usize;
        for step in 1..=steps {
            let t = step as f32 / steps as f32;
            stamp_disk(stroke, lu + du * t, lv + dv * t);
        }
        stroke.last = (u, v);
        Ok(())
    }

    /// Finish the gesture and commit the accumulated voxel set as one batch.
    pub fn end_stroke(&mut self, labels: &mut LabelVolume) -> Result<EditReceipt, AnnotationError> {
        let stroke = self.stroke.take().ok_or(AnnotationError::NoStroke)?;
        let mut voxels: Vec<_> = stroke.voxels.into_iter().collect();
        voxels.sort_unstable();
        debug!(
            "committing stroke: {} voxels, label {}",
            voxels.len(),
            stroke.label
        );
        Ok(labels.set_region(&voxels, stroke.label)?)
    }

    pub fn stroke_in_progress(&self) -> bool {
        self.stroke.is_some()
    }

    /// Flood-fill region growing from `seed`, accepting neighbors whose
    /// intensity lies within the wand threshold band around the seed
    /// intensity. Aborts without touching the mask once the region would
    /// exceed the configured maximum.
    pub fn magic_wand(
        &mut self,
        volume: &Volume,
        labels: &mut LabelVolume,
        seed: (usize, usize, usize),
    ) -> Result<EditReceipt, AnnotationError> {
        let threshold = match self.tool {
            ToolMode::MagicWand { threshold } => threshold,
            _ => return Err(AnnotationError::ToolMismatch),
        };
        let seed_intensity = volume
            .sample(seed.0, seed.1, seed.2)
            .ok_or(AnnotationError::SeedOutOfBounds(seed.0, seed.1, seed.2))?;

        let (d, h, w) = volume.dim();
        let max = self.config.max_region_size;
        let offsets = self.config.connectivity.offsets();

        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        let mut region = Vec::new();
        visited.insert(seed);
        queue.push_back(seed);

        while let Some((z, y, x)) = queue.pop_front() {
            region.push((z, y, x));
            if region.len() > max {
                debug!("magic wand aborted at {} voxels", region.len());
                return Err(AnnotationError::RegionGrowBound { max });
            }
            for &(dz, dy, dx) in offsets {
                let nz = z as i64 + dz;
                let ny = y as i64 + dy;
                let nx = x as i64 + dx;
                if nz < 0 || ny < 0 || nx < 0 {
                    continue;
                }
                let next = (nz as usize, ny as usize, nx as usize);
                if next.0 >= d || next.1 >= h || next.2 >= w || visited.contains(&next) {
                    continue;
                }
                let intensity = volume.data()[[next.0, next.1, next.2]];
                if (intensity - seed_intensity).abs() <= threshold {
                    visited.insert(next);
                    queue.push_back(next);
                }
            }
        }

        region.sort_unstable();
        Ok(labels.set_region(&region, self.active_label.value())?)
    }

    /// Threshold pre-segmentation: every voxel inside the configured HU band
    /// becomes airway, committed as one undoable batch.
    pub fn segment_airway(
        &self,
        volume: &Volume,
        labels: &mut LabelVolume,
    ) -> Result<EditReceipt, AnnotationError> {
        let (low, high) = self.config.airway_band;
        let mut voxels = Vec::new();
        for ((z, y, x), &intensity) in volume.data().indexed_iter() {
            if intensity >= low && intensity <= high {
                voxels.push((z, y, x));
            }
        }
        debug!("airway threshold selected {} voxels", voxels.len());
        Ok(labels.set_region(&voxels, Label::Airway.value())?)
    }
}

/// Stamp the voxels within `radius` of the in-plane point `(u, v)` onto the
/// stroke, clipped to volume bounds. The voxel nearest the point is always
/// included so a click paints even with a sub-voxel radius.
fn stamp_disk(stroke: &mut Stroke, u: f32, v: f32) {
    let r = stroke.radius;
    let r2 = r * r;
    let lo_u = (u - r).floor() as i64;
    let hi_u = (u + r).ceil() as i64;
    let lo_v = (v - r).floor() as i64;
    let hi_v = (v + r).ceil() as i64;
    for iv in lo_v..=hi_v {
        for iu in lo_u..=hi_u {
            let du = iu as f32 - u;
            let dv = iv as f32 - v;
            if du * du + dv * dv <= r2 {
                push_plane_voxel(stroke, iu, iv);
            }
        }
    }
    push_plane_voxel(stroke, u.round() as i64, v.round() as i64);
}

fn push_plane_voxel(stroke: &mut Stroke, iu: i64, iv: i64) {
    if iu < 0 || iv < 0 {
        return;
    }
    let (iu, iv) = (iu as usize, iv as usize);
    let index = stroke.slice_index;
    let (d, h, w) = stroke.dim;
    let voxel = match stroke.orientation {
        Orientation::Axial => (index, iv, iu),
        Orientation::Coronal => (iv, index, iu),
        Orientation::Sagittal => (iv, iu, index),
    };
    if voxel.0 < d && voxel.1 < h && voxel.2 < w {
        stroke.voxels.insert(voxel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use crate::label::LabelConfig;
    use ndarray::Array3;

    fn flat_volume(dim: (usize, usize, usize), intensity: f32) -> Volume {
        Volume::new(
            Array3::from_elem(dim, intensity),
            Geometry::axis_aligned((1.0, 1.0, 1.0)).unwrap(),
        )
    }

    fn engine() -> AnnotationEngine {
        AnnotationEngine::new(AnnotationConfig::default())
    }

    #[test]
    fn rejects_non_positive_radius() {
        let mut engine = engine();
        assert!(matches!(
            engine.set_tool(ToolMode::Brush { radius: 0.0 }),
            Err(AnnotationError::NonPositiveRadius(_))
        ));
    }

    #[test]
    fn stroke_is_one_undoable_batch() {
        let volume = flat_volume((8, 32, 32), 0.0);
        let mut labels = LabelVolume::create(&volume, LabelConfig::default());
        let mut engine = engine();
        engine.set_tool(ToolMode::Brush { radius: 2.0 }).unwrap();

        engine
            .begin_stroke(&labels, Orientation::Axial, 3, 5.0, 5.0)
            .unwrap();
        engine.extend_stroke(12.0, 9.0).unwrap();
        engine.extend_stroke(20.0, 5.0).unwrap();
        let receipt = engine.end_stroke(&mut labels).unwrap();

        assert!(receipt.changed > 0);
        assert_eq!(labels.history_len(), 1);
        labels.undo().unwrap();
        assert!(labels.data().iter().all(|&v| v == 0));
    }

    #[test]
    fn stroke_rasterization_leaves_no_gaps() {
        let volume = flat_volume((4, 64, 64), 0.0);
        let mut labels = LabelVolume::create(&volume, LabelConfig::default());
        let mut engine = engine();
        engine.set_tool(ToolMode::Brush { radius: 1.5 }).unwrap();

        engine
            .begin_stroke(&labels, Orientation::Axial, 1, 3.0, 3.0)
            .unwrap();
        // One long fast drag, far beyond the disk diameter.
        engine.extend_stroke(55.0, 40.0).unwrap();
        engine.end_stroke(&mut labels).unwrap();

        // The painted in-plane set must be 4-connected.
        let painted: Vec<(usize, usize)> = labels
            .slice_at(Orientation::Axial, 1)
            .unwrap()
            .indexed_iter()
            .filter(|&(_, &v)| v != 0)
            .map(|((y, x), _)| (y, x))
            .collect();
        assert!(!painted.is_empty());

        let set: HashSet<_> = painted.iter().copied().collect();
        let mut reached = HashSet::new();
        let mut queue = VecDeque::from([painted[0]]);
        reached.insert(painted[0]);
        while let Some((y, x)) = queue.pop_front() {
            for (ny, nx) in [
                (y.wrapping_sub(1), x),
                (y + 1, x),
                (y, x.wrapping_sub(1)),
                (y, x + 1),
            ] {
                if set.contains(&(ny, nx)) && reached.insert((ny, nx)) {
                    queue.push_back((ny, nx));
                }
            }
        }
        assert_eq!(reached.len(), painted.len());
    }

    #[test]
    fn eraser_clears_painted_voxels() {
        let volume = flat_volume((4, 16, 16), 0.0);
        let mut labels = LabelVolume::create(&volume, LabelConfig::default());
        let mut engine = engine();
        engine.set_tool(ToolMode::Brush { radius: 3.0 }).unwrap();
        engine
            .begin_stroke(&labels, Orientation::Axial, 2, 8.0, 8.0)
            .unwrap();
        engine.end_stroke(&mut labels).unwrap();
        assert_eq!(labels.get(2, 8, 8), Some(Label::Lesion.value()));

        engine.set_tool(ToolMode::Eraser { radius: 3.0 }).unwrap();
        engine
            .begin_stroke(&labels, Orientation::Axial, 2, 8.0, 8.0)
            .unwrap();
        engine.end_stroke(&mut labels).unwrap();
        assert_eq!(labels.get(2, 8, 8), Some(0));
    }

    #[test]
    fn brush_clips_to_volume_bounds() {
        let volume = flat_volume((2, 8, 8), 0.0);
        let mut labels = LabelVolume::create(&volume, LabelConfig::default());
        let mut engine = engine();
        engine.set_tool(ToolMode::Brush { radius: 4.0 }).unwrap();
        engine
            .begin_stroke(&labels, Orientation::Axial, 0, 0.0, 0.0)
            .unwrap();
        let receipt = engine.end_stroke(&mut labels).unwrap();
        // Clipped at the corner: strictly fewer voxels than the full disk.
        assert!(receipt.changed > 0);
        assert!(receipt.changed < 49);
    }

    #[test]
    fn magic_wand_respects_threshold_band() {
        let mut data = Array3::from_elem((3, 8, 8), 100.0f32);
        // A dark pocket bounded by bright tissue.
        for y in 2..5 {
            for x in 2..5 {
                data[[1, y, x]] = -900.0;
            }
        }
        let volume = Volume::new(data, Geometry::axis_aligned((1.0, 1.0, 1.0)).unwrap());
        let mut labels = LabelVolume::create(&volume, LabelConfig::default());
        let mut engine = engine();
        engine
            .set_tool(ToolMode::MagicWand { threshold: 50.0 })
            .unwrap();
        engine.set_active_label(Label::Airway);

        let receipt = engine.magic_wand(&volume, &mut labels, (1, 3, 3)).unwrap();
        assert_eq!(receipt.changed, 9);
        assert_eq!(labels.get(1, 3, 3), Some(Label::Airway.value()));
        assert_eq!(labels.get(1, 1, 1), Some(0));
        assert_eq!(labels.get(0, 3, 3), Some(0));
    }

    #[test]
    fn magic_wand_bound_leaves_mask_unchanged() {
        let volume = flat_volume((8, 8, 8), -900.0);
        let mut labels = LabelVolume::create(&volume, LabelConfig::default());
        let mut engine = AnnotationEngine::new(AnnotationConfig {
            max_region_size: 16,
            ..AnnotationConfig::default()
        });
        engine
            .set_tool(ToolMode::MagicWand { threshold: 10.0 })
            .unwrap();

        let result = engine.magic_wand(&volume, &mut labels, (4, 4, 4));
        assert!(matches!(
            result,
            Err(AnnotationError::RegionGrowBound { max: 16 })
        ));
        assert!(labels.data().iter().all(|&v| v == 0));
        assert_eq!(labels.history_len(), 0);
    }

    #[test]
    fn wand_connectivity_is_configurable() {
        let mut data = Array3::from_elem((4, 4, 4), 100.0f32);
        // Two dark voxels touching only at a corner.
        data[[1, 1, 1]] = -900.0;
        data[[2, 2, 2]] = -900.0;
        let volume = Volume::new(data, Geometry::axis_aligned((1.0, 1.0, 1.0)).unwrap());

        for (connectivity, expected) in [(Connectivity::Six, 1), (Connectivity::TwentySix, 2)] {
            let mut labels = LabelVolume::create(&volume, LabelConfig::default());
            let mut engine = AnnotationEngine::new(AnnotationConfig {
                connectivity,
                ..AnnotationConfig::default()
            });
            engine
                .set_tool(ToolMode::MagicWand { threshold: 10.0 })
                .unwrap();
            let receipt = engine.magic_wand(&volume, &mut labels, (1, 1, 1)).unwrap();
            assert_eq!(receipt.changed, expected);
        }
    }

    #[test]
    fn wand_without_wand_tool_is_rejected() {
        let volume = flat_volume((4, 4, 4), 0.0);
        let mut labels = LabelVolume::create(&volume, LabelConfig::default());
        let mut engine = engine();
        assert!(matches!(
            engine.magic_wand(&volume, &mut labels, (0, 0, 0)),
            Err(AnnotationError::ToolMismatch)
        ));
    }

    #[test]
    fn airway_threshold_segmentation() {
        let mut data = Array3::from_elem((4, 4, 4), 40.0f32);
        data[[0, 0, 0]] = -980.0;
        data[[2, 1, 3]] = -1000.0;
        data[[3, 3, 3]] = -1200.0; // below the band
        let volume = Volume::new(data, Geometry::axis_aligned((1.0, 1.0, 1.0)).unwrap());
        let mut labels = LabelVolume::create(&volume, LabelConfig::default());

        let receipt = engine().segment_airway(&volume, &mut labels).unwrap();
        assert_eq!(receipt.changed, 2);
        assert_eq!(labels.get(0, 0, 0), Some(Label::Airway.value()));
        assert_eq!(labels.get(2, 1, 3), Some(Label::Airway.value()));
        assert_eq!(labels.get(3, 3, 3), Some(0));
    }
}
