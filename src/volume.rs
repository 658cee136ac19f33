use crate::enums::Orientation;
use crate::geometry::Geometry;

use ndarray::Array3;
use ndarray::ArrayView2;
use ndarray::s;

/// The raw intensity volume, immutable after load.
///
/// Data is stored as (depth, height, width) = (z, y, x) with intensities in
/// Hounsfield units. The geometry ties voxel indices to physical space and is
/// validated at construction time.
pub struct Volume {
    data: Array3<f32>,
    geometry: Geometry,
}

impl Volume {
    pub fn new(data: Array3<f32>, geometry: Geometry) -> Self {
        Self { data, geometry }
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Bounds-checked intensity access.
    pub fn sample(&self, z: usize, y: usize, x: usize) -> Option<f32> {
        self.data.get((z, y, x)).copied()
    }

    /// 2D view of the volume along one of the three orthogonal axes.
    pub fn slice_at(&self, orientation: Orientation, index: usize) -> Option<ArrayView2<'_, f32>> {
        if !self.is_valid_index(index, orientation) {
            return None;
        }
        let slice = match orientation {
            Orientation::Axial => self.data.slice(s![index, .., ..]),
            Orientation::Coronal => self.data.slice(s![.., index, ..]),
            Orientation::Sagittal => self.data.slice(s![.., .., index]),
        };
        Some(slice)
    }

    pub fn is_valid_index(&self, index: usize, orientation: Orientation) -> bool {
        index < orientation.axis_len(self.dim())
    }

    /// Center voxel, used as the initial cursor position after load.
    pub fn center(&self) -> (usize, usize, usize) {
        let (d, h, w) = self.dim();
        (d / 2, h / 2, w / 2)
    }
}
