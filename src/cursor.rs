use crate::enums::Orientation;
use crate::geometry::Geometry;
use crate::volume::Volume;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("Window width must be positive, got {0}")]
    NonPositiveWidth(f32),
}

/// Linear contrast mapping: `width` is the HU range mapped onto full display
/// contrast, `level` its center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowLevel {
    width: f32,
    level: f32,
}

impl WindowLevel {
    pub fn new(width: f32, level: f32) -> Result<Self, WindowError> {
        if width <= 0.0 {
            return Err(WindowError::NonPositiveWidth(width));
        }
        Ok(Self { width, level })
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    /// Map an intensity to an 8-bit display value.
    #[inline]
    pub fn apply(&self, intensity: f32) -> u8 {
        let low = self.level - self.width / 2.0;
        let t = ((intensity - low) / self.width).clamp(0.0, 1.0);
        (t * 255.0).round() as u8
    }
}

impl Default for WindowLevel {
    /// Lung window, the load-time default of the annotation UI.
    fn default() -> Self {
        Self {
            width: 1500.0,
            level: -600.0,
        }
    }
}

/// Voxel position with a continuous sub-voxel offset, always inside volume
/// bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cursor {
    pub index: (usize, usize, usize),
    pub frac: (f32, f32, f32),
}

impl Cursor {
    fn from_continuous(z: f32, y: f32, x: f32) -> Self {
        let split = |v: f32| -> (usize, f32) {
            // Snap positions a rounding error away from a voxel center so a
            // physical-space round trip cannot shift the index.
            let v = if (v - v.round()).abs() < 1e-3 { v.round() } else { v };
            let floor = v.floor();
            (floor as usize, v - floor)
        };
        let (zi, zf) = split(z);
        let (yi, yf) = split(y);
        let (xi, xf) = split(x);
        Self {
            index: (zi, yi, xi),
            frac: (zf, yf, xf),
        }
    }

    pub fn continuous(&self) -> (f32, f32, f32) {
        (
            self.index.0 as f32 + self.frac.0,
            self.index.1 as f32 + self.frac.1,
            self.index.2 as f32 + self.frac.2,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CursorEvent {
    Moved(Cursor),
    WindowChanged(WindowLevel),
}

/// Single source of truth for the 3D cursor and window/level parameters.
///
/// Every update notifies subscribers synchronously before the call returns,
/// so all three orthogonal views observe a consistent cursor before the next
/// frame is rendered.
pub struct CursorModel {
    dim: (usize, usize, usize),
    geometry: Geometry,
    cursor: Cursor,
    window: WindowLevel,
    subscribers: Vec<Box<dyn FnMut(&CursorEvent) + Send>>,
}

impl CursorModel {
    /// Model centered on the volume, with the default lung window.
    pub fn new(volume: &Volume) -> Self {
        let (z, y, x) = volume.center();
        Self {
            dim: volume.dim(),
            geometry: volume.geometry().clone(),
            cursor: Cursor {
                index: (z, y, x),
                frac: (0.0, 0.0, 0.0),
            },
            window: WindowLevel::default(),
            subscribers: Vec::new(),
        }
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn window(&self) -> WindowLevel {
        self.window
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&CursorEvent) + Send + 'static) {
        self.subscribers.push(Box::new(subscriber));
    }

    /// Move the cursor to a continuous (z, y, x) position, clamped to volume
    /// bounds. Out-of-bounds input is not an error.
    pub fn set_position(&mut self, z: f32, y: f32, x: f32) -> Cursor {
        let clamped = self.clamp(z, y, x);
        self.cursor = Cursor::from_continuous(clamped.0, clamped.1, clamped.2);
        self.notify(CursorEvent::Moved(self.cursor));
        self.cursor
    }

    pub fn set_window(&mut self, window: WindowLevel) {
        self.window = window;
        self.notify(CursorEvent::WindowChanged(window));
    }

    /// Project a 2D point on one orthogonal slice plane into the shared 3D
    /// cursor. `(u, v)` are in-plane voxel coordinates following the slice
    /// image convention: axial (x, y), coronal (x, z), sagittal (y, z).
    ///
    /// The point goes through physical space and back using the volume
    /// geometry, so the crosshair round-trip is exact up to sub-voxel
    /// rounding.
    pub fn set_from_slice(&mut self, orientation: Orientation, index: usize, u: f32, v: f32) -> Cursor {
        let (z, y, x) = match orientation {
            Orientation::Axial => (index as f32, v, u),
            Orientation::Coronal => (v, index as f32, u),
            Orientation::Sagittal => (v, u, index as f32),
        };
        let physical = self.geometry.index_to_physical(z, y, x);
        let (z, y, x) = self.geometry.physical_to_index(physical);
        self.set_position(z, y, x)
    }

    /// Slice index and in-plane (u, v) of the current cursor on the given
    /// orientation. Inverse of [`CursorModel::set_from_slice`].
    pub fn project(&self, orientation: Orientation) -> (usize, (f32, f32)) {
        let (z, y, x) = self.cursor.continuous();
        match orientation {
            Orientation::Axial => (self.cursor.index.0, (x, y)),
            Orientation::Coronal => (self.cursor.index.1, (x, z)),
            Orientation::Sagittal => (self.cursor.index.2, (y, z)),
        }
    }

    /// Per-orientation slice indices (axial, coronal, sagittal) for view
    /// synchronization.
    pub fn slice_indices(&self) -> (usize, usize, usize) {
        self.cursor.index
    }

    /// Physical position of the cursor in mm.
    pub fn physical(&self) -> (f32, f32, f32) {
        let (z, y, x) = self.cursor.continuous();
        self.geometry.index_to_physical(z, y, x)
    }

    fn clamp(&self, z: f32, y: f32, x: f32) -> (f32, f32, f32) {
        (
            z.clamp(0.0, (self.dim.0 - 1) as f32),
            y.clamp(0.0, (self.dim.1 - 1) as f32),
            x.clamp(0.0, (self.dim.2 - 1) as f32),
        )
    }

    fn notify(&mut self, event: CursorEvent) {
        for subscriber in &mut self.subscribers {
            subscriber(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use std::sync::{Arc, Mutex};

    fn test_volume() -> Volume {
        Volume::new(
            Array3::zeros((10, 20, 30)),
            Geometry::axis_aligned((0.7, 0.7, 1.25)).unwrap(),
        )
    }

    #[test]
    fn window_rejects_non_positive_width() {
        assert!(matches!(
            WindowLevel::new(0.0, 40.0),
            Err(WindowError::NonPositiveWidth(_))
        ));
    }

    #[test]
    fn lung_window_mapping() {
        let wl = WindowLevel::new(1500.0, -600.0).unwrap();
        assert_eq!(wl.apply(-600.0), 128);
        assert_eq!(wl.apply(-1350.0), 0);
        assert_eq!(wl.apply(-2000.0), 0);
        assert_eq!(wl.apply(150.0), 255);
        assert_eq!(wl.apply(900.0), 255);
    }

    #[test]
    fn cursor_is_clamped_to_bounds() {
        let volume = test_volume();
        let mut model = CursorModel::new(&volume);
        let cursor = model.set_position(-3.0, 50.0, 12.5);
        assert_eq!(cursor.index, (0, 19, 12));
        assert!((cursor.frac.2 - 0.5).abs() < 1e-4);
    }

    #[test]
    fn crosshair_round_trip_on_all_axes() {
        let volume = test_volume();
        let mut model = CursorModel::new(&volume);
        model.set_position(4.0, 11.0, 22.0);

        for orientation in Orientation::ALL {
            let (index, (u, v)) = model.project(orientation);
            let cursor = model.set_from_slice(orientation, index, u, v);
            assert_eq!(cursor.index, (4, 11, 22));
            assert!(cursor.frac.0.abs() < 1e-3);
            assert!(cursor.frac.1.abs() < 1e-3);
            assert!(cursor.frac.2.abs() < 1e-3);
        }
    }

    #[test]
    fn updates_notify_synchronously() {
        let volume = test_volume();
        let mut model = CursorModel::new(&volume);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        model.subscribe(move |event| sink.lock().unwrap().push(*event));

        model.set_position(1.0, 2.0, 3.0);
        let wl = WindowLevel::new(400.0, 40.0).unwrap();
        model.set_window(wl);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(matches!(seen[0], CursorEvent::Moved(c) if c.index == (1, 2, 3)));
        assert!(matches!(seen[1], CursorEvent::WindowChanged(w) if w == wl));
    }
}
