use crate::cursor::CursorModel;
use crate::enums::{Label, Orientation};
use crate::label::LabelVolume;
use crate::volume::Volume;

use image::RgbaImage;
use rayon::prelude::*;

/// Presentation parameters for slice composition.
#[derive(Debug, Clone, Copy)]
pub struct ViewConfig {
    /// Label overlay opacity, 0 (invisible) to 1 (opaque).
    pub overlay_opacity: f32,
    /// Draw the orientation-colored crosshair into each slice.
    pub crosshair: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            overlay_opacity: 0.5,
            crosshair: true,
        }
    }
}

/// One rendered MPR view: windowed grayscale with the label overlay
/// composited in, plus the crosshair pixel for readouts.
pub struct SliceImage {
    pub orientation: Orientation,
    pub index: usize,
    pub image: RgbaImage,
    /// Crosshair position as (column, row), i.e. image (x, y).
    pub crosshair: (u32, u32),
}

fn label_color(value: u8) -> Option<[u8; 3]> {
    match Label::from_value(value)? {
        Label::Background => None,
        Label::Airway => Some([0, 255, 255]),
        Label::Lesion => Some([255, 0, 0]),
    }
}

fn crosshair_color(orientation: Orientation) -> [u8; 3] {
    match orientation {
        Orientation::Axial => [255, 0, 0],
        Orientation::Coronal => [0, 255, 0],
        Orientation::Sagittal => [0, 160, 255],
    }
}

/// Stateless façade recomputing the three display slices from the current
/// cursor, window and mask. Exactly one volume/mask pair per session is
/// surfaced to presentation collaborators; everything beyond these images and
/// meshes (menus, sliders, theming) belongs to the GUI layer.
pub struct ViewCoordinator {
    config: ViewConfig,
}

impl ViewCoordinator {
    pub fn new(config: ViewConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> ViewConfig {
        self.config
    }

    pub fn set_overlay_opacity(&mut self, opacity: f32) {
        self.config.overlay_opacity = opacity.clamp(0.0, 1.0);
    }

    /// Compose one orientation's slice at the given index.
    pub fn render_slice(
        &self,
        volume: &Volume,
        labels: &LabelVolume,
        cursor: &CursorModel,
        orientation: Orientation,
        index: usize,
    ) -> Option<SliceImage> {
        let slice = volume.slice_at(orientation, index)?;
        let mask = labels.slice_at(orientation, index)?;
        let window = cursor.window();
        let opacity = self.config.overlay_opacity;

        let (rows, cols) = slice.dim();
        let pixels: Vec<u8> = (0..rows)
            .into_par_iter()
            .flat_map_iter(|row| {
                (0..cols).flat_map(move |col| {
                    let gray = window.apply(slice[[row, col]]);
                    match label_color(mask[[row, col]]).filter(|_| opacity > 0.0) {
                        Some(color) => blend(gray, color, opacity),
                        None => [gray, gray, gray, 255],
                    }
                })
            })
            .collect();

        let mut image = RgbaImage::from_raw(cols as u32, rows as u32, pixels)?;

        let (_, (u, v)) = cursor.project(orientation);
        let crosshair = (
            (u.round() as u32).min(cols as u32 - 1),
            (v.round() as u32).min(rows as u32 - 1),
        );
        if self.config.crosshair {
            draw_crosshair(&mut image, crosshair, crosshair_color(orientation));
        }

        Some(SliceImage {
            orientation,
            index,
            image,
            crosshair,
        })
    }

    /// The three orthogonal views at the cursor's slice indices.
    pub fn render_views(
        &self,
        volume: &Volume,
        labels: &LabelVolume,
        cursor: &CursorModel,
    ) -> Vec<SliceImage> {
        Orientation::ALL
            .iter()
            .filter_map(|&orientation| {
                let (index, _) = cursor.project(orientation);
                self.render_slice(volume, labels, cursor, orientation, index)
            })
            .collect()
    }
}

#[inline]
fn blend(gray: u8, color: [u8; 3], opacity: f32) -> [u8; 4] {
    let mix = |c: u8| -> u8 {
        (gray as f32 * (1.0 - opacity) + c as f32 * opacity).round() as u8
    };
    [mix(color[0]), mix(color[1]), mix(color[2]), 255]
}

fn draw_crosshair(image: &mut RgbaImage, at: (u32, u32), color: [u8; 3]) {
    let (cx, cy) = at;
    let rgba = image::Rgba([color[0], color[1], color[2], 255]);
    for x in 0..image.width() {
        image.put_pixel(x, cy, rgba);
    }
    for y in 0..image.height() {
        image.put_pixel(cx, y, rgba);
    }
}
