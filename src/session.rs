use crate::annotation::{AnnotationConfig, AnnotationEngine, AnnotationError};
use crate::cursor::{Cursor, CursorModel, WindowLevel};
use crate::enums::{Label, Orientation, SortBy, ToolMode};
use crate::export::{self, ExportError};
use crate::label::{EditReceipt, LabelConfig, LabelError, LabelVolume};
use crate::mesh::{Mesh, MeshExtractor};
use crate::view::{SliceImage, ViewConfig, ViewCoordinator};
use crate::volume::Volume;
use crate::volume_loader::{PatientInfo, VolumeLoader, VolumeLoaderError};
use crate::worker::{MeshJob, MeshResult, MeshWorker};

use log::info;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard};

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionConfig {
    pub label: LabelConfig,
    pub annotation: AnnotationConfig,
    pub view: ViewConfig,
}

/// One editing session: the explicit context object tying a volume, its
/// label mask, cursor state, tools and the mesh worker together.
///
/// Created on load and dropped on close; there is no ambient global state.
/// Mask mutation is serialized through a write lock, so concurrent readers
/// observe either the pre- or post-batch mask, never a partial edit.
pub struct Session {
    volume: Arc<Volume>,
    labels: Arc<RwLock<LabelVolume>>,
    cursor: CursorModel,
    engine: AnnotationEngine,
    coordinator: ViewCoordinator,
    worker: MeshWorker,
    patient: PatientInfo,
    views_dirty: Arc<AtomicBool>,
}

impl Session {
    pub fn new(volume: Volume, patient: PatientInfo, config: SessionConfig) -> Self {
        let volume = Arc::new(volume);
        let labels = Arc::new(RwLock::new(LabelVolume::create(&volume, config.label)));
        let mut cursor = CursorModel::new(&volume);

        let views_dirty = Arc::new(AtomicBool::new(true));
        let dirty = views_dirty.clone();
        cursor.subscribe(move |_| dirty.store(true, Ordering::Release));

        info!("session opened: volume {:?}", volume.dim());
        Self {
            volume,
            labels,
            cursor,
            engine: AnnotationEngine::new(config.annotation),
            coordinator: ViewCoordinator::new(config.view),
            worker: MeshWorker::spawn(),
            patient,
            views_dirty,
        }
    }

    /// Load a DICOM directory and open a session on it.
    pub fn open_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
        config: SessionConfig,
    ) -> Result<Self, VolumeLoaderError> {
        let series = VolumeLoader::load_from_directory(path, sort_by)?;
        Ok(Self::new(series.volume, series.patient, config))
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub fn patient(&self) -> &PatientInfo {
        &self.patient
    }

    /// Read access to the mask for display and export; holds off concurrent
    /// edits while alive.
    pub fn labels(&self) -> RwLockReadGuard<'_, LabelVolume> {
        self.labels.read().expect("label lock poisoned")
    }

    // ---- cursor and window ----

    pub fn cursor(&self) -> Cursor {
        self.cursor.cursor()
    }

    pub fn window(&self) -> WindowLevel {
        self.cursor.window()
    }

    pub fn set_window(&mut self, window: WindowLevel) {
        self.cursor.set_window(window);
    }

    pub fn set_cursor(&mut self, z: f32, y: f32, x: f32) -> Cursor {
        self.cursor.set_position(z, y, x)
    }

    /// Crosshair linking: project a click on one orthogonal view into the
    /// shared 3D cursor; subscribers see the move before this returns.
    pub fn set_cursor_from_slice(
        &mut self,
        orientation: Orientation,
        index: usize,
        u: f32,
        v: f32,
    ) -> Cursor {
        self.cursor.set_from_slice(orientation, index, u, v)
    }

    pub fn slice_indices(&self) -> (usize, usize, usize) {
        self.cursor.slice_indices()
    }

    pub fn slice_index_range(&self, orientation: Orientation) -> (usize, usize) {
        (0, orientation.axis_len(self.volume.dim()) - 1)
    }

    // ---- tools and editing ----

    pub fn tool(&self) -> ToolMode {
        self.engine.tool()
    }

    pub fn set_tool(&mut self, tool: ToolMode) -> Result<(), AnnotationError> {
        self.engine.set_tool(tool)
    }

    pub fn set_active_label(&mut self, label: Label) {
        self.engine.set_active_label(label);
    }

    pub fn set_overlay_opacity(&mut self, opacity: f32) {
        self.coordinator.set_overlay_opacity(opacity);
        self.views_dirty.store(true, Ordering::Release);
    }

    pub fn begin_stroke(
        &mut self,
        orientation: Orientation,
        index: usize,
        u: f32,
        v: f32,
    ) -> Result<(), AnnotationError> {
        let labels = self.labels.read().expect("label lock poisoned");
        self.engine.begin_stroke(&labels, orientation, index, u, v)
    }

    pub fn extend_stroke(&mut self, u: f32, v: f32) -> Result<(), AnnotationError> {
        self.engine.extend_stroke(u, v)
    }

    /// Commit the stroke as one undoable batch and schedule mesh updates.
    pub fn end_stroke(&mut self) -> Result<EditReceipt, AnnotationError> {
        let mut labels = self.labels.write().expect("label lock poisoned");
        let receipt = self.engine.end_stroke(&mut labels)?;
        self.after_edit(&labels, &receipt);
        Ok(receipt)
    }

    pub fn magic_wand(
        &mut self,
        seed: (usize, usize, usize),
    ) -> Result<EditReceipt, AnnotationError> {
        let mut labels = self.labels.write().expect("label lock poisoned");
        let receipt = self.engine.magic_wand(&self.volume, &mut labels, seed)?;
        self.after_edit(&labels, &receipt);
        Ok(receipt)
    }

    pub fn segment_airway(&mut self) -> Result<EditReceipt, AnnotationError> {
        let mut labels = self.labels.write().expect("label lock poisoned");
        let receipt = self.engine.segment_airway(&self.volume, &mut labels)?;
        self.after_edit(&labels, &receipt);
        Ok(receipt)
    }

    pub fn undo(&mut self) -> Result<EditReceipt, LabelError> {
        let mut labels = self.labels.write().expect("label lock poisoned");
        let receipt = labels.undo()?;
        self.after_edit(&labels, &receipt);
        Ok(receipt)
    }

    /// Snapshot the affected labels' regions under the edit lock and hand
    /// them to the background extractor.
    fn after_edit(&self, labels: &LabelVolume, receipt: &EditReceipt) {
        for &label in &receipt.affected_labels {
            if let Some(bbox) = labels.label_bounds(label) {
                self.worker.submit(MeshJob {
                    label,
                    revision: receipt.revision,
                    region: labels.region(bbox),
                    offset: bbox.min,
                    geometry: labels.geometry().clone(),
                });
            }
        }
        self.views_dirty.store(true, Ordering::Release);
    }

    // ---- presentation ----

    /// True when cursor, window, opacity or mask changed since the last
    /// [`Session::views`] call.
    pub fn needs_refresh(&self) -> bool {
        self.views_dirty.load(Ordering::Acquire)
    }

    /// Recompute the three MPR views at the current cursor.
    pub fn views(&self) -> Vec<SliceImage> {
        let labels = self.labels.read().expect("label lock poisoned");
        let views = self
            .coordinator
            .render_views(&self.volume, &labels, &self.cursor);
        self.views_dirty.store(false, Ordering::Release);
        views
    }

    pub fn view_at(&self, orientation: Orientation, index: usize) -> Option<SliceImage> {
        let labels = self.labels.read().expect("label lock poisoned");
        self.coordinator
            .render_slice(&self.volume, &labels, &self.cursor, orientation, index)
    }

    /// Newest background-extracted mesh for a label, if one arrived.
    pub fn take_mesh(&self, label: Label) -> Option<MeshResult> {
        self.worker.take_result(label.value())
    }

    /// Synchronous extraction, for export or initial display.
    pub fn extract_mesh(&self, label: Label) -> Mesh {
        let labels = self.labels.read().expect("label lock poisoned");
        MeshExtractor::extract(&labels, label.value())
    }

    // ---- export ----

    pub fn export_mask(&self, path: &Path) -> Result<(), ExportError> {
        let labels = self.labels.read().expect("label lock poisoned");
        export::write_mask_nifti(&labels, path)
    }

    pub fn export_mesh_ply(&self, label: Label, path: &Path) -> Result<(), ExportError> {
        export::write_mesh_ply(&self.extract_mesh(label), path)
    }

    pub fn export_mesh_obj(&self, label: Label, path: &Path) -> Result<(), ExportError> {
        export::write_mesh_obj(&self.extract_mesh(label), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use ndarray::Array3;

    fn session() -> Session {
        let volume = Volume::new(
            Array3::from_elem((8, 16, 16), -600.0f32),
            Geometry::axis_aligned((1.0, 1.0, 1.0)).unwrap(),
        );
        Session::new(volume, PatientInfo::default(), SessionConfig::default())
    }

    #[test]
    fn stroke_commit_refreshes_views_and_meshes() {
        let mut session = session();
        session
            .set_tool(ToolMode::Brush { radius: 2.0 })
            .unwrap();
        session.views();
        assert!(!session.needs_refresh());

        session
            .begin_stroke(Orientation::Axial, 4, 8.0, 8.0)
            .unwrap();
        let receipt = session.end_stroke().unwrap();
        assert!(session.needs_refresh());
        assert_eq!(receipt.affected_labels, vec![Label::Lesion.value()]);

        // The synchronous path sees the surface immediately.
        let mesh = session.extract_mesh(Label::Lesion);
        assert!(mesh.is_closed());
    }

    #[test]
    fn undo_restores_mask_through_session() {
        let mut session = session();
        session
            .set_tool(ToolMode::Brush { radius: 1.0 })
            .unwrap();
        session
            .begin_stroke(Orientation::Axial, 2, 3.0, 3.0)
            .unwrap();
        session.end_stroke().unwrap();
        assert!(session.labels().get(2, 3, 3).unwrap() != 0);

        session.undo().unwrap();
        assert_eq!(session.labels().get(2, 3, 3), Some(0));
        assert!(matches!(session.undo(), Err(LabelError::NoHistory)));
    }

    #[test]
    fn cursor_moves_mark_views_dirty() {
        let mut session = session();
        session.views();
        session.set_cursor_from_slice(Orientation::Coronal, 8, 2.0, 3.0);
        assert!(session.needs_refresh());
        assert_eq!(session.slice_indices(), (3, 8, 2));
    }
}
