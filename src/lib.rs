//! # dicom-annotate
//!
//! This crate is the engine of a desktop medical-imaging annotation tool:
//! it owns the volume data, the label mask and the cursor state, and leaves
//! widgets, menus and theming to a GUI layer.
//!
//! A DICOM series is loaded once into an immutable Hounsfield-unit volume
//! ([`volume::Volume`]) with its physical geometry. On top of it a
//! [`session::Session`] ties together:
//!  - a mutable label mask ([`label::LabelVolume`]) with atomic edit batches
//!    and bounded undo,
//!  - brush, eraser and magic-wand tools ([`annotation::AnnotationEngine`]),
//!  - the shared 3D cursor and window/level state ([`cursor::CursorModel`]),
//!    kept consistent across the three MPR views:
//!     - Axial
//!     - Coronal
//!     - Sagittal
//!  - composited slice images with label overlay ([`view::ViewCoordinator`]),
//!  - background surface extraction ([`worker::MeshWorker`]) with
//!    latest-wins scheduling, and
//!  - NIfTI mask export and PLY/OBJ mesh export ([`export`]).
//!
//! Contributions are highly welcome!
//!
//! # Examples
//!
//! ## Annotating a loaded series
//!
//! Read all DICOM files from the dicom/ directory, paint one lesion stroke
//! on the axial center slice and export the result.
//!
//! ```no_run
//! # use dicom_annotate::enums::{Label, Orientation, SortBy, ToolMode};
//! # use dicom_annotate::session::{Session, SessionConfig};
//! # use std::path::Path;
//! let mut session = Session::open_directory("dicom", SortBy::default(), SessionConfig::default())
//!     .expect("should have loaded files from directory");
//! session.set_tool(ToolMode::Brush { radius: 4.0 }).unwrap();
//! session.set_active_label(Label::Lesion);
//!
//! let (axial, _, _) = session.slice_indices();
//! session.begin_stroke(Orientation::Axial, axial, 200.0, 240.0).unwrap();
//! session.extend_stroke(220.0, 250.0).unwrap();
//! session.end_stroke().unwrap();
//!
//! session.export_mask(Path::new("mask.nii")).unwrap();
//! session
//!     .export_mesh_ply(Label::Lesion, Path::new("lesion.ply"))
//!     .unwrap();
//! ```

pub mod annotation;
pub mod cursor;
pub mod enums;
pub mod export;
pub mod geometry;
pub mod label;
pub mod mesh;
pub mod session;
pub mod view;
pub mod volume;
pub mod volume_loader;
pub mod worker;
