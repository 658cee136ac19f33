use crate::enums::SortBy;
use crate::geometry::{Geometry, GeometryError};
use crate::volume::Volume;

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder},
};
use dicom_dictionary_std::tags;
use log::{info, warn};
use ndarray::{Array2, Array3, s};
use std::{fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Missing spacing information")]
    MissingSpacing,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),
}

/// Patient and acquisition metadata read from the series, for the info
/// panel. Absent tags are reported as "-".
#[derive(Debug, Clone)]
pub struct PatientInfo {
    pub name: String,
    pub patient_id: String,
    pub study_date: String,
    pub modality: String,
    pub slice_thickness: String,
    pub kvp: String,
    pub tube_current: String,
}

impl Default for PatientInfo {
    fn default() -> Self {
        let dash = || "-".to_string();
        Self {
            name: dash(),
            patient_id: dash(),
            study_date: dash(),
            modality: dash(),
            slice_thickness: dash(),
            kvp: dash(),
            tube_current: dash(),
        }
    }
}

/// A loaded series: the Hounsfield-unit volume plus its metadata.
pub struct DicomSeries {
    pub volume: Volume,
    pub patient: PatientInfo,
}

// Per-slice decode result carried through sorting.
struct SliceRecord {
    order: Option<f32>,
    image: Array2<f32>,
    position: Option<[f32; 3]>,
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume from DICOM objects
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - Slice of DICOM file objects
    /// * `sort_by` - Method to sort the slices
    ///
    /// # Errors
    ///
    /// Returns error if no valid images are found, dimensions are
    /// inconsistent, or the series carries no usable geometry
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<DicomSeries, VolumeLoaderError> {
        let mut records: Vec<_> = dicom_objects
            .iter()
            .filter_map(|dicom_object| Self::extract_record(dicom_object, &sort_by))
            .collect();

        if records.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }
        if records.len() < dicom_objects.len() {
            warn!(
                "skipped {} undecodable DICOM objects",
                dicom_objects.len() - records.len()
            );
        }

        Self::sort_records(&mut records, sort_by);
        Self::validate_dimensions(&records)?;

        let volume_array = Self::build_volume_array(&records);
        let geometry = Self::build_geometry(dicom_objects, &records)?;
        let patient = Self::extract_patient_info(&dicom_objects[0]);

        info!(
            "loaded DICOM series: {} slices of {:?}",
            records.len(),
            records[0].image.dim()
        );
        Ok(DicomSeries {
            volume: Volume::new(volume_array, geometry),
            patient,
        })
    }

    /// Load a volume from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
    ) -> Result<DicomSeries, VolumeLoaderError> {
        let objects: Result<Vec<_>, _> =
            paths.iter().map(|path| open_file(path.as_ref())).collect();

        Self::load_from_dicom_objects(&objects?, sort_by)
    }

    /// Load a volume from a directory containing .dcm files
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<DicomSeries, VolumeLoaderError> {
        let paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::load_from_file_paths(&paths, sort_by)
    }

    fn extract_record(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
    ) -> Option<SliceRecord> {
        let order = Self::get_sort_order(dicom_object, sort_by)?;
        let image = Self::decode_image(dicom_object)?;
        Some(SliceRecord {
            order,
            image,
            position: Self::get_position(dicom_object),
        })
    }

    fn get_sort_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
    ) -> Option<Option<f32>> {
        match sort_by {
            SortBy::ImagePositionPatient => {
                let pos = dicom_object
                    .element(tags::IMAGE_POSITION_PATIENT)
                    .ok()?
                    .to_multi_float32()
                    .ok()?;
                Some(pos.get(2).copied())
            }
            SortBy::TablePosition => {
                let pos = dicom_object
                    .element(tags::TABLE_POSITION)
                    .ok()?
                    .to_float32()
                    .ok();
                Some(pos)
            }
            SortBy::InstanceNumber => {
                let num = dicom_object
                    .element(tags::INSTANCE_NUMBER)
                    .ok()?
                    .to_int::<i32>()
                    .ok()
                    .map(|n| n as f32);
                Some(num)
            }
            SortBy::None => Some(Some(0.0)),
        }
    }

    /// Decode one slice to Hounsfield units via the modality LUT.
    fn decode_image(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Array2<f32>> {
        let pixel_data = dicom_object.decode_pixel_data().ok()?;
        let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::Default);
        pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .ok()
            .map(|arr| arr.slice_move(s![0, .., .., 0]))
    }

    fn get_position(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<[f32; 3]> {
        let pos = dicom_object
            .element(tags::IMAGE_POSITION_PATIENT)
            .ok()?
            .to_multi_float32()
            .ok()?;
        Some([*pos.first()?, *pos.get(1)?, *pos.get(2)?])
    }

    fn sort_records(records: &mut [SliceRecord], sort_by: SortBy) {
        if !matches!(sort_by, SortBy::None) {
            records.sort_by(|a, b| {
                a.order
                    .partial_cmp(&b.order)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        if matches!(sort_by, SortBy::ImagePositionPatient) {
            records.reverse();
        }
    }

    fn validate_dimensions(records: &[SliceRecord]) -> Result<(), VolumeLoaderError> {
        let first_dim = records[0].image.dim();
        if records.iter().any(|r| r.image.dim() != first_dim) {
            return Err(VolumeLoaderError::InconsistentDimensions);
        }
        Ok(())
    }

    fn build_volume_array(records: &[SliceRecord]) -> Array3<f32> {
        let (height, width) = records[0].image.dim();
        let depth = records.len();
        let mut volume = Array3::<f32>::zeros((depth, height, width));

        for (i, record) in records.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(&record.image);
        }

        volume
    }

    /// Assemble geometry from the series tags.
    ///
    /// Pixel spacing is mandatory; the inter-slice distance comes from the
    /// positions of consecutive sorted slices, falling back to
    /// SliceThickness. A missing orientation tag degrades to the identity
    /// direction.
    fn build_geometry(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        records: &[SliceRecord],
    ) -> Result<Geometry, VolumeLoaderError> {
        // PixelSpacing is (row, column) spacing, i.e. (y, x).
        let pixel_spacing = dicom_objects
            .iter()
            .find_map(|o| {
                let spacing = o.element(tags::PIXEL_SPACING).ok()?.to_multi_float32().ok()?;
                Some((*spacing.first()?, *spacing.get(1)?))
            })
            .ok_or(VolumeLoaderError::MissingSpacing)?;

        let slice_spacing = Self::slice_spacing(dicom_objects, records)
            .ok_or(VolumeLoaderError::MissingSpacing)?;

        let origin = records
            .iter()
            .find_map(|r| r.position)
            .map(|p| (p[0], p[1], p[2]))
            .unwrap_or((0.0, 0.0, 0.0));

        let direction = Self::direction_cosines(dicom_objects).unwrap_or_else(|| {
            warn!("missing ImageOrientationPatient, assuming identity");
            [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
        });

        Ok(Geometry::new(
            (pixel_spacing.1, pixel_spacing.0, slice_spacing),
            origin,
            direction,
        )?)
    }

    fn slice_spacing(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        records: &[SliceRecord],
    ) -> Option<f32> {
        let mut positions = records.iter().filter_map(|r| r.position);
        if let (Some(a), Some(b)) = (positions.next(), positions.next()) {
            let delta = ((b[0] - a[0]).powi(2) + (b[1] - a[1]).powi(2) + (b[2] - a[2]).powi(2))
                .sqrt();
            if delta > 0.0 {
                return Some(delta);
            }
        }
        dicom_objects.iter().find_map(|o| {
            o.element(tags::SLICE_THICKNESS)
                .ok()?
                .to_float32()
                .ok()
                .filter(|&t| t > 0.0)
        })
    }

    /// Direction columns (x, y, z) from ImageOrientationPatient's row and
    /// column cosines; the slice axis is their cross product.
    fn direction_cosines(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
    ) -> Option<[[f32; 3]; 3]> {
        let iop = dicom_objects.iter().find_map(|o| {
            o.element(tags::IMAGE_ORIENTATION_PATIENT)
                .ok()?
                .to_multi_float32()
                .ok()
                .filter(|v| v.len() >= 6)
        })?;
        let row = [iop[0], iop[1], iop[2]];
        let col = [iop[3], iop[4], iop[5]];
        let normal = [
            row[1] * col[2] - row[2] * col[1],
            row[2] * col[0] - row[0] * col[2],
            row[0] * col[1] - row[1] * col[0],
        ];
        Some([
            [row[0], col[0], normal[0]],
            [row[1], col[1], normal[1]],
            [row[2], col[2], normal[2]],
        ])
    }

    fn extract_patient_info(dicom_object: &FileDicomObject<InMemDicomObject>) -> PatientInfo {
        let text = |tag| -> Option<String> {
            dicom_object
                .element(tag)
                .ok()?
                .to_str()
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let defaults = PatientInfo::default();
        PatientInfo {
            name: text(tags::PATIENT_NAME).unwrap_or(defaults.name),
            patient_id: text(tags::PATIENT_ID).unwrap_or(defaults.patient_id),
            study_date: text(tags::STUDY_DATE).unwrap_or(defaults.study_date),
            modality: text(tags::MODALITY).unwrap_or(defaults.modality),
            slice_thickness: text(tags::SLICE_THICKNESS).unwrap_or(defaults.slice_thickness),
            kvp: text(tags::KVP).unwrap_or(defaults.kvp),
            tube_current: text(tags::X_RAY_TUBE_CURRENT).unwrap_or(defaults.tube_current),
        }
    }
}
