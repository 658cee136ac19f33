use crate::label::LabelVolume;
use crate::mesh::Mesh;

use bytemuck::{Pod, Zeroable};
use log::info;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mask memory is not contiguous")]
    NonContiguousMask,

    #[error("Refusing to export an empty mesh")]
    EmptyMesh,
}

/// NIfTI-1 file header, 348 bytes, little-endian on-disk.
///
/// Field layout follows the nifti1.h reference; all fields sit on their
/// natural alignment so the struct has no padding and can be written as one
/// `Pod` blob.
#[repr(C)]
#[derive(Clone, Copy, Zeroable, Pod)]
struct Nifti1Header {
    sizeof_hdr: i32,
    data_type: [u8; 10],
    db_name: [u8; 18],
    extents: i32,
    session_error: i16,
    regular: u8,
    dim_info: u8,
    dim: [i16; 8],
    intent_p1: f32,
    intent_p2: f32,
    intent_p3: f32,
    intent_code: i16,
    datatype: i16,
    bitpix: i16,
    slice_start: i16,
    pixdim: [f32; 8],
    vox_offset: f32,
    scl_slope: f32,
    scl_inter: f32,
    slice_end: i16,
    slice_code: u8,
    xyzt_units: u8,
    cal_max: f32,
    cal_min: f32,
    slice_duration: f32,
    toffset: f32,
    glmax: i32,
    glmin: i32,
    descrip: [u8; 80],
    aux_file: [u8; 24],
    qform_code: i16,
    sform_code: i16,
    quatern_b: f32,
    quatern_c: f32,
    quatern_d: f32,
    qoffset_x: f32,
    qoffset_y: f32,
    qoffset_z: f32,
    srow_x: [f32; 4],
    srow_y: [f32; 4],
    srow_z: [f32; 4],
    intent_name: [u8; 16],
    magic: [u8; 4],
}

const DT_UINT8: i16 = 2;
const NIFTI_UNITS_MM: u8 = 2;
const NIFTI_XFORM_SCANNER_ANAT: i16 = 1;

/// Serialize the label mask as a single-file NIfTI-1 volume (`.nii`).
///
/// Label values are written verbatim as unsigned bytes; spacing, origin and
/// orientation are embedded through pixdim and the sform affine. The mask's
/// (z, y, x) memory layout already matches NIfTI's x-fastest data order.
pub fn write_mask_nifti(labels: &LabelVolume, path: &Path) -> Result<(), ExportError> {
    let (d, h, w) = labels.dim();
    let geometry = labels.geometry();
    let spacing = geometry.spacing();
    let origin = geometry.origin();
    let dir = geometry.direction();

    let mut header = Nifti1Header::zeroed();
    header.sizeof_hdr = 348;
    header.regular = b'r';
    header.dim = [3, w as i16, h as i16, d as i16, 1, 1, 1, 1];
    header.datatype = DT_UINT8;
    header.bitpix = 8;
    header.pixdim = [1.0, spacing.0, spacing.1, spacing.2, 0.0, 0.0, 0.0, 0.0];
    header.vox_offset = 352.0;
    header.scl_slope = 1.0;
    header.xyzt_units = NIFTI_UNITS_MM;
    header.sform_code = NIFTI_XFORM_SCANNER_ANAT;
    header.srow_x = [
        dir[0][0] * spacing.0,
        dir[0][1] * spacing.1,
        dir[0][2] * spacing.2,
        origin.0,
    ];
    header.srow_y = [
        dir[1][0] * spacing.0,
        dir[1][1] * spacing.1,
        dir[1][2] * spacing.2,
        origin.1,
    ];
    header.srow_z = [
        dir[2][0] * spacing.0,
        dir[2][1] * spacing.1,
        dir[2][2] * spacing.2,
        origin.2,
    ];
    let descrip = b"dicom-annotate label mask";
    header.descrip[..descrip.len()].copy_from_slice(descrip);
    header.magic = *b"n+1\0";

    let data = labels
        .data()
        .as_slice()
        .ok_or(ExportError::NonContiguousMask)?;

    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(bytemuck::bytes_of(&header))?;
    // Four-byte extension flag, all zero: no header extensions.
    writer.write_all(&[0u8; 4])?;
    writer.write_all(data)?;
    writer.flush()?;
    info!("wrote label mask to {}", path.display());
    Ok(())
}

/// Save a mesh as ASCII PLY with triangle faces.
pub fn write_mesh_ply(mesh: &Mesh, path: &Path) -> Result<(), ExportError> {
    if mesh.is_empty() {
        return Err(ExportError::EmptyMesh);
    }
    let mut file = BufWriter::new(File::create(path)?);

    writeln!(file, "ply")?;
    writeln!(file, "format ascii 1.0")?;
    writeln!(file, "element vertex {}", mesh.vertex_count())?;
    writeln!(file, "property float x")?;
    writeln!(file, "property float y")?;
    writeln!(file, "property float z")?;
    writeln!(file, "element face {}", mesh.triangle_count())?;
    writeln!(file, "property list uchar uint vertex_indices")?;
    writeln!(file, "end_header")?;

    for v in mesh.vertices() {
        writeln!(file, "{} {} {}", v[0], v[1], v[2])?;
    }
    for t in mesh.triangles() {
        writeln!(file, "3 {} {} {}", t[0], t[1], t[2])?;
    }
    file.flush()?;
    info!("wrote mesh to {}", path.display());
    Ok(())
}

/// Save a mesh as Wavefront OBJ (1-based face indices).
pub fn write_mesh_obj(mesh: &Mesh, path: &Path) -> Result<(), ExportError> {
    if mesh.is_empty() {
        return Err(ExportError::EmptyMesh);
    }
    let mut file = BufWriter::new(File::create(path)?);

    for v in mesh.vertices() {
        writeln!(file, "v {} {} {}", v[0], v[1], v[2])?;
    }
    for t in mesh.triangles() {
        writeln!(file, "f {} {} {}", t[0] + 1, t[1] + 1, t[2] + 1)?;
    }
    file.flush()?;
    info!("wrote mesh to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use crate::label::{LabelConfig, LabelVolume};
    use crate::mesh::MeshExtractor;
    use crate::volume::Volume;
    use ndarray::Array3;

    #[test]
    fn nifti_header_is_exactly_348_bytes() {
        assert_eq!(std::mem::size_of::<Nifti1Header>(), 348);
    }

    fn mask() -> LabelVolume {
        let volume = Volume::new(
            Array3::zeros((2, 3, 4)),
            Geometry::new(
                (0.7, 0.8, 1.25),
                (-100.0, -90.0, 40.0),
                [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            )
            .unwrap(),
        );
        let mut labels = LabelVolume::create(&volume, LabelConfig::default());
        labels.set_region(&[(0, 0, 0), (1, 2, 3)], 2).unwrap();
        labels.set_region(&[(0, 1, 1)], 1).unwrap();
        labels
    }

    #[test]
    fn nifti_export_preserves_labels_and_geometry() {
        let labels = mask();
        let dir = std::env::temp_dir().join("dicom_annotate_nifti_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("mask.nii");
        write_mask_nifti(&labels, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 352 + 2 * 3 * 4);
        // sizeof_hdr, dim, datatype
        assert_eq!(&bytes[0..4], &348i32.to_le_bytes());
        assert_eq!(&bytes[40..42], &3i16.to_le_bytes());
        assert_eq!(&bytes[42..44], &4i16.to_le_bytes()); // nx = w
        assert_eq!(&bytes[46..48], &2i16.to_le_bytes()); // nz = d
        assert_eq!(&bytes[70..72], &DT_UINT8.to_le_bytes());
        assert_eq!(&bytes[344..348], b"n+1\0");
        // pixdim[1] = x spacing
        assert_eq!(&bytes[80..84], &0.7f32.to_le_bytes());

        // Data payload: x fastest, labels verbatim.
        let data = &bytes[352..];
        assert_eq!(data[0], 2); // (0,0,0)
        assert_eq!(data[4 + 1], 1); // (0,1,1)
        assert_eq!(data[data.len() - 1], 2); // (1,2,3)
        assert!(data.iter().all(|&b| b <= 2));
    }

    #[test]
    fn ply_export_lists_all_faces() {
        let labels = mask();
        let mesh = MeshExtractor::extract(&labels, 1);
        let dir = std::env::temp_dir().join("dicom_annotate_ply_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("label1.ply");
        write_mesh_ply(&mesh, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("ply\nformat ascii 1.0\n"));
        assert!(text.contains(&format!("element vertex {}", mesh.vertex_count())));
        assert!(text.contains(&format!("element face {}", mesh.triangle_count())));
        assert_eq!(
            text.lines().filter(|l| l.starts_with("3 ")).count(),
            mesh.triangle_count()
        );
    }

    #[test]
    fn obj_faces_are_one_based() {
        let labels = mask();
        let mesh = MeshExtractor::extract(&labels, 2);
        let dir = std::env::temp_dir().join("dicom_annotate_obj_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("label2.obj");
        write_mesh_obj(&mesh, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        for line in text.lines().filter(|l| l.starts_with("f ")) {
            for index in line.split_whitespace().skip(1) {
                assert!(index.parse::<usize>().unwrap() >= 1);
            }
        }
    }

    #[test]
    fn empty_mesh_is_rejected() {
        let mesh = Mesh::new();
        let path = std::env::temp_dir().join("never_written.ply");
        assert!(matches!(
            write_mesh_ply(&mesh, &path),
            Err(ExportError::EmptyMesh)
        ));
    }
}
