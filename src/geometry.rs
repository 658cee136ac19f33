use thiserror::Error;

/// Tolerance accepted when checking direction orthonormality.
const ORTHONORMAL_EPSILON: f32 = 1e-3;

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("Non-positive spacing: ({0}, {1}, {2})")]
    NonPositiveSpacing(f32, f32, f32),

    #[error("Direction matrix is not orthonormal")]
    NotOrthonormal,

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },
}

/// Physical placement of a voxel grid.
///
/// `spacing` and `origin` are in millimetres and ordered (x, y, z), matching
/// the DICOM/ITK convention even though array data is indexed (z, y, x).
/// `direction[r][c]` is the physical component `r` of index axis `c`, so the
/// columns are the direction cosines of the x, y and z index axes. The matrix
/// must be orthonormal; construction rejects anything else.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    spacing: (f32, f32, f32),
    origin: (f32, f32, f32),
    direction: [[f32; 3]; 3],
}

impl Geometry {
    pub fn new(
        spacing: (f32, f32, f32),
        origin: (f32, f32, f32),
        direction: [[f32; 3]; 3],
    ) -> Result<Self, GeometryError> {
        if spacing.0 <= 0.0 || spacing.1 <= 0.0 || spacing.2 <= 0.0 {
            return Err(GeometryError::NonPositiveSpacing(
                spacing.0, spacing.1, spacing.2,
            ));
        }
        if !Self::is_orthonormal(&direction) {
            return Err(GeometryError::NotOrthonormal);
        }
        Ok(Self {
            spacing,
            origin,
            direction,
        })
    }

    /// Axis-aligned geometry at the given spacing, origin at zero.
    pub fn axis_aligned(spacing: (f32, f32, f32)) -> Result<Self, GeometryError> {
        Self::new(
            spacing,
            (0.0, 0.0, 0.0),
            [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        )
    }

    pub fn spacing(&self) -> (f32, f32, f32) {
        self.spacing
    }

    pub fn origin(&self) -> (f32, f32, f32) {
        self.origin
    }

    pub fn direction(&self) -> &[[f32; 3]; 3] {
        &self.direction
    }

    /// Map a continuous voxel index (z, y, x) to a physical point (x, y, z).
    pub fn index_to_physical(&self, z: f32, y: f32, x: f32) -> (f32, f32, f32) {
        let sx = x * self.spacing.0;
        let sy = y * self.spacing.1;
        let sz = z * self.spacing.2;
        let d = &self.direction;
        (
            self.origin.0 + d[0][0] * sx + d[0][1] * sy + d[0][2] * sz,
            self.origin.1 + d[1][0] * sx + d[1][1] * sy + d[1][2] * sz,
            self.origin.2 + d[2][0] * sx + d[2][1] * sy + d[2][2] * sz,
        )
    }

    /// Map a physical point (x, y, z) back to a continuous voxel index
    /// (z, y, x). Inverse of [`Geometry::index_to_physical`]; the direction
    /// matrix is orthonormal so its transpose is its inverse.
    pub fn physical_to_index(&self, point: (f32, f32, f32)) -> (f32, f32, f32) {
        let px = point.0 - self.origin.0;
        let py = point.1 - self.origin.1;
        let pz = point.2 - self.origin.2;
        let d = &self.direction;
        let x = (d[0][0] * px + d[1][0] * py + d[2][0] * pz) / self.spacing.0;
        let y = (d[0][1] * px + d[1][1] * py + d[2][1] * pz) / self.spacing.1;
        let z = (d[0][2] * px + d[1][2] * py + d[2][2] * pz) / self.spacing.2;
        (z, y, x)
    }

    fn is_orthonormal(direction: &[[f32; 3]; 3]) -> bool {
        for a in 0..3 {
            for b in 0..3 {
                let dot = direction[0][a] * direction[0][b]
                    + direction[1][a] * direction[1][b]
                    + direction[2][a] * direction[2][b];
                let expected = if a == b { 1.0 } else { 0.0 };
                if (dot - expected).abs() > ORTHONORMAL_EPSILON {
                    return false;
                }
            }
        }
        true
    }
}
