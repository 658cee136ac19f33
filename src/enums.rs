/// The three orthogonal medical viewing axes.
///
/// Volume data is stored as (depth, height, width) = (z, y, x); each
/// orientation fixes one of those indices and exposes the remaining two as a
/// 2D slice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [
        Orientation::Axial,
        Orientation::Coronal,
        Orientation::Sagittal,
    ];

    /// Length of the slice stack along this orientation for a volume of the
    /// given (depth, height, width).
    pub fn axis_len(&self, dim: (usize, usize, usize)) -> usize {
        match self {
            Orientation::Axial => dim.0,
            Orientation::Coronal => dim.1,
            Orientation::Sagittal => dim.2,
        }
    }
}

#[derive(Default)]
pub enum SortBy {
    #[default]
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    None,
}

/// Semantic label values stored in the mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Label {
    Background = 0,
    Airway = 1,
    Lesion = 2,
}

impl Label {
    pub fn value(&self) -> u8 {
        *self as u8
    }

    pub fn from_value(value: u8) -> Option<Label> {
        match value {
            0 => Some(Label::Background),
            1 => Some(Label::Airway),
            2 => Some(Label::Lesion),
            _ => None,
        }
    }
}

/// Active annotation tool, decoupled from any UI event source.
///
/// Radii are in voxel units and must be positive; the magic wand threshold is
/// the accepted intensity deviation from the seed voxel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ToolMode {
    Brush { radius: f32 },
    Eraser { radius: f32 },
    MagicWand { threshold: f32 },
}

/// Neighborhood used by magic-wand region growing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Connectivity {
    #[default]
    Six,
    TwentySix,
}

impl Connectivity {
    /// Neighbor offsets as (dz, dy, dx) triples.
    pub fn offsets(&self) -> &'static [(i64, i64, i64)] {
        const SIX: [(i64, i64, i64); 6] = [
            (-1, 0, 0),
            (1, 0, 0),
            (0, -1, 0),
            (0, 1, 0),
            (0, 0, -1),
            (0, 0, 1),
        ];
        const TWENTY_SIX: [(i64, i64, i64); 26] = {
            let mut out = [(0i64, 0i64, 0i64); 26];
            let mut i = 0;
            let mut dz = -1i64;
            while dz <= 1 {
                let mut dy = -1i64;
                while dy <= 1 {
                    let mut dx = -1i64;
                    while dx <= 1 {
                        if dz != 0 || dy != 0 || dx != 0 {
                            out[i] = (dz, dy, dx);
                            i += 1;
                        }
                        dx += 1;
                    }
                    dy += 1;
                }
                dz += 1;
            }
            out
        };
        match self {
            Connectivity::Six => &SIX,
            Connectivity::TwentySix => &TWENTY_SIX,
        }
    }
}
