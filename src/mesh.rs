use crate::geometry::Geometry;
use crate::label::{Bbox, LabelVolume};

use ndarray::Array3;
use std::collections::HashMap;

/// A triangle mesh with vertex positions in physical millimetres.
///
/// Regenerated from the label mask, never mutated in place; the previous mesh
/// for a label is discarded whenever a newer extraction lands.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    vertices: Vec<[f32; 3]>,
    triangles: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertices(&self) -> &[[f32; 3]] {
        &self.vertices
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn add_vertex(&mut self, position: [f32; 3]) -> u32 {
        let index = self.vertices.len() as u32;
        self.vertices.push(position);
        index
    }

    pub fn add_triangle(&mut self, a: u32, b: u32, c: u32) {
        self.triangles.push([a, b, c]);
    }

    /// True when every undirected edge is shared by exactly two triangles
    /// with opposite directions, i.e. the surface is watertight.
    pub fn is_closed(&self) -> bool {
        let mut directed: HashMap<(u32, u32), i32> = HashMap::new();
        for t in &self.triangles {
            for (a, b) in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
                let key = if a < b { (a, b) } else { (b, a) };
                let sign = if a < b { 1 } else { -1 };
                *directed.entry(key).or_insert(0) += sign;
            }
        }
        !self.triangles.is_empty() && directed.values().all(|&count| count == 0)
    }

    /// Signed enclosed volume in mm^3 via the divergence theorem; positive
    /// for outward-wound surfaces.
    pub fn enclosed_volume(&self) -> f64 {
        let mut total = 0.0f64;
        for t in &self.triangles {
            let a = self.vertices[t[0] as usize].map(f64::from);
            let b = self.vertices[t[1] as usize].map(f64::from);
            let c = self.vertices[t[2] as usize].map(f64::from);
            let cross = [
                b[1] * c[2] - b[2] * c[1],
                b[2] * c[0] - b[0] * c[2],
                b[0] * c[1] - b[1] * c[0],
            ];
            total += a[0] * cross[0] + a[1] * cross[1] + a[2] * cross[2];
        }
        total / 6.0
    }
}

// Boundary faces of a voxel, as (neighbor offset, quad corners). Offsets are
// (dz, dy, dx); corners are half-voxel steps from the voxel center, ordered
// so the quad winds outward.
const FACES: [((i64, i64, i64), [(i64, i64, i64); 4]); 6] = [
    // +x
    (
        (0, 0, 1),
        [(-1, -1, 1), (-1, 1, 1), (1, 1, 1), (1, -1, 1)],
    ),
    // -x
    (
        (0, 0, -1),
        [(-1, -1, -1), (1, -1, -1), (1, 1, -1), (-1, 1, -1)],
    ),
    // +y
    (
        (0, 1, 0),
        [(-1, 1, -1), (1, 1, -1), (1, 1, 1), (-1, 1, 1)],
    ),
    // -y
    (
        (0, -1, 0),
        [(-1, -1, -1), (-1, -1, 1), (1, -1, 1), (1, -1, -1)],
    ),
    // +z
    (
        (1, 0, 0),
        [(1, -1, -1), (1, -1, 1), (1, 1, 1), (1, 1, -1)],
    ),
    // -z
    (
        (-1, 0, 0),
        [(-1, -1, -1), (-1, 1, -1), (-1, 1, 1), (-1, -1, 1)],
    ),
];

/// Extracts the iso-surface of `mask == target` as a watertight triangle
/// mesh.
///
/// The mask is binary, so every surface crossing sits on a voxel boundary;
/// extraction emits the boundary faces between target and non-target voxels
/// with vertices on the half-voxel lattice, converted to physical space.
pub struct MeshExtractor;

impl MeshExtractor {
    /// Extract the surface of one label, scanning only the label's tracked
    /// bounding box.
    pub fn extract(labels: &LabelVolume, target: u8) -> Mesh {
        let Some(bbox) = labels.label_bounds(target) else {
            return Mesh::new();
        };
        let region = labels.region(bbox);
        Self::extract_region(&region, bbox.min, labels.geometry(), target)
    }

    /// Extract from an owned sub-region copy, positioned at `offset` within
    /// the full volume. The region must contain every voxel of the target
    /// label; anything outside it is treated as background.
    pub fn extract_region(
        region: &Array3<u8>,
        offset: [usize; 3],
        geometry: &Geometry,
        target: u8,
    ) -> Mesh {
        let (d, h, w) = region.dim();
        let mut mesh = Mesh::new();
        // Vertex dedup on the doubled (half-step) lattice.
        let mut vertex_ids: HashMap<(i64, i64, i64), u32> = HashMap::new();

        for ((z, y, x), &value) in region.indexed_iter() {
            if value != target {
                continue;
            }
            for ((dz, dy, dx), corners) in &FACES {
                let nz = z as i64 + dz;
                let ny = y as i64 + dy;
                let nx = x as i64 + dx;
                let neighbor_is_target = nz >= 0
                    && ny >= 0
                    && nx >= 0
                    && (nz as usize) < d
                    && (ny as usize) < h
                    && (nx as usize) < w
                    && region[[nz as usize, ny as usize, nx as usize]] == target;
                if neighbor_is_target {
                    continue;
                }

                let gz = 2 * (z + offset[0]) as i64;
                let gy = 2 * (y + offset[1]) as i64;
                let gx = 2 * (x + offset[2]) as i64;
                let mut quad = [0u32; 4];
                for (i, (cz, cy, cx)) in corners.iter().enumerate() {
                    let key = (gz + cz, gy + cy, gx + cx);
                    quad[i] = *vertex_ids.entry(key).or_insert_with(|| {
                        let p = geometry.index_to_physical(
                            key.0 as f32 / 2.0,
                            key.1 as f32 / 2.0,
                            key.2 as f32 / 2.0,
                        );
                        mesh.add_vertex([p.0, p.1, p.2])
                    });
                }
                mesh.add_triangle(quad[0], quad[1], quad[2]);
                mesh.add_triangle(quad[0], quad[2], quad[3]);
            }
        }
        mesh
    }
}
