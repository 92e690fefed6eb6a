//! Binary surface nets.
//!
//! Dual of marching cubes on a binary indicator grid: every cell (2x2x2 block of
//! voxel centers) whose corners disagree gets one vertex at the centroid of its
//! crossing-edge midpoints, and every voxel edge that crosses the boundary emits
//! one quad joining the four cells around it. Quads are wound so their normal
//! points from the inside voxel to the outside voxel.

use crate::error::Result;
use crate::pipeline::cancel::CancellationToken;
use crate::volume::LabelMask;

const NO_VERTEX: u32 = u32::MAX;

/// Raw isosurface in grid coordinates (voxel centers at integer positions).
pub struct GridMesh {
    pub vertices: Vec<[f64; 3]>,
    pub triangles: Vec<[u32; 3]>,
}

pub fn surface_nets(mask: &LabelMask, cancel: &CancellationToken) -> Result<GridMesh> {
    let [nx, ny, nz] = mask.dims;
    let mut vertices: Vec<[f64; 3]> = Vec::new();
    let mut triangles: Vec<[u32; 3]> = Vec::new();
    if nx < 2 || ny < 2 || nz < 2 {
        return Ok(GridMesh {
            vertices,
            triangles,
        });
    }

    let (cx_n, cy_n, cz_n) = (nx - 1, ny - 1, nz - 1);
    let cell_index = |x: usize, y: usize, z: usize| x + cx_n * (y + cy_n * z);
    let mut cell_vertex = vec![NO_VERTEX; cx_n * cy_n * cz_n];

    for cz in 0..cz_n {
        cancel.check("surface vertex placement")?;
        for cy in 0..cy_n {
            for cx in 0..cx_n {
                let mut corners = [false; 8];
                for (c, corner) in corners.iter_mut().enumerate() {
                    *corner = mask.get(cx + (c & 1), cy + ((c >> 1) & 1), cz + ((c >> 2) & 1));
                }
                if corners.iter().all(|&c| c) || corners.iter().all(|&c| !c) {
                    continue;
                }

                let mut sum = [0.0f64; 3];
                let mut crossings = 0usize;
                for c in 0..8usize {
                    for bit in 0..3 {
                        let other = c | (1 << bit);
                        if other == c || corners[c] == corners[other] {
                            continue;
                        }
                        let a = corner_offset(c);
                        let b = corner_offset(other);
                        for axis in 0..3 {
                            sum[axis] += 0.5 * (a[axis] + b[axis]);
                        }
                        crossings += 1;
                    }
                }
                let inv = 1.0 / crossings as f64;
                cell_vertex[cell_index(cx, cy, cz)] = vertices.len() as u32;
                vertices.push([
                    cx as f64 + sum[0] * inv,
                    cy as f64 + sum[1] * inv,
                    cz as f64 + sum[2] * inv,
                ]);
            }
        }
    }

    for z in 0..nz {
        cancel.check("surface face emission")?;
        for y in 0..ny {
            for x in 0..nx {
                let inside = mask.get(x, y, z);
                // edge along +x
                if x + 1 < nx && inside != mask.get(x + 1, y, z) && y > 0 && z > 0 {
                    let quad = [
                        cell_index(x, y - 1, z - 1),
                        cell_index(x, y, z - 1),
                        cell_index(x, y, z),
                        cell_index(x, y - 1, z),
                    ];
                    push_quad(&cell_vertex, quad, inside, &mut triangles);
                }
                // edge along +y
                if y + 1 < ny && inside != mask.get(x, y + 1, z) && x > 0 && z > 0 {
                    let quad = [
                        cell_index(x - 1, y, z - 1),
                        cell_index(x - 1, y, z),
                        cell_index(x, y, z),
                        cell_index(x, y, z - 1),
                    ];
                    push_quad(&cell_vertex, quad, inside, &mut triangles);
                }
                // edge along +z
                if z + 1 < nz && inside != mask.get(x, y, z + 1) && x > 0 && y > 0 {
                    let quad = [
                        cell_index(x - 1, y - 1, z),
                        cell_index(x, y - 1, z),
                        cell_index(x, y, z),
                        cell_index(x - 1, y, z),
                    ];
                    push_quad(&cell_vertex, quad, inside, &mut triangles);
                }
            }
        }
    }

    Ok(GridMesh {
        vertices,
        triangles,
    })
}

#[inline]
fn corner_offset(c: usize) -> [f64; 3] {
    [
        (c & 1) as f64,
        ((c >> 1) & 1) as f64,
        ((c >> 2) & 1) as f64,
    ]
}

/// `quad` is counter-clockwise around the positive edge axis.
fn push_quad(cell_vertex: &[u32], quad: [usize; 4], lower_inside: bool, triangles: &mut Vec<[u32; 3]>) {
    let v = quad.map(|c| cell_vertex[c]);
    if v.iter().any(|&i| i == NO_VERTEX) {
        return;
    }
    if lower_inside {
        triangles.push([v[0], v[1], v[2]]);
        triangles.push([v[0], v[2], v[3]]);
    } else {
        triangles.push([v[0], v[2], v[1]]);
        triangles.push([v[0], v[3], v[2]]);
    }
}
