use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use crate::error::Result;
use crate::pipeline::cancel::CancellationToken;
use crate::surface::Surface;

/// Solid occupancy on the lattice a surface was extracted from.
///
/// Always carries at least one empty layer around the solid.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyGrid {
    pub dims: [usize; 3],
    pub origin: Point3<f64>,
    pub spacing: Vector3<f64>,
    pub data: Vec<bool>,
}

impl OccupancyGrid {
    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        x + self.dims[0] * (y + self.dims[1] * z)
    }

    #[inline]
    pub fn coords(&self, i: usize) -> [usize; 3] {
        let [nx, ny, _] = self.dims;
        [i % nx, (i / nx) % ny, i / (nx * ny)]
    }

    pub fn center(&self, i: usize) -> Point3<f64> {
        let [x, y, z] = self.coords(i);
        Point3::new(
            self.origin.x + x as f64 * self.spacing.x,
            self.origin.y + y as f64 * self.spacing.y,
            self.origin.z + z as f64 * self.spacing.z,
        )
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }
}

/// Rasterizes the solid enclosed by `surface` by casting one ray per (x, y)
/// column along +z and filling between pairs of crossings.
///
/// Rays are nudged off the voxel centers by a small fraction of the spacing so
/// they never run exactly through mesh vertices or edges.
pub fn voxelize(surface: &Surface, cancel: &CancellationToken) -> Result<OccupancyGrid> {
    let spacing = surface.grid_spacing;
    let (lo, hi) = surface.bounding_box();
    let grid_lo = [
        ((lo.x - surface.grid_origin.x) / spacing.x).floor() as i64 - 1,
        ((lo.y - surface.grid_origin.y) / spacing.y).floor() as i64 - 1,
        ((lo.z - surface.grid_origin.z) / spacing.z).floor() as i64 - 1,
    ];
    let grid_hi = [
        ((hi.x - surface.grid_origin.x) / spacing.x).ceil() as i64 + 1,
        ((hi.y - surface.grid_origin.y) / spacing.y).ceil() as i64 + 1,
        ((hi.z - surface.grid_origin.z) / spacing.z).ceil() as i64 + 1,
    ];
    let dims = [
        (grid_hi[0] - grid_lo[0] + 1) as usize,
        (grid_hi[1] - grid_lo[1] + 1) as usize,
        (grid_hi[2] - grid_lo[2] + 1) as usize,
    ];
    let origin = Point3::new(
        surface.grid_origin.x + grid_lo[0] as f64 * spacing.x,
        surface.grid_origin.y + grid_lo[1] as f64 * spacing.y,
        surface.grid_origin.z + grid_lo[2] as f64 * spacing.z,
    );

    let ray_offset = (1.3e-4 * spacing.x, 2.9e-4 * spacing.y);
    let column_x = |x: usize| origin.x + x as f64 * spacing.x + ray_offset.0;
    let column_y = |y: usize| origin.y + y as f64 * spacing.y + ray_offset.1;

    // bin triangles by the columns their xy footprint covers
    let mut bins: Vec<Vec<u32>> = vec![Vec::new(); dims[0] * dims[1]];
    for (ti, t) in surface.triangles.iter().enumerate() {
        let p = t.map(|i| surface.vertices[i as usize]);
        let min_x = p.iter().map(|v| v.x).fold(f64::INFINITY, f64::min);
        let max_x = p.iter().map(|v| v.x).fold(f64::NEG_INFINITY, f64::max);
        let min_y = p.iter().map(|v| v.y).fold(f64::INFINITY, f64::min);
        let max_y = p.iter().map(|v| v.y).fold(f64::NEG_INFINITY, f64::max);
        let x0 = ((min_x - origin.x) / spacing.x).floor().max(0.0) as usize;
        let x1 = (((max_x - origin.x) / spacing.x).ceil() as usize).min(dims[0] - 1);
        let y0 = ((min_y - origin.y) / spacing.y).floor().max(0.0) as usize;
        let y1 = (((max_y - origin.y) / spacing.y).ceil() as usize).min(dims[1] - 1);
        for y in y0..=y1 {
            for x in x0..=x1 {
                bins[x + dims[0] * y].push(ti as u32);
            }
        }
    }
    cancel.check("voxelization")?;

    let columns: Vec<Vec<usize>> = bins
        .par_iter()
        .enumerate()
        .map(|(column, triangles)| {
            let (x, y) = (column % dims[0], column / dims[0]);
            let (rx, ry) = (column_x(x), column_y(y));
            let mut hits: Vec<f64> = triangles
                .iter()
                .filter_map(|&ti| {
                    let t = surface.triangles[ti as usize];
                    vertical_ray_hit(
                        rx,
                        ry,
                        &surface.vertices[t[0] as usize],
                        &surface.vertices[t[1] as usize],
                        &surface.vertices[t[2] as usize],
                    )
                })
                .collect();
            hits.sort_by(|a, b| a.total_cmp(b));

            let mut inside_z = Vec::new();
            for pair in hits.chunks_exact(2) {
                let z0 = ((pair[0] - origin.z) / spacing.z).ceil().max(0.0) as usize;
                let z1 = ((pair[1] - origin.z) / spacing.z).floor();
                if z1 < 0.0 {
                    continue;
                }
                let z1 = (z1 as usize).min(dims[2] - 1);
                inside_z.extend(z0..=z1);
            }
            inside_z
        })
        .collect();

    let mut data = vec![false; dims[0] * dims[1] * dims[2]];
    for (column, zs) in columns.into_iter().enumerate() {
        for z in zs {
            data[column + dims[0] * dims[1] * z] = true;
        }
    }

    Ok(OccupancyGrid {
        dims,
        origin,
        spacing,
        data,
    })
}

/// z of the intersection between the vertical line through (x, y) and the
/// triangle, if the line passes through its xy projection.
fn vertical_ray_hit(x: f64, y: f64, a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Option<f64> {
    let det = (b.y - c.y) * (a.x - c.x) + (c.x - b.x) * (a.y - c.y);
    if det.abs() < 1e-14 {
        return None;
    }
    let w0 = ((b.y - c.y) * (x - c.x) + (c.x - b.x) * (y - c.y)) / det;
    let w1 = ((c.y - a.y) * (x - c.x) + (a.x - c.x) * (y - c.y)) / det;
    let w2 = 1.0 - w0 - w1;
    if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
        return None;
    }
    Some(w0 * a.z + w1 * b.z + w2 * c.z)
}
