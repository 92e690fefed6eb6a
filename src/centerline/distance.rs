use rayon::prelude::*;

use super::voxelize::OccupancyGrid;

/// Exact Euclidean distance (mm) from every solid voxel center to the nearest
/// empty voxel center; zero outside the solid.
///
/// Separable lower-envelope transform (Felzenszwalb & Huttenlocher) applied along
/// x, y and z in turn, each pass in physical units so anisotropic spacing is
/// exact.
pub fn distance_transform(grid: &OccupancyGrid) -> Vec<f64> {
    let [nx, ny, nz] = grid.dims;
    let mut sq: Vec<f64> = grid
        .data
        .iter()
        .map(|&inside| if inside { f64::INFINITY } else { 0.0 })
        .collect();

    // x lines are contiguous
    sq.par_chunks_mut(nx).for_each(|line| {
        let input = line.to_vec();
        squared_distance_1d(&input, grid.spacing.x, line);
    });

    // y lines stay inside one z slab
    sq.par_chunks_mut(nx * ny).for_each(|slab| {
        let mut input = vec![0.0; ny];
        let mut output = vec![0.0; ny];
        for x in 0..nx {
            for y in 0..ny {
                input[y] = slab[x + nx * y];
            }
            squared_distance_1d(&input, grid.spacing.y, &mut output);
            for y in 0..ny {
                slab[x + nx * y] = output[y];
            }
        }
    });

    // z lines are strided across slabs: compute per column, then scatter
    let plane = nx * ny;
    let columns: Vec<Vec<f64>> = (0..plane)
        .into_par_iter()
        .map(|column| {
            let input: Vec<f64> = (0..nz).map(|z| sq[column + plane * z]).collect();
            let mut output = vec![0.0; nz];
            squared_distance_1d(&input, grid.spacing.z, &mut output);
            output
        })
        .collect();
    for (column, values) in columns.into_iter().enumerate() {
        for (z, v) in values.into_iter().enumerate() {
            sq[column + plane * z] = v;
        }
    }

    sq.into_iter().map(f64::sqrt).collect()
}

/// 1D squared distance transform of sampled function `f` on a line with the
/// given sample spacing. Infinite samples are not parabola sites.
fn squared_distance_1d(f: &[f64], spacing: f64, out: &mut [f64]) {
    let n = f.len();
    let sites: Vec<usize> = (0..n).filter(|&q| f[q].is_finite()).collect();
    if sites.is_empty() {
        out.iter_mut().for_each(|v| *v = f64::INFINITY);
        return;
    }

    let pos = |q: usize| q as f64 * spacing;
    let intersect = |p: usize, q: usize| {
        ((f[q] + pos(q) * pos(q)) - (f[p] + pos(p) * pos(p))) / (2.0 * (pos(q) - pos(p)))
    };

    let mut v: Vec<usize> = Vec::with_capacity(sites.len());
    let mut z: Vec<f64> = Vec::with_capacity(sites.len() + 1);
    v.push(sites[0]);
    z.push(f64::NEG_INFINITY);
    for &q in &sites[1..] {
        let mut s = intersect(v[v.len() - 1], q);
        while v.len() > 1 && s <= z[z.len() - 1] {
            v.pop();
            z.pop();
            s = intersect(v[v.len() - 1], q);
        }
        v.push(q);
        z.push(s);
    }
    z.push(f64::INFINITY);

    let mut k = 0;
    for (q, o) in out.iter_mut().enumerate() {
        while z[k + 1] < pos(q) {
            k += 1;
        }
        let d = pos(q) - pos(v[k]);
        *o = d * d + f[v[k]];
    }
}
