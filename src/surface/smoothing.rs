use log::{debug, warn};
use nalgebra::{Point3, Vector3};

use super::bounding_box;
use crate::error::Result;
use crate::pipeline::cancel::CancellationToken;

/// Largest relative loss of bounding-box extent on any axis that smoothing may
/// cause before it is rolled back.
pub const BBOX_SHRINK_TOLERANCE: f64 = 0.05;

/// Pass-band parameter of the Taubin filter.
const PASS_BAND: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct SmoothingOutcome {
    pub iterations_applied: usize,
    /// Set when an iteration would have shrunk the bounding box past tolerance.
    pub stopped_early: bool,
}

/// Builds sorted, deduplicated vertex neighbourhoods from triangle edges.
pub fn vertex_neighbors(n_vertices: usize, triangles: &[[u32; 3]]) -> Vec<Vec<u32>> {
    let mut neighbors: Vec<Vec<u32>> = vec![Vec::new(); n_vertices];
    for &[a, b, c] in triangles {
        for (p, q) in [(a, b), (b, c), (c, a)] {
            neighbors[p as usize].push(q);
            neighbors[q as usize].push(p);
        }
    }
    for n in neighbors.iter_mut() {
        n.sort_unstable();
        n.dedup();
    }
    neighbors
}

/// Taubin lambda/mu smoothing, in place.
///
/// Each iteration is a shrinking Laplacian step with weight `strength` followed by
/// an inflating step with the matching negative weight. After every iteration the
/// bounding box is compared with the unsmoothed one; if any axis lost more than
/// `BBOX_SHRINK_TOLERANCE` of its extent the iteration is undone and smoothing
/// stops.
pub fn taubin_smooth(
    vertices: &mut [Point3<f64>],
    triangles: &[[u32; 3]],
    strength: f64,
    iterations: usize,
    cancel: &CancellationToken,
) -> Result<SmoothingOutcome> {
    let mut outcome = SmoothingOutcome {
        iterations_applied: 0,
        stopped_early: false,
    };
    if vertices.is_empty() || iterations == 0 {
        return Ok(outcome);
    }

    let neighbors = vertex_neighbors(vertices.len(), triangles);
    let lambda = strength;
    let mu = 1.0 / (PASS_BAND - 1.0 / lambda);
    let (lo, hi) = bounding_box(vertices);
    let original_extent = hi - lo;

    let mut previous = vertices.to_vec();
    let mut scratch = vertices.to_vec();
    for iteration in 0..iterations {
        cancel.check("surface smoothing")?;
        laplacian_step(vertices, &mut scratch, &neighbors, lambda);
        laplacian_step(vertices, &mut scratch, &neighbors, mu);

        let (lo, hi) = bounding_box(vertices);
        let extent = hi - lo;
        if shrank_too_much(&original_extent, &extent) {
            vertices.copy_from_slice(&previous);
            warn!(
                "smoothing stopped after {} of {} iterations to preserve the bounding box",
                iteration, iterations
            );
            outcome.stopped_early = true;
            return Ok(outcome);
        }
        previous.copy_from_slice(vertices);
        outcome.iterations_applied += 1;
    }
    debug!("applied {} smoothing iterations", outcome.iterations_applied);
    Ok(outcome)
}

fn laplacian_step(
    vertices: &mut [Point3<f64>],
    scratch: &mut [Point3<f64>],
    neighbors: &[Vec<u32>],
    weight: f64,
) {
    for (i, n) in neighbors.iter().enumerate() {
        if n.is_empty() {
            scratch[i] = vertices[i];
            continue;
        }
        let centroid: Vector3<f64> = n
            .iter()
            .map(|&j| vertices[j as usize].coords)
            .sum::<Vector3<f64>>()
            / n.len() as f64;
        scratch[i] = vertices[i] + (centroid - vertices[i].coords) * weight;
    }
    vertices.copy_from_slice(scratch);
}

fn shrank_too_much(original: &Vector3<f64>, current: &Vector3<f64>) -> bool {
    original
        .iter()
        .zip(current.iter())
        .any(|(&o, &c)| o > 0.0 && c < o * (1.0 - BBOX_SHRINK_TOLERANCE))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flat grid in the z = 0 plane with one vertex pushed out of plane.
    fn bumpy_grid() -> (Vec<Point3<f64>>, Vec<[u32; 3]>) {
        let n = 6;
        let mut vertices = Vec::new();
        for y in 0..n {
            for x in 0..n {
                vertices.push(Point3::new(x as f64, y as f64, 0.0));
            }
        }
        vertices[2 + n * 2].z = 1.0;
        let mut triangles = Vec::new();
        for y in 0..n - 1 {
            for x in 0..n - 1 {
                let i = (x + n * y) as u32;
                let n = n as u32;
                triangles.push([i, i + 1, i + n + 1]);
                triangles.push([i, i + n + 1, i + n]);
            }
        }
        (vertices, triangles)
    }

    #[test]
    fn test_neighbors_are_sorted_and_unique() {
        let neighbors = vertex_neighbors(4, &[[0, 1, 2], [0, 2, 3]]);
        assert_eq!(neighbors[0], vec![1, 2, 3]);
        assert_eq!(neighbors[2], vec![0, 1, 3]);
    }

    #[test]
    fn test_bump_on_closed_block_is_flattened() {
        use crate::surface::surface_nets::surface_nets;
        use crate::volume::Volume;

        let n = 9;
        let mut labels = vec![0u16; n * n * n];
        for z in 1..8 {
            for y in 1..8 {
                for x in 1..8 {
                    labels[x + n * (y + n * z)] = 1;
                }
            }
        }
        let mask = Volume::from_parts([n, n, n], Vector3::new(1.0, 1.0, 1.0), Point3::origin(), labels)
            .label_mask(1)
            .unwrap();
        let mesh = surface_nets(&mask, &CancellationToken::new()).unwrap();
        let mut vertices: Vec<Point3<f64>> = mesh.vertices.iter().map(|v| Point3::from(*v)).collect();

        // push out the vertex at the centre of the +x face
        let bump = vertices
            .iter()
            .position(|p| (p.x - 7.5).abs() < 1e-9 && (p.y - 4.5).abs() < 1e-9 && (p.z - 4.5).abs() < 1e-9)
            .unwrap();
        vertices[bump].x += 0.3;

        let outcome =
            taubin_smooth(&mut vertices, &mesh.triangles, 0.5, 3, &CancellationToken::new()).unwrap();
        assert_eq!(outcome.iterations_applied, 3);
        assert!(!outcome.stopped_early);
        assert!(vertices[bump].x < 7.7);
    }

    #[test]
    fn test_over_smoothing_is_rolled_back() {
        // a tiny spike: its z extent is all bump, so any smoothing shrinks it
        let (mut vertices, triangles) = bumpy_grid();
        let before = vertices.clone();
        let outcome =
            taubin_smooth(&mut vertices, &triangles, 1.0, 20, &CancellationToken::new()).unwrap();
        assert!(outcome.stopped_early);
        let (lo, hi) = bounding_box(&vertices);
        let (lo0, hi0) = bounding_box(&before);
        assert!((hi.z - lo.z) >= (hi0.z - lo0.z) * (1.0 - BBOX_SHRINK_TOLERANCE));
    }
}
