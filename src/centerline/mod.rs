pub mod distance;
pub mod graph;
pub mod voxelize;

use log::{debug, info};
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::ReconstructionConfig;
use crate::error::{ReconstructionError, Result};
use crate::pipeline::cancel::CancellationToken;
use crate::surface::Surface;
use distance::distance_transform;
use graph::VoxelGraph;
use voxelize::{voxelize, OccupancyGrid};

/// Slack when comparing a voxel's distance value against its neighbours.
const RIDGE_TOLERANCE: f64 = 1e-9;

/// Radius growth per unit path length above which a path end is treated as
/// running out through the cap of the vessel.
///
/// The ridge sheet from an obliquely cut cap to its rim gains radius at
/// `sin(a / 2)` per mm for a rim angle `a`, about 0.5 at a 30 degree tilt,
/// while vessel taper stays well under 0.1.
const END_CAP_GROWTH: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CenterlinePoint {
    pub position: Point3<f64>,
    /// local radius in mm
    pub radius: f64,
}

/// Ordered from the proximal (cranial, larger z) end to the distal end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Centerline {
    pub points: Vec<CenterlinePoint>,
    /// upper bound on the distance between consecutive points (voxel diagonal)
    pub max_step: f64,
    /// share of the solid's voxels inside some inscribed ball along the line;
    /// close to 1 for a single tube, low for loops and branches
    pub coverage: f64,
}

impl Centerline {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Cumulative arc length at every point, starting at 0.
    pub fn arc_lengths(&self) -> Vec<f64> {
        let mut total = 0.0;
        let mut lengths = Vec::with_capacity(self.points.len());
        for (i, p) in self.points.iter().enumerate() {
            if i > 0 {
                total += (p.position - self.points[i - 1].position).norm();
            }
            lengths.push(total);
        }
        lengths
    }

    /// Unit tangent at point `i` by finite differences (central inside, one-sided
    /// at the ends). Zero if the neighbouring points coincide.
    pub fn tangent_at(&self, i: usize) -> Vector3<f64> {
        let n = self.points.len();
        if n < 2 || i >= n {
            return Vector3::zeros();
        }
        let prev = i.saturating_sub(1);
        let next = (i + 1).min(n - 1);
        let d = self.points[next].position - self.points[prev].position;
        let len = d.norm();
        if len > 1e-12 {
            d / len
        } else {
            Vector3::zeros()
        }
    }
}

/// Single non-branching centerline through the solid enclosed by `surface`.
pub fn extract_centerline(
    surface: &Surface,
    config: &ReconstructionConfig,
    cancel: &CancellationToken,
) -> Result<Centerline> {
    let grid = voxelize(surface, cancel)?;
    let solid = grid.count();
    if solid == 0 {
        return Err(ReconstructionError::Skeletonization(
            "surface encloses no voxels".into(),
        ));
    }
    let dt = distance_transform(&grid);
    cancel.check("distance transform")?;

    let graph = VoxelGraph::from_grid(&grid);
    let node_dt: Vec<f64> = graph.voxels.iter().map(|&v| dt[v]).collect();
    let ridge = ridge_nodes(&graph, &node_dt, cancel)?;
    if ridge.is_empty() {
        return Err(ReconstructionError::Skeletonization(
            "distance transform has no ridge".into(),
        ));
    }
    debug!("{} solid voxels, {} ridge voxels", solid, ridge.len());

    // deepest voxel, lowest index on ties
    let mut seed = 0u32;
    for (i, &d) in node_dt.iter().enumerate() {
        if d > node_dt[seed as usize] {
            seed = i as u32;
        }
    }
    let dt_max = node_dt[seed as usize];

    let from_seed = graph.shortest_paths(seed, |_, l| l, cancel)?;
    let start = from_seed.farthest_of(&ridge).unwrap_or(seed);
    let from_start = graph.shortest_paths(start, |_, l| l, cancel)?;
    let end = from_start.farthest_of(&ridge).unwrap_or(start);

    let medial = graph.shortest_paths(
        start,
        |to, l| {
            let r = dt_max / node_dt[to as usize];
            l * r * r
        },
        cancel,
    )?;
    let nodes = medial.path_to(end).unwrap_or_else(|| vec![start]);
    let nodes = trim_end_caps(&graph, &grid, &node_dt, nodes);
    if nodes.len() < 2 {
        return Err(ReconstructionError::Skeletonization(format!(
            "skeleton path has {} point(s)",
            nodes.len()
        )));
    }

    let mut positions: Vec<Point3<f64>> = nodes
        .iter()
        .map(|&n| grid.center(graph.voxels[n as usize]))
        .collect();
    if positions[0].z < positions[positions.len() - 1].z {
        positions.reverse();
    }
    let positions = moving_average(&positions, config.centerline_smoothing_window);
    cancel.check("centerline smoothing")?;

    let radii = nearest_vertex_distances(&positions, &surface.vertices);
    let points: Vec<CenterlinePoint> = positions
        .into_iter()
        .zip(radii)
        .map(|(position, radius)| CenterlinePoint { position, radius })
        .collect();

    let coverage = path_coverage(&grid, &points, cancel)?;
    if coverage < config.min_path_coverage {
        return Err(ReconstructionError::Skeletonization(format!(
            "centerline covers {:.0}% of the solid, below {:.0}%; the shape is not a single tube",
            100.0 * coverage,
            100.0 * config.min_path_coverage
        )));
    }
    info!(
        "centerline with {} points, {:.0}% coverage",
        points.len(),
        100.0 * coverage
    );

    Ok(Centerline {
        points,
        max_step: grid.spacing.norm(),
        coverage,
    })
}

/// Nodes whose distance value is not exceeded by any 26-neighbour, ascending.
fn ridge_nodes(graph: &VoxelGraph, node_dt: &[f64], cancel: &CancellationToken) -> Result<Vec<u32>> {
    let mut ridge = Vec::new();
    for node in 0..graph.node_count() as u32 {
        cancel.check_every(node as usize + 1, "ridge detection")?;
        let d = node_dt[node as usize];
        if graph
            .neighbors(node)
            .all(|(next, _)| node_dt[next as usize] <= d + RIDGE_TOLERANCE)
        {
            ridge.push(node);
        }
    }
    Ok(ridge)
}

/// Cuts each end of the path back to the point past which the inscribed radius
/// no longer grows faster than `END_CAP_GROWTH` per mm travelled.
///
/// The cut keeps the index that maximises `dt[k] - dt[end] - END_CAP_GROWTH * arc`,
/// so a slowly tapering vessel is left alone while the stretch that runs from
/// the axis out to a flat cap or its rim is dropped.
fn trim_end_caps(graph: &VoxelGraph, grid: &OccupancyGrid, node_dt: &[f64], nodes: Vec<u32>) -> Vec<u32> {
    if nodes.len() < 3 {
        return nodes;
    }
    let positions: Vec<Point3<f64>> = nodes
        .iter()
        .map(|&n| grid.center(graph.voxels[n as usize]))
        .collect();
    let radii: Vec<f64> = nodes.iter().map(|&n| node_dt[n as usize]).collect();

    let last = nodes.len() - 1;
    let head = cap_cut(0..=last, &positions, &radii);
    let tail = cap_cut((head..=last).rev(), &positions, &radii);
    if tail <= head {
        return vec![nodes[head]];
    }
    nodes[head..=tail].to_vec()
}

/// Walks `order` from its first index and returns the index of largest radius
/// gain net of `END_CAP_GROWTH` times the distance walked.
fn cap_cut(order: impl Iterator<Item = usize>, positions: &[Point3<f64>], radii: &[f64]) -> usize {
    let mut order = order.peekable();
    let Some(&first) = order.peek() else {
        return 0;
    };
    let mut arc = 0.0;
    let mut previous = first;
    let mut best = (first, 0.0);
    for i in order {
        arc += (positions[i] - positions[previous]).norm();
        previous = i;
        let gain = radii[i] - radii[first] - END_CAP_GROWTH * arc;
        if gain > best.1 {
            best = (i, gain);
        }
    }
    best.0
}

/// Centred moving average; the half-window shrinks near the ends so both
/// endpoints stay fixed.
fn moving_average(points: &[Point3<f64>], window: usize) -> Vec<Point3<f64>> {
    let n = points.len();
    let half = window / 2;
    if half == 0 || n < 3 {
        return points.to_vec();
    }
    (0..n)
        .map(|i| {
            let h = half.min(i).min(n - 1 - i);
            let sum: Vector3<f64> = points[i - h..=i + h].iter().map(|p| p.coords).sum();
            Point3::from(sum / (2 * h + 1) as f64)
        })
        .collect()
}

fn nearest_vertex_distances(points: &[Point3<f64>], vertices: &[Point3<f64>]) -> Vec<f64> {
    points
        .par_iter()
        .map(|p| {
            vertices
                .iter()
                .map(|v| (v - p).norm_squared())
                .fold(f64::INFINITY, f64::min)
                .sqrt()
        })
        .collect()
}

/// Share of solid voxels lying inside the ball of some centerline point,
/// the ball radius widened by half a voxel diagonal.
fn path_coverage(grid: &OccupancyGrid, points: &[CenterlinePoint], cancel: &CancellationToken) -> Result<f64> {
    let slack = 0.5 * grid.spacing.norm();
    let solid: Vec<usize> = grid
        .data
        .iter()
        .enumerate()
        .filter_map(|(i, &inside)| inside.then_some(i))
        .collect();
    cancel.check("coverage check")?;
    let covered = solid
        .par_iter()
        .filter(|&&i| {
            let c = grid.center(i);
            points.iter().any(|p| {
                let r = p.radius + slack;
                (p.position - c).norm_squared() <= r * r
            })
        })
        .count();
    Ok(covered as f64 / solid.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::extract_surface;
    use crate::utils::test_utils::{cylinder_volume, oblique_tube_volume, sinusoid_volume, torus_volume};
    use crate::volume::Volume;
    use approx::assert_relative_eq;

    fn surface_of(volume: &Volume) -> Surface {
        let mask = volume.label_mask(1).unwrap();
        extract_surface(mask, &ReconstructionConfig::default(), &CancellationToken::new())
            .unwrap()
            .surface
    }

    #[test]
    fn test_straight_cylinder_centerline() {
        let volume = cylinder_volume(5.0, 60);
        let surface = surface_of(&volume);
        let centerline =
            extract_centerline(&surface, &ReconstructionConfig::default(), &CancellationToken::new())
                .unwrap();

        assert!(centerline.len() > 30);
        let first = &centerline.points[0];
        let last = &centerline.points[centerline.len() - 1];
        assert!(first.position.z > last.position.z, "proximal end must be cranial");

        let c = (volume.dims()[0] / 2) as f64;
        let axis = volume.voxel_to_world(c, c, 0.0);
        for p in &centerline.points {
            assert!((p.position.x - axis.x).abs() < 0.5);
            assert!((p.position.y - axis.y).abs() < 0.5);
        }
        for w in centerline.points.windows(2) {
            assert!((w[1].position - w[0].position).norm() <= centerline.max_step + 1e-9);
        }
        let mid = &centerline.points[centerline.len() / 2];
        assert!(mid.radius > 4.0 && mid.radius < 6.0, "radius {}", mid.radius);
        assert!(centerline.coverage >= 0.8 && centerline.coverage <= 1.0);

        let arcs = centerline.arc_lengths();
        assert_eq!(arcs[0], 0.0);
        assert!(arcs.windows(2).all(|w| w[1] >= w[0]));
        assert_relative_eq!(centerline.tangent_at(centerline.len() / 2).z, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_sinusoid_follows_the_bend() {
        let volume = sinusoid_volume(5.0, 100, 8.0, 100.0);
        let surface = surface_of(&volume);
        let centerline =
            extract_centerline(&surface, &ReconstructionConfig::default(), &CancellationToken::new())
                .unwrap();
        let xs: Vec<f64> = centerline.points.iter().map(|p| p.position.x).collect();
        let spread = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
            - xs.iter().cloned().fold(f64::INFINITY, f64::min);
        assert!(spread > 10.0, "lateral spread {}", spread);
    }

    #[test]
    fn test_oblique_tube_ends_stay_on_the_axis() {
        let volume = oblique_tube_volume(5.0, 60, 0.5);
        let surface = surface_of(&volume);
        let centerline =
            extract_centerline(&surface, &ReconstructionConfig::default(), &CancellationToken::new())
                .unwrap();
        let n = centerline.len();
        let mid = centerline.points[n / 2].radius;
        for end in [&centerline.points[0], &centerline.points[n - 1]] {
            assert!(end.radius > 0.6 * mid, "end radius {} against {}", end.radius, mid);
            // 1 mm voxels, axis x = c + z / 2 in voxel coordinates
            let v = end.position - volume.voxel_to_world(0.0, 0.0, 0.0);
            let c = 7.0;
            assert!((v.x - (c + 0.5 * v.z)).abs() < 1.5, "end {:?} off the axis", end.position);
            assert!((v.y - c).abs() < 1.5);
        }
    }

    #[test]
    fn test_cap_cut_drops_rim_detour_and_keeps_taper() {
        let positions: Vec<Point3<f64>> = (0..20).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect();
        // ridge sheet out to an oblique rim: radius climbs at 0.48 per mm, then plateaus
        let rim: Vec<f64> = (0..20).map(|i| (0.2 + 0.48 * i as f64).min(4.0)).collect();
        assert_eq!(cap_cut(0..20, &positions, &rim), 8);
        // a vessel widening slowly is not cut
        let taper: Vec<f64> = (0..20).map(|i| 3.0 + 0.05 * i as f64).collect();
        assert_eq!(cap_cut(0..20, &positions, &taper), 0);
        assert_eq!(cap_cut((0..20).rev(), &positions, &taper), 19);
    }

    #[test]
    fn test_torus_is_rejected() {
        let volume = torus_volume(15.0, 4.0);
        let surface = surface_of(&volume);
        let err = extract_centerline(&surface, &ReconstructionConfig::default(), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, ReconstructionError::Skeletonization(_)), "{:?}", err);
    }

    #[test]
    fn test_cancelled_extraction() {
        let volume = cylinder_volume(5.0, 20);
        let surface = surface_of(&volume);
        let token = CancellationToken::new();
        token.cancel();
        let err = extract_centerline(&surface, &ReconstructionConfig::default(), &token).unwrap_err();
        assert!(matches!(err, ReconstructionError::Cancelled(_)));
    }

    #[test]
    fn test_moving_average_keeps_endpoints() {
        let points: Vec<Point3<f64>> = (0..6)
            .map(|i| Point3::new(i as f64, if i % 2 == 0 { 0.0 } else { 1.0 }, 0.0))
            .collect();
        let smoothed = moving_average(&points, 5);
        assert_eq!(smoothed[0], points[0]);
        assert_eq!(smoothed[5], points[5]);
        assert_relative_eq!(smoothed[1].y, 1.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(smoothed[2].y, 0.4, epsilon = 1e-12);
        assert_eq!(moving_average(&points, 1), points);
    }
}
