use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::voxelize::OccupancyGrid;
use crate::error::Result;
use crate::pipeline::cancel::CancellationToken;

const NO_NODE: u32 = u32::MAX;

/// Solid voxels as graph nodes with explicit 26-neighbour adjacency (CSR).
///
/// Nodes are numbered in ascending grid order, which makes every traversal and
/// tie-break reproducible.
#[derive(Debug, Clone)]
pub struct VoxelGraph {
    /// grid index of each node
    pub voxels: Vec<usize>,
    offsets: Vec<usize>,
    targets: Vec<u32>,
    lengths: Vec<f64>,
}

/// Result of a single-source search.
#[derive(Debug, Clone)]
pub struct ShortestPaths {
    pub source: u32,
    pub cost: Vec<f64>,
    /// Geodesic length (mm) along the chosen paths, whatever the cost function.
    pub length: Vec<f64>,
    previous: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct State {
    cost: f64,
    node: u32,
}

impl Eq for State {}

impl Ord for State {
    // reversed so BinaryHeap pops the cheapest state, lowest node first on ties
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl VoxelGraph {
    pub fn from_grid(grid: &OccupancyGrid) -> VoxelGraph {
        let [nx, ny, nz] = grid.dims;
        let mut node_of = vec![NO_NODE; grid.data.len()];
        let mut voxels = Vec::new();
        for (i, &inside) in grid.data.iter().enumerate() {
            if inside {
                node_of[i] = voxels.len() as u32;
                voxels.push(i);
            }
        }

        let mut steps: Vec<([i64; 3], f64)> = Vec::with_capacity(26);
        for dz in -1i64..=1 {
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    if dx == 0 && dy == 0 && dz == 0 {
                        continue;
                    }
                    let length = ((dx as f64 * grid.spacing.x).powi(2)
                        + (dy as f64 * grid.spacing.y).powi(2)
                        + (dz as f64 * grid.spacing.z).powi(2))
                    .sqrt();
                    steps.push(([dx, dy, dz], length));
                }
            }
        }

        let mut offsets = Vec::with_capacity(voxels.len() + 1);
        let mut targets = Vec::new();
        let mut lengths = Vec::new();
        offsets.push(0);
        for &v in &voxels {
            let [x, y, z] = grid.coords(v);
            for &(d, length) in &steps {
                let (qx, qy, qz) = (x as i64 + d[0], y as i64 + d[1], z as i64 + d[2]);
                if qx < 0 || qy < 0 || qz < 0 || qx >= nx as i64 || qy >= ny as i64 || qz >= nz as i64 {
                    continue;
                }
                let q = grid.index(qx as usize, qy as usize, qz as usize);
                if node_of[q] != NO_NODE {
                    targets.push(node_of[q]);
                    lengths.push(length);
                }
            }
            offsets.push(targets.len());
        }

        VoxelGraph {
            voxels,
            offsets,
            targets,
            lengths,
        }
    }

    pub fn node_count(&self) -> usize {
        self.voxels.len()
    }

    pub fn neighbors(&self, node: u32) -> impl Iterator<Item = (u32, f64)> + '_ {
        let range = self.offsets[node as usize]..self.offsets[node as usize + 1];
        self.targets[range.clone()]
            .iter()
            .copied()
            .zip(self.lengths[range].iter().copied())
    }

    /// Dijkstra from `source` where stepping onto `to` along an edge of `length`
    /// costs `step_cost(to, length)`.
    pub fn shortest_paths<F>(
        &self,
        source: u32,
        step_cost: F,
        cancel: &CancellationToken,
    ) -> Result<ShortestPaths>
    where
        F: Fn(u32, f64) -> f64,
    {
        let n = self.node_count();
        let mut cost = vec![f64::INFINITY; n];
        let mut length = vec![f64::INFINITY; n];
        let mut previous = vec![NO_NODE; n];
        let mut heap = BinaryHeap::new();

        cost[source as usize] = 0.0;
        length[source as usize] = 0.0;
        heap.push(State {
            cost: 0.0,
            node: source,
        });

        let mut popped = 0usize;
        while let Some(State { cost: c, node }) = heap.pop() {
            popped += 1;
            cancel.check_every(popped, "skeleton path search")?;
            if c > cost[node as usize] {
                continue;
            }
            for (next, step) in self.neighbors(node) {
                let candidate = c + step_cost(next, step);
                if candidate < cost[next as usize] {
                    cost[next as usize] = candidate;
                    length[next as usize] = length[node as usize] + step;
                    previous[next as usize] = node;
                    heap.push(State {
                        cost: candidate,
                        node: next,
                    });
                }
            }
        }

        Ok(ShortestPaths {
            source,
            cost,
            length,
            previous,
        })
    }
}

impl ShortestPaths {
    pub fn reachable(&self, node: u32) -> bool {
        self.cost[node as usize].is_finite()
    }

    /// Node sequence from the source to `target`, or `None` if unreachable.
    pub fn path_to(&self, target: u32) -> Option<Vec<u32>> {
        if !self.reachable(target) {
            return None;
        }
        let mut path = vec![target];
        let mut current = target;
        while current != self.source {
            current = self.previous[current as usize];
            if current == NO_NODE {
                return None;
            }
            path.push(current);
        }
        path.reverse();
        Some(path)
    }

    /// Reachable candidate with the largest geodesic length; first candidate wins ties.
    pub fn farthest_of(&self, candidates: &[u32]) -> Option<u32> {
        let mut best: Option<(u32, f64)> = None;
        for &c in candidates {
            let l = self.length[c as usize];
            if !l.is_finite() {
                continue;
            }
            match best {
                Some((_, bl)) if l <= bl => {}
                _ => best = Some((c, l)),
            }
        }
        best.map(|(c, _)| c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};

    fn line_grid(n: usize) -> OccupancyGrid {
        // a straight rod along x with a one voxel bump at the middle
        let dims = [n + 2, 4, 3];
        let mut data = vec![false; dims[0] * dims[1] * dims[2]];
        for x in 1..=n {
            data[x + dims[0] * (1 + dims[1])] = true;
        }
        data[n / 2 + dims[0] * (2 + dims[1])] = true;
        OccupancyGrid {
            dims,
            origin: Point3::origin(),
            spacing: Vector3::new(1.0, 0.5, 1.0),
            data,
        }
    }

    #[test]
    fn test_adjacency_is_symmetric() {
        let graph = VoxelGraph::from_grid(&line_grid(6));
        assert_eq!(graph.node_count(), 7);
        for node in 0..graph.node_count() as u32 {
            for (next, length) in graph.neighbors(node) {
                assert!(graph.neighbors(next).any(|(back, l)| back == node && l == length));
            }
        }
    }

    #[test]
    fn test_geodesic_endpoints_and_path() {
        let graph = VoxelGraph::from_grid(&line_grid(6));
        let token = CancellationToken::new();
        let all: Vec<u32> = (0..graph.node_count() as u32).collect();

        let from_first = graph.shortest_paths(0, |_, l| l, &token).unwrap();
        let far = from_first.farthest_of(&all).unwrap();
        assert_relative_eq!(from_first.length[far as usize], 5.0, epsilon = 1e-12);

        let path = from_first.path_to(far).unwrap();
        assert_eq!(path.first(), Some(&0));
        assert_eq!(path.last(), Some(&far));
        assert_eq!(path.len(), 6);
    }

    #[test]
    fn test_cost_function_steers_path() {
        let graph = VoxelGraph::from_grid(&line_grid(6));
        let token = CancellationToken::new();
        // rod voxels are nodes 0..=5 in grid order, the bump is node 6
        let bump = 6u32;
        let cheap_bump = graph
            .shortest_paths(0, |to, l| if to == bump { 0.0 } else { 10.0 * l }, &token)
            .unwrap();
        let path = cheap_bump.path_to(5).unwrap();
        assert!(path.contains(&bump));
        // geodesic length follows the path actually taken, not the cost
        assert!(cheap_bump.length[5] > 5.0);
    }
}
