use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use super::triangle_area;

/// What was thrown away when only the largest component was kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentReport {
    pub kept_area: f64,
    pub discarded_count: usize,
    pub discarded_area: f64,
}

impl FragmentReport {
    /// Discarded area relative to the kept component.
    pub fn discarded_ratio(&self) -> f64 {
        if self.kept_area > 0.0 {
            self.discarded_area / self.kept_area
        } else {
            0.0
        }
    }
}

struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Keeps the connected component (triangles linked through shared vertices) with
/// the largest surface area and compacts the vertex list.
///
/// Ties go to the component whose first triangle comes first, so the outcome
/// does not depend on hashing order.
pub fn keep_largest_component(
    vertices: &[Point3<f64>],
    triangles: &[[u32; 3]],
) -> (Vec<Point3<f64>>, Vec<[u32; 3]>, FragmentReport) {
    if triangles.is_empty() {
        return (Vec::new(), Vec::new(), FragmentReport::default());
    }

    let mut sets = DisjointSet::new(vertices.len());
    for t in triangles {
        sets.union(t[0] as usize, t[1] as usize);
        sets.union(t[1] as usize, t[2] as usize);
    }

    // component root -> (area, first triangle)
    let mut component_of = vec![usize::MAX; vertices.len()];
    let mut components: Vec<(f64, usize)> = Vec::new();
    let mut triangle_component = Vec::with_capacity(triangles.len());
    for (ti, t) in triangles.iter().enumerate() {
        let root = sets.find(t[0] as usize);
        if component_of[root] == usize::MAX {
            component_of[root] = components.len();
            components.push((0.0, ti));
        }
        let c = component_of[root];
        components[c].0 += triangle_area(
            &vertices[t[0] as usize],
            &vertices[t[1] as usize],
            &vertices[t[2] as usize],
        );
        triangle_component.push(c);
    }

    let mut best = 0usize;
    for (c, &(area, _)) in components.iter().enumerate() {
        if area > components[best].0 {
            best = c;
        }
    }

    let total_area: f64 = components.iter().map(|c| c.0).sum();
    let report = FragmentReport {
        kept_area: components[best].0,
        discarded_count: components.len() - 1,
        discarded_area: total_area - components[best].0,
    };

    // vertices keep their relative order
    let mut used = vec![false; vertices.len()];
    for (t, &c) in triangles.iter().zip(&triangle_component) {
        if c == best {
            t.iter().for_each(|&v| used[v as usize] = true);
        }
    }
    let mut remap = vec![u32::MAX; vertices.len()];
    let mut kept_vertices = Vec::new();
    for (i, _) in used.iter().enumerate().filter(|(_, &u)| u) {
        remap[i] = kept_vertices.len() as u32;
        kept_vertices.push(vertices[i]);
    }
    let kept_triangles: Vec<[u32; 3]> = triangles
        .iter()
        .zip(&triangle_component)
        .filter(|(_, &c)| c == best)
        .map(|(t, _)| t.map(|v| remap[v as usize]))
        .collect();

    (kept_vertices, kept_triangles, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tetra(offset: f64, scale: f64, base: u32) -> (Vec<Point3<f64>>, Vec<[u32; 3]>) {
        let v = vec![
            Point3::new(offset, 0.0, 0.0),
            Point3::new(offset + scale, 0.0, 0.0),
            Point3::new(offset, scale, 0.0),
            Point3::new(offset, 0.0, scale),
        ];
        let t = vec![
            [base, base + 2, base + 1],
            [base, base + 1, base + 3],
            [base, base + 3, base + 2],
            [base + 1, base + 2, base + 3],
        ];
        (v, t)
    }

    #[test]
    fn test_keeps_larger_of_two_components() {
        let (mut v, mut t) = tetra(0.0, 1.0, 0);
        let (v2, t2) = tetra(10.0, 3.0, 4);
        v.extend(v2);
        t.extend(t2);

        let (kept_v, kept_t, report) = keep_largest_component(&v, &t);
        assert_eq!(kept_v.len(), 4);
        assert_eq!(kept_t.len(), 4);
        assert!(kept_v.iter().all(|p| p.x >= 10.0));
        assert!(kept_t.iter().flatten().all(|&i| (i as usize) < kept_v.len()));
        assert_eq!(report.discarded_count, 1);
        // areas scale with the square of the edge length
        assert_relative_eq!(report.discarded_ratio(), 1.0 / 9.0, epsilon = 1e-9);
    }

    #[test]
    fn test_single_component_discards_nothing() {
        let (v, t) = tetra(0.0, 1.0, 0);
        let (kept_v, kept_t, report) = keep_largest_component(&v, &t);
        assert_eq!(kept_v, v);
        assert_eq!(kept_t, t);
        assert_eq!(report.discarded_count, 0);
        assert_eq!(report.discarded_area, 0.0);
    }
}
