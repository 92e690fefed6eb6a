use nalgebra::{Point3, Vector3};

use super::Volume;

/// Binary indicator of a single label, cropped to its bounding box.
///
/// The crop keeps one background voxel on every side so every boundary of the
/// structure lies strictly inside the grid. `origin` is the physical position of
/// mask voxel `(0, 0, 0)`.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMask {
    pub label: u16,
    pub dims: [usize; 3],
    pub spacing: Vector3<f64>,
    pub origin: Point3<f64>,
    pub data: Vec<bool>,
}

impl LabelMask {
    pub(crate) fn from_volume(volume: &Volume, label: u16) -> Option<LabelMask> {
        let [nx, ny, nz] = volume.dims();
        let mut lo = [usize::MAX; 3];
        let mut hi = [0usize; 3];
        let mut found = false;
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    if volume.get(x, y, z) == label {
                        found = true;
                        for (a, v) in [x, y, z].into_iter().enumerate() {
                            lo[a] = lo[a].min(v);
                            hi[a] = hi[a].max(v);
                        }
                    }
                }
            }
        }
        if !found {
            return None;
        }

        let dims = [
            hi[0] - lo[0] + 3,
            hi[1] - lo[1] + 3,
            hi[2] - lo[2] + 3,
        ];
        let mut data = vec![false; dims[0] * dims[1] * dims[2]];
        for z in lo[2]..=hi[2] {
            for y in lo[1]..=hi[1] {
                for x in lo[0]..=hi[0] {
                    if volume.get(x, y, z) == label {
                        let (mx, my, mz) = (x - lo[0] + 1, y - lo[1] + 1, z - lo[2] + 1);
                        data[mx + dims[0] * (my + dims[1] * mz)] = true;
                    }
                }
            }
        }

        let origin = volume.voxel_to_world(
            lo[0] as f64 - 1.0,
            lo[1] as f64 - 1.0,
            lo[2] as f64 - 1.0,
        );
        Some(LabelMask {
            label,
            dims,
            spacing: volume.spacing(),
            origin,
            data,
        })
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        x + self.dims[0] * (y + self.dims[1] * z)
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> bool {
        x < self.dims[0] && y < self.dims[1] && z < self.dims[2] && self.data[self.index(x, y, z)]
    }

    pub fn voxel_count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// Physical position of a (possibly fractional) grid coordinate.
    pub fn grid_to_world(&self, p: [f64; 3]) -> Point3<f64> {
        Point3::new(
            self.origin.x + p[0] * self.spacing.x,
            self.origin.y + p[1] * self.spacing.y,
            self.origin.z + p[2] * self.spacing.z,
        )
    }

    /// Fills background cavities that are not 6-connected to the grid border.
    ///
    /// Returns the number of voxels that were filled.
    pub fn fill_holes(&mut self) -> usize {
        let [nx, ny, nz] = self.dims;
        let mut outside = vec![false; self.data.len()];
        let mut stack: Vec<usize> = Vec::new();

        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    let on_border = x == 0
                        || y == 0
                        || z == 0
                        || x == nx - 1
                        || y == ny - 1
                        || z == nz - 1;
                    let i = self.index(x, y, z);
                    if on_border && !self.data[i] {
                        outside[i] = true;
                        stack.push(i);
                    }
                }
            }
        }

        while let Some(i) = stack.pop() {
            let x = i % nx;
            let y = (i / nx) % ny;
            let z = i / (nx * ny);
            let neighbors = [
                (x > 0).then(|| i - 1),
                (x + 1 < nx).then(|| i + 1),
                (y > 0).then(|| i - nx),
                (y + 1 < ny).then(|| i + nx),
                (z > 0).then(|| i - nx * ny),
                (z + 1 < nz).then(|| i + nx * ny),
            ];
            for j in neighbors.into_iter().flatten() {
                if !self.data[j] && !outside[j] {
                    outside[j] = true;
                    stack.push(j);
                }
            }
        }

        let mut filled = 0;
        for (v, out) in self.data.iter_mut().zip(outside) {
            if !*v && !out {
                *v = true;
                filled += 1;
            }
        }
        filled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hollow_cube_volume() -> Volume {
        // 5^3 shell of label 1 with a single empty voxel in the middle
        let n = 7;
        let mut labels = vec![0u16; n * n * n];
        for z in 1..6 {
            for y in 1..6 {
                for x in 1..6 {
                    if !(x == 3 && y == 3 && z == 3) {
                        labels[x + n * (y + n * z)] = 1;
                    }
                }
            }
        }
        Volume::from_parts(
            [n, n, n],
            Vector3::new(1.0, 1.0, 2.0),
            Point3::origin(),
            labels,
        )
    }

    #[test]
    fn test_crop_keeps_one_voxel_padding() {
        let volume = hollow_cube_volume();
        let mask = volume.label_mask(1).unwrap();
        assert_eq!(mask.dims, [7, 7, 7]);
        assert!(!mask.get(0, 0, 0));
        assert!(mask.get(1, 1, 1));
        assert_eq!(mask.voxel_count(), 124);
        assert_eq!(mask.origin, Point3::new(0.0, 0.0, 0.0));
        assert!(volume.label_mask(2).is_none());
    }

    #[test]
    fn test_origin_tracks_crop_offset() {
        let mut labels = vec![0u16; 5 * 5 * 5];
        labels[3 + 5 * (2 + 5 * 4)] = 7;
        let volume = Volume::from_parts(
            [5, 5, 5],
            Vector3::new(0.5, 1.0, 2.0),
            Point3::new(100.0, 0.0, 0.0),
            labels,
        );
        let mask = volume.label_mask(7).unwrap();
        assert_eq!(mask.dims, [3, 3, 3]);
        assert!(mask.get(1, 1, 1));
        // mask (1, 1, 1) must map back onto volume voxel (3, 2, 4)
        assert_eq!(mask.grid_to_world([1.0, 1.0, 1.0]), volume.voxel_to_world(3.0, 2.0, 4.0));
    }

    #[test]
    fn test_fill_holes_closes_cavity_only() {
        let mut mask = hollow_cube_volume().label_mask(1).unwrap();
        assert!(!mask.get(3, 3, 3));
        assert_eq!(mask.fill_holes(), 1);
        assert!(mask.get(3, 3, 3));
        assert!(!mask.get(0, 3, 3));
    }
}
