use std::f64::consts::PI;

use nalgebra::{Point3, Vector3};

use crate::volume::{MaskSlice, SliceMetadata, Volume};

/// Background voxels left around every synthetic shape.
pub const MARGIN: usize = 2;

fn test_origin() -> Point3<f64> {
    Point3::new(-12.5, 30.0, 100.0)
}

/// Volume whose voxel `(x, y, z)` carries `label(x, y, z)`.
pub fn volume_from_fn<F>(dims: [usize; 3], spacing: [f64; 3], label: F) -> Volume
where
    F: Fn(usize, usize, usize) -> u16,
{
    let mut labels = Vec::with_capacity(dims[0] * dims[1] * dims[2]);
    for z in 0..dims[2] {
        for y in 0..dims[1] {
            for x in 0..dims[0] {
                labels.push(label(x, y, z));
            }
        }
    }
    Volume::from_parts(dims, Vector3::from(spacing), test_origin(), labels)
}

/// Splits a volume back into the per-slice form the loader consumes.
pub fn slices_from_volume(volume: &Volume) -> Vec<MaskSlice> {
    let [nx, ny, nz] = volume.dims();
    let spacing = volume.spacing();
    (0..nz)
        .map(|z| {
            let mut labels = Vec::with_capacity(nx * ny);
            for y in 0..ny {
                for x in 0..nx {
                    labels.push(volume.get(x, y, z));
                }
            }
            MaskSlice::new(
                ny,
                nx,
                labels,
                SliceMetadata {
                    pixel_spacing: (spacing.y, spacing.x),
                    position: volume.voxel_to_world(0.0, 0.0, z as f64),
                },
            )
        })
        .collect()
}

/// Solid box of label 1, `block` voxels wide, starting at voxel (2, 2, 2).
pub fn block_volume(block: [usize; 3], spacing: [f64; 3]) -> Volume {
    let dims = block.map(|n| n + 2 * MARGIN);
    volume_from_fn(dims, spacing, |x, y, z| {
        let inside = [x, y, z]
            .iter()
            .zip(block.iter())
            .all(|(&v, &n)| v >= MARGIN && v < MARGIN + n);
        inside as u16
    })
}

/// A 10^3 block and a 3^3 block, both label 1, not touching.
pub fn two_blob_volume() -> Volume {
    volume_from_fn([22, 14, 14], [1.0, 1.0, 1.0], |x, y, z| {
        let large = (2..=11).contains(&x) && (2..=11).contains(&y) && (2..=11).contains(&z);
        let small = (15..=17).contains(&x) && (5..=7).contains(&y) && (5..=7).contains(&z);
        (large || small) as u16
    })
}

/// Straight cylinder of label 1 along z, 1 mm voxels, axis through voxel
/// column `(c, c)` with `c = dims[0] / 2`. Every slice is filled.
pub fn cylinder_volume(radius: f64, slices: usize) -> Volume {
    let c = radius.ceil() as usize + MARGIN;
    let side = 2 * c + 1;
    volume_from_fn([side, side, slices], [1.0, 1.0, 1.0], |x, y, _| {
        let (dx, dy) = (x as f64 - c as f64, y as f64 - c as f64);
        (dx * dx + dy * dy <= radius * radius) as u16
    })
}

/// Tube whose axis swings along x as `amplitude * sin(2 pi z / wavelength)`.
pub fn sinusoid_volume(radius: f64, slices: usize, amplitude: f64, wavelength: f64) -> Volume {
    let cx = (radius + amplitude).ceil() as usize + MARGIN;
    let cy = radius.ceil() as usize + MARGIN;
    volume_from_fn([2 * cx + 1, 2 * cy + 1, slices], [1.0, 1.0, 1.0], |x, y, z| {
        let axis = cx as f64 + amplitude * (2.0 * PI * z as f64 / wavelength).sin();
        let (dx, dy) = (x as f64 - axis, y as f64 - cy as f64);
        (dx * dx + dy * dy <= radius * radius) as u16
    })
}

/// Straight tube crossing the slices at an angle: the axis runs along
/// `x = c + slope * z`, every slice holds a disc of `radius`.
pub fn oblique_tube_volume(radius: f64, slices: usize, slope: f64) -> Volume {
    let c = radius.ceil() as usize + MARGIN;
    let drift = (slope * (slices - 1) as f64).ceil() as usize;
    volume_from_fn([2 * c + 1 + drift, 2 * c + 1, slices], [1.0, 1.0, 1.0], |x, y, z| {
        let axis = c as f64 + slope * z as f64;
        let (dx, dy) = (x as f64 - axis, y as f64 - c as f64);
        (dx * dx + dy * dy <= radius * radius) as u16
    })
}

/// Ring of tube radius `minor` around a circle of radius `major` in the xy plane.
pub fn torus_volume(major: f64, minor: f64) -> Volume {
    let c = (major + minor).ceil() as usize + MARGIN;
    let cz = minor.ceil() as usize + MARGIN;
    volume_from_fn([2 * c + 1, 2 * c + 1, 2 * cz + 1], [1.0, 1.0, 1.0], |x, y, z| {
        let (dx, dy, dz) = (x as f64 - c as f64, y as f64 - c as f64, z as f64 - cz as f64);
        let ring = (dx * dx + dy * dy).sqrt() - major;
        (ring * ring + dz * dz <= minor * minor) as u16
    })
}

#[cfg(test)]
mod test_utils_tests {
    use super::*;
    use crate::volume::load_volume;

    #[test]
    fn test_slices_roundtrip_through_loader() {
        let volume = two_blob_volume();
        let loaded = load_volume(slices_from_volume(&volume)).unwrap();
        assert_eq!(loaded, volume);
    }

    #[test]
    fn test_shapes_have_expected_voxels() {
        assert_eq!(block_volume([3, 4, 5], [1.0, 1.0, 1.0]).count_label(1), 60);
        assert_eq!(two_blob_volume().count_label(1), 1000 + 27);
        // 81 pixels inside a radius-5 disc on the integer lattice
        assert_eq!(cylinder_volume(5.0, 4).count_label(1), 4 * 81);
        assert_eq!(oblique_tube_volume(5.0, 4, 0.0).count_label(1), 4 * 81);
        assert!(torus_volume(15.0, 4.0).count_label(1) > 0);
    }
}
