pub mod loader;
pub mod mask;

pub use loader::load_volume;
pub use mask::LabelMask;


use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Per-slice spatial metadata as delivered with each mask.
///
/// `pixel_spacing` follows the DICOM order: (row spacing, column spacing) in mm.
/// `position` is the physical position of the first pixel of the slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceMetadata {
    pub pixel_spacing: (f64, f64),
    pub position: Point3<f64>,
}

/// One decoded 2D label image, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskSlice {
    pub rows: usize,
    pub cols: usize,
    pub labels: Vec<u16>,
    pub metadata: SliceMetadata,
}

impl MaskSlice {
    pub fn new(rows: usize, cols: usize, labels: Vec<u16>, metadata: SliceMetadata) -> Self {
        Self {
            rows,
            cols,
            labels,
            metadata,
        }
    }
}

/// Labeled 3D grid.
///
/// x runs along image columns, y along rows and z along slices. Voxel `(x, y, z)`
/// sits at `origin + (x * sx, y * sy, z * sz)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    dims: [usize; 3],
    spacing: Vector3<f64>,
    origin: Point3<f64>,
    labels: Vec<u16>,
}

impl Volume {
    /// Callers outside the loader are expected to uphold the invariants
    /// (positive spacing, `labels.len()` equal to the voxel count).
    pub(crate) fn from_parts(
        dims: [usize; 3],
        spacing: Vector3<f64>,
        origin: Point3<f64>,
        labels: Vec<u16>,
    ) -> Self {
        debug_assert_eq!(labels.len(), dims[0] * dims[1] * dims[2]);
        Self {
            dims,
            spacing,
            origin,
            labels,
        }
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn spacing(&self) -> Vector3<f64> {
        self.spacing
    }

    pub fn origin(&self) -> Point3<f64> {
        self.origin
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        x + self.dims[0] * (y + self.dims[1] * z)
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> u16 {
        self.labels[self.index(x, y, z)]
    }

    pub fn voxel_to_world(&self, x: f64, y: f64, z: f64) -> Point3<f64> {
        Point3::new(
            self.origin.x + x * self.spacing.x,
            self.origin.y + y * self.spacing.y,
            self.origin.z + z * self.spacing.z,
        )
    }

    /// Non-background labels present, ascending.
    pub fn labels_present(&self) -> Vec<u16> {
        let mut seen = vec![false; u16::MAX as usize + 1];
        for &l in &self.labels {
            seen[l as usize] = true;
        }
        seen.iter()
            .enumerate()
            .skip(1)
            .filter(|(_, &s)| s)
            .map(|(l, _)| l as u16)
            .collect()
    }

    pub fn count_label(&self, label: u16) -> usize {
        self.labels.iter().filter(|&&l| l == label).count()
    }

    /// Cropped binary indicator of one label, or `None` when absent.
    pub fn label_mask(&self, label: u16) -> Option<LabelMask> {
        LabelMask::from_volume(self, label)
    }

    /// Deterministic digest of grid contents and geometry.
    ///
    /// Stands in for a processing timestamp: identical input gives an identical
    /// value on every platform and toolchain. 64-bit FNV-1a over the
    /// little-endian dims, spacing, origin and labels.
    pub fn fingerprint(&self) -> u64 {
        let mut hash = Fnv1a::new();
        for &d in &self.dims {
            hash.write(&(d as u64).to_le_bytes());
        }
        for v in self.spacing.iter().chain(self.origin.coords.iter()) {
            hash.write(&v.to_le_bytes());
        }
        for &l in &self.labels {
            hash.write(&l.to_le_bytes());
        }
        hash.finish()
    }
}

struct Fnv1a(u64);

impl Fnv1a {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    fn new() -> Self {
        Fnv1a(Self::OFFSET)
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = (self.0 ^ b as u64).wrapping_mul(Self::PRIME);
        }
    }

    fn finish(&self) -> u64 {
        self.0
    }
}
