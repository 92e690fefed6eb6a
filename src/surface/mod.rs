pub mod components;
pub mod smoothing;
pub mod surface_nets;

pub use components::FragmentReport;

use std::collections::HashMap;

use log::{debug, info, warn};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::config::ReconstructionConfig;
use crate::error::{ReconstructionError, Result};
use crate::pipeline::cancel::CancellationToken;
use crate::volume::LabelMask;
use components::keep_largest_component;
use smoothing::taubin_smooth;
use surface_nets::surface_nets;

/// Closed triangle mesh of one structure, in physical coordinates (mm).
///
/// `grid_origin` and `grid_spacing` describe the voxel lattice the surface was
/// extracted from, so the enclosed solid can be resampled on the same lattice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    pub vertices: Vec<Point3<f64>>,
    pub triangles: Vec<[u32; 3]>,
    pub grid_origin: Point3<f64>,
    pub grid_spacing: Vector3<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceMetrics {
    pub vertex_count: usize,
    pub triangle_count: usize,
    pub surface_area: f64,
    /// Enclosed volume in mm^3, only defined for a watertight mesh
    pub volume: Option<f64>,
    pub is_watertight: bool,
    pub bounding_box_min: Point3<f64>,
    pub bounding_box_max: Point3<f64>,
}

/// Output of the surface stage for one label.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceExtraction {
    pub surface: Surface,
    pub fragments: FragmentReport,
    pub filled_voxels: usize,
    pub warnings: Vec<String>,
}

pub(crate) fn triangle_area(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    0.5 * (b - a).cross(&(c - a)).norm()
}

pub(crate) fn bounding_box(points: &[Point3<f64>]) -> (Point3<f64>, Point3<f64>) {
    let mut lo = Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
    let mut hi = Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in points {
        lo = lo.inf(p);
        hi = hi.sup(p);
    }
    (lo, hi)
}

impl Surface {
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn area(&self) -> f64 {
        self.triangles
            .iter()
            .map(|t| {
                triangle_area(
                    &self.vertices[t[0] as usize],
                    &self.vertices[t[1] as usize],
                    &self.vertices[t[2] as usize],
                )
            })
            .sum()
    }

    /// Every undirected edge is shared by exactly two triangles.
    pub fn is_watertight(&self) -> bool {
        if self.triangles.is_empty() {
            return false;
        }
        let mut edges: HashMap<(u32, u32), u32> = HashMap::new();
        for &[a, b, c] in &self.triangles {
            for (p, q) in [(a, b), (b, c), (c, a)] {
                *edges.entry((p.min(q), p.max(q))).or_insert(0) += 1;
            }
        }
        edges.values().all(|&n| n == 2)
    }

    /// Signed volume by the divergence theorem; positive for outward winding.
    pub fn signed_volume(&self) -> f64 {
        // shift to the first vertex to keep the sum well conditioned far from the origin
        let Some(reference) = self.vertices.first() else {
            return 0.0;
        };
        self.triangles
            .iter()
            .map(|t| {
                let a = self.vertices[t[0] as usize] - reference;
                let b = self.vertices[t[1] as usize] - reference;
                let c = self.vertices[t[2] as usize] - reference;
                a.dot(&b.cross(&c)) / 6.0
            })
            .sum()
    }

    pub fn bounding_box(&self) -> (Point3<f64>, Point3<f64>) {
        bounding_box(&self.vertices)
    }

    /// Area-weighted vertex normals, unit length (zero for isolated vertices).
    pub fn vertex_normals(&self) -> Vec<Vector3<f64>> {
        let mut normals = vec![Vector3::zeros(); self.vertices.len()];
        for t in &self.triangles {
            let a = self.vertices[t[0] as usize];
            let b = self.vertices[t[1] as usize];
            let c = self.vertices[t[2] as usize];
            // cross product length is twice the triangle area
            let n = (b - a).cross(&(c - a));
            for &i in t {
                normals[i as usize] += n;
            }
        }
        for n in normals.iter_mut() {
            let len = n.norm();
            if len > 1e-12 {
                *n /= len;
            }
        }
        normals
    }

    pub fn metrics(&self) -> SurfaceMetrics {
        let is_watertight = self.is_watertight();
        let (bounding_box_min, bounding_box_max) = self.bounding_box();
        SurfaceMetrics {
            vertex_count: self.vertices.len(),
            triangle_count: self.triangles.len(),
            surface_area: self.area(),
            volume: is_watertight.then(|| self.signed_volume().abs()),
            is_watertight,
            bounding_box_min,
            bounding_box_max,
        }
    }
}

/// Isosurface, clean and smooth the boundary of one label.
///
/// Takes the mask by value: it is only needed until the triangles exist.
pub fn extract_surface(
    mut mask: LabelMask,
    config: &ReconstructionConfig,
    cancel: &CancellationToken,
) -> Result<SurfaceExtraction> {
    let label = mask.label;
    let filled_voxels = if config.fill_holes { mask.fill_holes() } else { 0 };
    if filled_voxels > 0 {
        debug!("label {}: filled {} interior voxels", label, filled_voxels);
    }

    let grid = surface_nets(&mask, cancel)?;
    if grid.triangles.is_empty() {
        return Err(ReconstructionError::DegenerateGeometry(format!(
            "label {} produced no triangles from {} voxels",
            label,
            mask.voxel_count()
        )));
    }
    let raw_vertices: Vec<Point3<f64>> = grid
        .vertices
        .iter()
        .map(|&v| mask.grid_to_world(v))
        .collect();
    let grid_origin = mask.origin;
    let grid_spacing = mask.spacing;
    drop(mask);

    let (mut vertices, triangles, fragments) = keep_largest_component(&raw_vertices, &grid.triangles);
    let mut warnings = Vec::new();
    if fragments.discarded_count > 0 {
        info!(
            "label {}: discarded {} fragment(s), {:.1} mm^2 against {:.1} mm^2 kept",
            label, fragments.discarded_count, fragments.discarded_area, fragments.kept_area
        );
        if fragments.discarded_ratio() > config.discard_fragment_area_ratio {
            let message = format!(
                "discarded {} fragment(s) totalling {:.1}% of the kept surface area; possible segmentation leakage",
                fragments.discarded_count,
                100.0 * fragments.discarded_ratio()
            );
            warn!("label {}: {}", label, message);
            warnings.push(message);
        }
    }

    let smoothing = taubin_smooth(
        &mut vertices,
        &triangles,
        config.smoothing_strength,
        config.smoothing_iterations,
        cancel,
    )?;
    if smoothing.stopped_early {
        warnings.push(format!(
            "surface smoothing stopped after {} of {} iterations to avoid shrinking the vessel",
            smoothing.iterations_applied, config.smoothing_iterations
        ));
    }

    let surface = Surface {
        vertices,
        triangles,
        grid_origin,
        grid_spacing,
    };
    info!(
        "label {}: surface with {} vertices, {} triangles",
        label,
        surface.vertices.len(),
        surface.triangles.len()
    );

    Ok(SurfaceExtraction {
        surface,
        fragments,
        filled_voxels,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{block_volume, two_blob_volume};
    use approx::assert_relative_eq;

    #[test]
    fn test_block_surface_is_closed_and_sized() {
        let volume = block_volume([10, 8, 6], [1.0, 1.0, 2.0]);
        let mask = volume.label_mask(1).unwrap();
        let mut config = ReconstructionConfig::default();
        config.smoothing_iterations = 0;
        let extraction = extract_surface(mask, &config, &CancellationToken::new()).unwrap();
        let metrics = extraction.surface.metrics();

        assert!(metrics.is_watertight);
        assert_eq!(extraction.fragments.discarded_count, 0);
        assert!(extraction.warnings.is_empty());
        // chamfered box: a bit smaller than the voxel hull of 10 x 8 x 12 mm
        let volume_mm3 = metrics.volume.unwrap();
        assert!(volume_mm3 > 0.8 * 960.0 && volume_mm3 < 960.0, "volume {}", volume_mm3);
        // face planes sit half a voxel outside the outer voxel centers
        assert_relative_eq!(
            metrics.bounding_box_max.x - metrics.bounding_box_min.x,
            10.0,
            epsilon = 1e-9
        );
        assert_relative_eq!(
            metrics.bounding_box_max.z - metrics.bounding_box_min.z,
            12.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_fragment_is_discarded_with_warning() {
        let volume = two_blob_volume();
        let mask = volume.label_mask(1).unwrap();
        let extraction =
            extract_surface(mask, &ReconstructionConfig::default(), &CancellationToken::new()).unwrap();

        assert_eq!(extraction.fragments.discarded_count, 1);
        let ratio = extraction.fragments.discarded_ratio();
        assert!(ratio > 0.05 && ratio < 0.2, "ratio {}", ratio);
        assert_eq!(extraction.warnings.len(), 1);
        assert!(extraction.warnings[0].contains("fragment"));

        // only the large blob (voxels x <= 11) survives
        let (_, hi) = extraction.surface.bounding_box();
        assert!(hi.x < 13.0);
    }

    #[test]
    fn test_small_fragment_below_ratio_is_silent() {
        let volume = two_blob_volume();
        let mask = volume.label_mask(1).unwrap();
        let mut config = ReconstructionConfig::default();
        config.discard_fragment_area_ratio = 0.5;
        let extraction = extract_surface(mask, &config, &CancellationToken::new()).unwrap();
        assert_eq!(extraction.fragments.discarded_count, 1);
        assert!(extraction.warnings.is_empty());
    }

    #[test]
    fn test_mask_without_boundary_is_degenerate() {
        // no empty voxel anywhere, so there is no boundary to extract
        let solid = LabelMask {
            label: 4,
            dims: [3, 3, 3],
            spacing: Vector3::new(1.0, 1.0, 1.0),
            origin: Point3::origin(),
            data: vec![true; 27],
        };
        let err = extract_surface(solid, &ReconstructionConfig::default(), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, ReconstructionError::DegenerateGeometry(_)), "{:?}", err);
        assert!(err.to_string().contains("label 4"));
    }

    #[test]
    fn test_smoothing_keeps_mesh_closed() {
        let volume = block_volume([6, 6, 6], [1.0, 1.0, 1.0]);
        let mask = volume.label_mask(1).unwrap();
        let extraction =
            extract_surface(mask, &ReconstructionConfig::default(), &CancellationToken::new()).unwrap();
        let surface = &extraction.surface;
        assert!(surface.is_watertight());
        assert!(surface.signed_volume() > 0.0);
        let normals = surface.vertex_normals();
        assert_eq!(normals.len(), surface.vertices.len());
        assert!(normals.iter().all(|n| (n.norm() - 1.0).abs() < 1e-9));
    }
}
