use std::f64::consts::PI;

use log::debug;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::centerline::Centerline;
use crate::config::ReconstructionConfig;
use crate::error::{ReconstructionError, Result};

/// Segments around the rim of the max-diameter marker disc.
pub const DISC_SEGMENTS: usize = 60;

/// Diameter sampled along the centerline; both vectors have one entry per point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiameterProfile {
    pub arc_length: Vec<f64>,
    pub diameter: Vec<f64>,
}

impl DiameterProfile {
    pub fn from_centerline(centerline: &Centerline) -> Self {
        Self {
            arc_length: centerline.arc_lengths(),
            diameter: centerline.points.iter().map(|p| 2.0 * p.radius).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.diameter.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diameter.is_empty()
    }

    /// Index of the largest diameter; the first one by arc length on ties.
    pub fn argmax(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, &d) in self.diameter.iter().enumerate() {
            match best {
                Some(b) if d <= self.diameter[b] => {}
                _ => best = Some(i),
            }
        }
        best
    }

    pub fn stats(&self) -> Option<DiameterStats> {
        if self.diameter.is_empty() {
            return None;
        }
        let mut sorted = self.diameter.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let n = sorted.len();
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
        };
        Some(DiameterStats {
            min: sorted[0],
            mean: sorted.iter().sum::<f64>() / n as f64,
            median,
            max: sorted[n - 1],
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiameterStats {
    pub min: f64,
    pub mean: f64,
    pub median: f64,
    pub max: f64,
}

/// Flat triangle fan lying in the cross-section plane at the widest point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disc {
    pub center: Point3<f64>,
    pub normal: Vector3<f64>,
    pub radius: f64,
    pub vertices: Vec<Point3<f64>>,
    pub triangles: Vec<[u32; 3]>,
}

impl Disc {
    pub fn new(center: Point3<f64>, normal: Vector3<f64>, radius: f64, segments: usize) -> Self {
        // any axis not parallel to the normal spans the plane together with it
        let helper = if normal.x.abs() < 0.9 {
            Vector3::x()
        } else {
            Vector3::y()
        };
        let u = normal.cross(&helper).normalize();
        let v = normal.cross(&u);

        let mut vertices = Vec::with_capacity(segments + 1);
        vertices.push(center);
        for k in 0..segments {
            let theta = 2.0 * PI * k as f64 / segments as f64;
            vertices.push(center + radius * (theta.cos() * u + theta.sin() * v));
        }
        let triangles = (0..segments as u32)
            .map(|k| [0, 1 + k, 1 + (k + 1) % segments as u32])
            .collect();
        Self {
            center,
            normal,
            radius,
            vertices,
            triangles,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxDiameterMarker {
    pub diameter: f64,
    pub point_index: usize,
    pub arc_length: f64,
    pub position: Point3<f64>,
    /// unit direction of the centerline at the marker, pointing distally
    pub tangent: Vector3<f64>,
    pub disc: Disc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselMetrics {
    pub profile: DiameterProfile,
    pub stats: DiameterStats,
    /// centerline arc length (mm)
    pub length: f64,
    pub endpoint_distance: f64,
    /// arc length / endpoint distance - 1, 0 for a straight vessel
    pub tortuosity: f64,
    /// coverage of the centerline the metrics were taken from
    pub centerline_coverage: f64,
    pub max_diameter: MaxDiameterMarker,
}

/// Diameter profile, tortuosity and max-diameter marker of one centerline.
///
/// Fails with `DegenerateCenterline` when the endpoints are closer than
/// `min_tortuosity_denominator`, where tortuosity is undefined.
pub fn analyze_centerline(centerline: &Centerline, config: &ReconstructionConfig) -> Result<VesselMetrics> {
    if centerline.len() < 2 {
        return Err(ReconstructionError::DegenerateCenterline(format!(
            "centerline has {} point(s)",
            centerline.len()
        )));
    }
    let profile = DiameterProfile::from_centerline(centerline);
    let length = profile.arc_length[profile.len() - 1];
    let first = centerline.points[0].position;
    let last = centerline.points[centerline.len() - 1].position;
    let endpoint_distance = (last - first).norm();
    if endpoint_distance < config.min_tortuosity_denominator {
        return Err(ReconstructionError::DegenerateCenterline(format!(
            "endpoints {:.3} mm apart, below {} mm; tortuosity undefined",
            endpoint_distance, config.min_tortuosity_denominator
        )));
    }
    // rounding can put a straight path a hair under its chord
    let tortuosity = (length / endpoint_distance - 1.0).max(0.0);

    let (stats, index) = match (profile.stats(), profile.argmax()) {
        (Some(stats), Some(index)) => (stats, index),
        _ => {
            return Err(ReconstructionError::DegenerateCenterline(
                "empty diameter profile".into(),
            ))
        }
    };
    let mut tangent = centerline.tangent_at(index);
    if tangent.norm() == 0.0 {
        tangent = (last - first) / endpoint_distance;
    }
    let diameter = profile.diameter[index];
    let position = centerline.points[index].position;
    let max_diameter = MaxDiameterMarker {
        diameter,
        point_index: index,
        arc_length: profile.arc_length[index],
        position,
        tangent,
        disc: Disc::new(position, tangent, 0.5 * diameter, DISC_SEGMENTS),
    };
    debug!(
        "length {:.1} mm, tortuosity {:.4}, max diameter {:.2} mm at {:.1} mm",
        length, tortuosity, diameter, max_diameter.arc_length
    );

    Ok(VesselMetrics {
        profile,
        stats,
        length,
        endpoint_distance,
        tortuosity,
        centerline_coverage: centerline.coverage,
        max_diameter,
    })
}
