use log::{debug, info, warn};
use nalgebra::Vector3;

use super::{MaskSlice, Volume};
use crate::error::{ReconstructionError, Result};

/// Relative tolerance for comparing spacings between slices.
const SPACING_TOLERANCE: f64 = 0.01;

/// Assembles the ordered mask slices into a single labeled volume.
///
/// Slices must share rows, columns and in-plane spacing, and their positions must
/// be strictly monotonic along z with uniform steps. A strictly decreasing stack
/// is reversed so that z grows with the slice index.
pub fn load_volume(mut slices: Vec<MaskSlice>) -> Result<Volume> {
    if slices.is_empty() {
        return Err(ReconstructionError::EmptyInput("no slices supplied".into()));
    }

    let (rows, cols) = (slices[0].rows, slices[0].cols);
    let (row_spacing, col_spacing) = slices[0].metadata.pixel_spacing;
    if rows == 0 || cols == 0 {
        return Err(ReconstructionError::InconsistentGeometry(format!(
            "slice 0 has zero extent ({} x {})",
            rows, cols
        )));
    }
    for (value, what) in [(row_spacing, "row"), (col_spacing, "column")] {
        if !(value > 0.0 && value.is_finite()) {
            return Err(ReconstructionError::InconsistentGeometry(format!(
                "{} spacing must be positive, got {}",
                what, value
            )));
        }
    }

    for (i, slice) in slices.iter().enumerate() {
        if slice.rows != rows || slice.cols != cols {
            return Err(ReconstructionError::InconsistentGeometry(format!(
                "slice {} is {} x {}, expected {} x {}",
                i, slice.rows, slice.cols, rows, cols
            )));
        }
        if slice.labels.len() != rows * cols {
            return Err(ReconstructionError::InconsistentGeometry(format!(
                "slice {} carries {} labels for a {} x {} grid",
                i,
                slice.labels.len(),
                rows,
                cols
            )));
        }
        let (r, c) = slice.metadata.pixel_spacing;
        if !approx_equal(r, row_spacing) || !approx_equal(c, col_spacing) {
            return Err(ReconstructionError::InconsistentGeometry(format!(
                "slice {} has pixel spacing ({}, {}), expected ({}, {})",
                i, r, c, row_spacing, col_spacing
            )));
        }
        if !slice.metadata.position.coords.iter().all(|v| v.is_finite()) {
            return Err(ReconstructionError::InconsistentGeometry(format!(
                "slice {} has a non-finite position",
                i
            )));
        }
    }

    let z_spacing = if slices.len() == 1 {
        let z = row_spacing.max(col_spacing);
        warn!("single slice supplied, assuming z spacing of {} mm", z);
        z
    } else {
        let steps: Vec<f64> = slices
            .windows(2)
            .map(|w| w[1].metadata.position.z - w[0].metadata.position.z)
            .collect();
        let increasing = steps.iter().all(|&s| s > 0.0);
        let decreasing = steps.iter().all(|&s| s < 0.0);
        if !increasing && !decreasing {
            let bad = steps
                .iter()
                .position(|&s| s == 0.0 || s.signum() != steps[0].signum())
                .unwrap_or(0);
            return Err(ReconstructionError::InconsistentGeometry(format!(
                "slice positions are not monotonic between slices {} and {}",
                bad,
                bad + 1
            )));
        }
        if decreasing {
            debug!("slice positions decrease, reversing stack");
            slices.reverse();
        }
        let mean = steps.iter().map(|s| s.abs()).sum::<f64>() / steps.len() as f64;
        if let Some(i) = steps
            .iter()
            .position(|s| (s.abs() - mean).abs() > SPACING_TOLERANCE * mean)
        {
            return Err(ReconstructionError::InconsistentGeometry(format!(
                "non-uniform slice spacing: step {} is {} mm, mean is {} mm",
                i,
                steps[i].abs(),
                mean
            )));
        }
        mean
    };

    let dims = [cols, rows, slices.len()];
    let origin = slices[0].metadata.position;
    let mut labels = Vec::with_capacity(dims[0] * dims[1] * dims[2]);
    for slice in slices {
        labels.extend(slice.labels);
    }

    if labels.iter().all(|&l| l == 0) {
        return Err(ReconstructionError::EmptyInput(
            "no voxel carries a non-background label".into(),
        ));
    }

    let spacing = Vector3::new(col_spacing, row_spacing, z_spacing);
    info!(
        "assembled volume {} x {} x {} with spacing ({:.3}, {:.3}, {:.3}) mm",
        dims[0], dims[1], dims[2], spacing.x, spacing.y, spacing.z
    );
    Ok(Volume::from_parts(dims, spacing, origin, labels))
}

fn approx_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= SPACING_TOLERANCE * a.abs().max(b.abs())
}
