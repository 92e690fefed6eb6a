use log::info;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::analysis::VesselMetrics;
use crate::centerline::Centerline;
use crate::error::ReconstructionError;
use crate::surface::{FragmentReport, Surface, SurfaceMetrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructureStatus {
    /// surface, centerline and markers all available
    Complete,
    /// surface only
    CenterlineUnavailable,
    /// surface and centerline, no diameter/tortuosity markers
    MarkersUnavailable,
    /// nothing could be reconstructed for this label
    Omitted,
    /// the run stopped before this structure finished
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureResult {
    pub name: String,
    pub label: u16,
    pub status: StructureStatus,
    /// why the structure is not `Complete`
    pub reasons: Vec<String>,
    pub warnings: Vec<String>,
    pub surface: Option<Surface>,
    pub surface_metrics: Option<SurfaceMetrics>,
    pub fragments: Option<FragmentReport>,
    pub centerline: Option<Centerline>,
    pub metrics: Option<VesselMetrics>,
}

impl StructureResult {
    pub fn new(name: &str, label: u16) -> Self {
        Self {
            name: name.to_string(),
            label,
            status: StructureStatus::Complete,
            reasons: Vec::new(),
            warnings: Vec::new(),
            surface: None,
            surface_metrics: None,
            fragments: None,
            centerline: None,
            metrics: None,
        }
    }

    /// Downgrades the status according to how far the structure got before
    /// `error` and keeps a readable reason.
    pub fn record_failure(&mut self, error: &ReconstructionError) {
        self.status = match error {
            ReconstructionError::Cancelled(_) => StructureStatus::Cancelled,
            _ if self.surface.is_none() => StructureStatus::Omitted,
            _ if self.centerline.is_none() => StructureStatus::CenterlineUnavailable,
            _ => StructureStatus::MarkersUnavailable,
        };
        self.reasons.push(format!("{}: {}", error.kind(), error));
    }

    pub fn is_complete(&self) -> bool {
        self.status == StructureStatus::Complete
    }
}

/// Study-level facts carried into the result once the volume is gone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub spacing: Vector3<f64>,
    pub origin: Point3<f64>,
    pub dims: [usize; 3],
    pub fingerprint: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionResult {
    pub spacing: Vector3<f64>,
    pub origin: Point3<f64>,
    pub dims: [usize; 3],
    /// deterministic digest of the input volume, identical across repeated runs
    pub fingerprint: u64,
    pub warnings: Vec<String>,
    /// some structure was stopped by cancellation or the deadline
    pub cancelled: bool,
    /// ascending by label id
    pub structures: Vec<StructureResult>,
}

impl ReconstructionResult {
    pub fn structure(&self, name: &str) -> Option<&StructureResult> {
        self.structures.iter().find(|s| s.name == name)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Combines per-structure outcomes into the final result. Never fails.
///
/// The run counts as cancelled only if a structure was actually cut short; a
/// deadline passing after every task finished changes nothing.
pub fn assemble(mut outcomes: Vec<StructureResult>, metadata: ResultMetadata) -> ReconstructionResult {
    outcomes.sort_by_key(|s| s.label);
    let cancelled = outcomes
        .iter()
        .any(|s| s.status == StructureStatus::Cancelled);
    let complete = outcomes.iter().filter(|s| s.is_complete()).count();
    info!(
        "assembled {} structure(s), {} complete{}",
        outcomes.len(),
        complete,
        if cancelled { ", run cancelled" } else { "" }
    );
    ReconstructionResult {
        spacing: metadata.spacing,
        origin: metadata.origin,
        dims: metadata.dims,
        fingerprint: metadata.fingerprint,
        warnings: metadata.warnings,
        cancelled,
        structures: outcomes,
    }
}
