use pyo3::prelude::*;

use crate::centerline::CenterlinePoint;
use crate::result::{ReconstructionResult, StructureResult};

/// Python representation of a centerline sample
///
/// Attributes:
///     x (float): X-coordinate in mm
///     y (float): Y-coordinate in mm
///     z (float): Z-coordinate in mm
///     radius (float): Local vessel radius in mm
#[pyclass]
#[derive(Debug, Clone)]
pub struct PyCenterlinePoint {
    #[pyo3(get)]
    pub x: f64,
    #[pyo3(get)]
    pub y: f64,
    #[pyo3(get)]
    pub z: f64,
    #[pyo3(get)]
    pub radius: f64,
}

#[pymethods]
impl PyCenterlinePoint {
    fn __repr__(&self) -> String {
        format!(
            "CenterlinePoint(x={:.2}, y={:.2}, z={:.2}, radius={:.2})",
            self.x, self.y, self.z, self.radius
        )
    }
}

impl From<&CenterlinePoint> for PyCenterlinePoint {
    fn from(p: &CenterlinePoint) -> Self {
        Self {
            x: p.position.x,
            y: p.position.y,
            z: p.position.z,
            radius: p.radius,
        }
    }
}

/// One reconstructed anatomical structure
///
/// Attributes:
///     name (str): Structure name from the label map, e.g. "aorta"
///     label (int): Label id in the masks
///     status (str): "Complete", "CenterlineUnavailable", "MarkersUnavailable",
///         "Omitted" or "Cancelled"
///     reasons (list[str]): Why the structure is not complete
///     warnings (list[str]): Non-fatal findings such as discarded fragments
///     vertices (list[tuple[float, float, float]]): Surface vertices in mm
///     faces (list[tuple[int, int, int]]): Surface triangles, 0-based
///     centerline (list[PyCenterlinePoint]): Proximal to distal
///     arc_length (list[float]): Diameter profile abscissa in mm
///     diameter (list[float]): Diameter profile in mm
///     tortuosity (float | None): Arc length over endpoint distance minus one
///     centerline_coverage (float | None): Share of the solid covered by the
///         inscribed balls along the centerline
///     max_diameter (float | None): Largest diameter in mm
///     max_diameter_position (tuple[float, float, float] | None)
#[pyclass]
#[derive(Debug, Clone)]
pub struct PyStructure {
    #[pyo3(get)]
    pub name: String,
    #[pyo3(get)]
    pub label: u16,
    #[pyo3(get)]
    pub status: String,
    #[pyo3(get)]
    pub reasons: Vec<String>,
    #[pyo3(get)]
    pub warnings: Vec<String>,
    #[pyo3(get)]
    pub vertices: Vec<(f64, f64, f64)>,
    #[pyo3(get)]
    pub faces: Vec<(u32, u32, u32)>,
    #[pyo3(get)]
    pub centerline: Vec<PyCenterlinePoint>,
    #[pyo3(get)]
    pub arc_length: Vec<f64>,
    #[pyo3(get)]
    pub diameter: Vec<f64>,
    #[pyo3(get)]
    pub tortuosity: Option<f64>,
    #[pyo3(get)]
    pub centerline_coverage: Option<f64>,
    #[pyo3(get)]
    pub max_diameter: Option<f64>,
    #[pyo3(get)]
    pub max_diameter_position: Option<(f64, f64, f64)>,
}

#[pymethods]
impl PyStructure {
    fn __repr__(&self) -> String {
        format!(
            "Structure(name={}, label={}, status={}, vertices={}, centerline={})",
            self.name,
            self.label,
            self.status,
            self.vertices.len(),
            self.centerline.len()
        )
    }
}

impl From<&StructureResult> for PyStructure {
    fn from(s: &StructureResult) -> Self {
        let (vertices, faces) = match &s.surface {
            Some(surface) => (
                surface.vertices.iter().map(|v| (v.x, v.y, v.z)).collect(),
                surface.triangles.iter().map(|t| (t[0], t[1], t[2])).collect(),
            ),
            None => (Vec::new(), Vec::new()),
        };
        let centerline = s
            .centerline
            .as_ref()
            .map(|c| c.points.iter().map(PyCenterlinePoint::from).collect())
            .unwrap_or_default();
        let (arc_length, diameter) = s
            .metrics
            .as_ref()
            .map(|m| (m.profile.arc_length.clone(), m.profile.diameter.clone()))
            .unwrap_or_default();
        Self {
            name: s.name.clone(),
            label: s.label,
            status: format!("{:?}", s.status),
            reasons: s.reasons.clone(),
            warnings: s.warnings.clone(),
            vertices,
            faces,
            centerline,
            arc_length,
            diameter,
            tortuosity: s.metrics.as_ref().map(|m| m.tortuosity),
            centerline_coverage: s.centerline.as_ref().map(|c| c.coverage),
            max_diameter: s.metrics.as_ref().map(|m| m.max_diameter.diameter),
            max_diameter_position: s.metrics.as_ref().map(|m| {
                let p = m.max_diameter.position;
                (p.x, p.y, p.z)
            }),
        }
    }
}

/// Result of a reconstruction run
///
/// Attributes:
///     spacing (tuple[float, float, float]): Voxel spacing (x, y, z) in mm
///     origin (tuple[float, float, float]): Position of the first voxel in mm
///     dims (tuple[int, int, int]): Volume size (columns, rows, slices)
///     fingerprint (int): Deterministic digest of the input
///     warnings (list[str]): Study-level warnings
///     cancelled (bool): True when the run stopped early
///     structures (list[PyStructure]): Ordered by label id
#[pyclass]
#[derive(Debug, Clone)]
pub struct PyReconstructionResult {
    #[pyo3(get)]
    pub spacing: (f64, f64, f64),
    #[pyo3(get)]
    pub origin: (f64, f64, f64),
    #[pyo3(get)]
    pub dims: (usize, usize, usize),
    #[pyo3(get)]
    pub fingerprint: u64,
    #[pyo3(get)]
    pub warnings: Vec<String>,
    #[pyo3(get)]
    pub cancelled: bool,
    #[pyo3(get)]
    pub structures: Vec<PyStructure>,
}

#[pymethods]
impl PyReconstructionResult {
    /// Looks up a structure by name, ``None`` if absent.
    fn structure(&self, name: &str) -> Option<PyStructure> {
        self.structures.iter().find(|s| s.name == name).cloned()
    }

    fn __repr__(&self) -> String {
        format!(
            "ReconstructionResult(dims={:?}, structures={}, cancelled={})",
            self.dims,
            self.structures.len(),
            self.cancelled
        )
    }
}

impl From<&ReconstructionResult> for PyReconstructionResult {
    fn from(r: &ReconstructionResult) -> Self {
        Self {
            spacing: (r.spacing.x, r.spacing.y, r.spacing.z),
            origin: (r.origin.x, r.origin.y, r.origin.z),
            dims: (r.dims[0], r.dims[1], r.dims[2]),
            fingerprint: r.fingerprint,
            warnings: r.warnings.clone(),
            cancelled: r.cancelled,
            structures: r.structures.iter().map(PyStructure::from).collect(),
        }
    }
}
