use thiserror::Error;

/// Result type for reconstruction operations
pub type Result<T> = std::result::Result<T, ReconstructionError>;

/// Error types for the reconstruction pipeline.
///
/// `InconsistentGeometry`, `EmptyInput` and `InvalidConfig` abort the whole run
/// before any structure is processed. The remaining variants are raised inside
/// a single structure task and end up as a status on that structure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconstructionError {
    /// Slices disagree on resolution, spacing or ordering
    #[error("inconsistent slice geometry: {0}")]
    InconsistentGeometry(String),

    /// No slices, or no labeled voxel at all
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// Label present in the volume but no triangles could be extracted
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// No single dominant path through the solid
    #[error("skeletonization failed: {0}")]
    Skeletonization(String),

    /// Centerline endpoints too close to define tortuosity
    #[error("degenerate centerline: {0}")]
    DegenerateCenterline(String),

    /// Deadline passed or cancellation requested
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Configuration value out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ReconstructionError {
    /// Errors that abort the whole run instead of a single structure.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReconstructionError::InconsistentGeometry(_)
                | ReconstructionError::EmptyInput(_)
                | ReconstructionError::InvalidConfig(_)
        )
    }

    /// Short machine-friendly tag, used in serialized reasons.
    pub fn kind(&self) -> &'static str {
        match self {
            ReconstructionError::InconsistentGeometry(_) => "InconsistentGeometryError",
            ReconstructionError::EmptyInput(_) => "EmptyInputError",
            ReconstructionError::DegenerateGeometry(_) => "DegenerateGeometryError",
            ReconstructionError::Skeletonization(_) => "SkeletonizationError",
            ReconstructionError::DegenerateCenterline(_) => "DegenerateCenterlineError",
            ReconstructionError::Cancelled(_) => "Cancelled",
            ReconstructionError::InvalidConfig(_) => "InvalidConfigError",
        }
    }
}
