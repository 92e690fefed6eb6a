//! Vessel geometry reconstruction from stacks of segmentation masks.
//!
//! Label slices are assembled into a volume, each labeled structure is turned
//! into a closed surface, a single centerline and diameter/tortuosity markers,
//! and everything is collected in a [`ReconstructionResult`].
//!
//! ```no_run
//! use vesselrecon::{io, run_reconstruction, ReconstructionConfig};
//!
//! let slices = io::load_slices("data/case_01").unwrap();
//! let result = run_reconstruction(slices, &ReconstructionConfig::default()).unwrap();
//! for s in &result.structures {
//!     println!("{} {:?}", s.name, s.status);
//! }
//! ```

pub mod analysis;
pub mod centerline;
pub mod config;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod result;
pub mod surface;
pub mod volume;

mod utils;

#[cfg(feature = "python")]
mod binding;

pub use config::ReconstructionConfig;
pub use error::{ReconstructionError, Result};
pub use pipeline::{run_reconstruction, run_reconstruction_with_cancel, CancellationToken};
pub use result::{ReconstructionResult, StructureResult, StructureStatus};
pub use volume::{load_volume, MaskSlice, SliceMetadata, Volume};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// This is the module importable from Python:
///
/// ```python
/// import vesselrecon as vr
/// result = vr.reconstruct_directory("data/case_01", output_dir="out/case_01")
/// ```
#[cfg(feature = "python")]
#[pymodule]
fn vesselrecon(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add_function(wrap_pyfunction!(binding::reconstruct_directory, m)?)?;
    m.add_class::<binding::classes::PyCenterlinePoint>()?;
    m.add_class::<binding::classes::PyStructure>()?;
    m.add_class::<binding::classes::PyReconstructionResult>()?;
    Ok(())
}
