pub mod classes;

use classes::PyReconstructionResult;
use pyo3::prelude::*;

use crate::config::ReconstructionConfig;
use crate::io::{load_slices, write_result};
use crate::pipeline::run_reconstruction;

/// Reconstructs every labeled structure from a directory of mask slices.
///
/// The directory must contain ``slices.csv`` and the PNG masks it lists:
///
/// .. code-block:: text
///
///    file,row_spacing,col_spacing,x,y,z
///    slice_000.png,0.78,0.78,-200.0,-180.0,1020.0
///    ...
///
/// Arguments
/// ---------
///
/// - ``input_dir``: Directory with ``slices.csv`` and the masks.
/// - ``config_path`` (default: None): TOML configuration; defaults otherwise.
/// - ``output_dir`` (default: None): If given, OBJ/CSV/JSON outputs are written there.
///
/// Returns
/// -------
///
/// A ``PyReconstructionResult``.
///
/// Raises
/// ------
///
/// ``RuntimeError`` on unreadable input, invalid configuration or
/// inconsistent slice geometry.
///
/// Example
/// -------
///
/// .. code-block:: python
///
///    import vesselrecon as vr
///    result = vr.reconstruct_directory("data/case_01", output_dir="out/case_01")
///    aorta = result.structure("aorta")
///    print(aorta.status, aorta.tortuosity, aorta.max_diameter)
#[pyfunction]
#[pyo3(signature = (input_dir, config_path = None, output_dir = None))]
pub fn reconstruct_directory(
    py: Python<'_>,
    input_dir: &str,
    config_path: Option<&str>,
    output_dir: Option<&str>,
) -> PyResult<PyReconstructionResult> {
    let run = || -> anyhow::Result<PyReconstructionResult> {
        let config = match config_path {
            Some(path) => ReconstructionConfig::from_toml_file(path)?,
            None => ReconstructionConfig::default(),
        };
        let slices = load_slices(input_dir)?;
        let result = run_reconstruction(slices, &config)?;
        if let Some(dir) = output_dir {
            write_result(&result, dir)?;
        }
        Ok(PyReconstructionResult::from(&result))
    };
    py.allow_threads(run)
        .map_err(|e| pyo3::exceptions::PyRuntimeError::new_err(format!("{:#}", e)))
}
