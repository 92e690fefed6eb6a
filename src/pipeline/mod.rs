pub mod cancel;

pub use cancel::CancellationToken;

use crossbeam::thread;
use log::{error, info, warn};

use crate::analysis::analyze_centerline;
use crate::centerline::extract_centerline;
use crate::config::ReconstructionConfig;
use crate::error::Result;
use crate::result::{assemble, ReconstructionResult, ResultMetadata, StructureResult, StructureStatus};
use crate::surface::extract_surface;
use crate::volume::{load_volume, LabelMask, MaskSlice};

/// Runs the whole reconstruction with the deadline taken from `config`.
pub fn run_reconstruction(slices: Vec<MaskSlice>, config: &ReconstructionConfig) -> Result<ReconstructionResult> {
    let cancel = CancellationToken::with_deadline(config.deadline);
    run_reconstruction_with_cancel(slices, config, &cancel)
}

/// Same as [`run_reconstruction`] with a caller-held token, so the run can be
/// stopped from another thread.
///
/// Fails only on input or configuration problems; everything that goes wrong
/// inside a single structure ends up as that structure's status.
pub fn run_reconstruction_with_cancel(
    slices: Vec<MaskSlice>,
    config: &ReconstructionConfig,
    cancel: &CancellationToken,
) -> Result<ReconstructionResult> {
    config.validate()?;
    let volume = load_volume(slices)?;

    let present = volume.labels_present();
    let mut warnings = Vec::new();
    let mut jobs: Vec<(String, LabelMask)> = Vec::new();
    for &label in &present {
        match config.structure_name(label) {
            Some(name) => {
                if let Some(mask) = volume.label_mask(label) {
                    jobs.push((name.to_string(), mask));
                }
            }
            None => {
                let message = format!("label {} is present in the masks but not mapped to a structure", label);
                warn!("{}", message);
                warnings.push(message);
            }
        }
    }
    for (name, label) in &config.label_id_map {
        if !present.contains(label) {
            warnings.push(format!("structure '{}' (label {}) not found in the masks", name, label));
        }
    }

    let metadata = ResultMetadata {
        spacing: volume.spacing(),
        origin: volume.origin(),
        dims: volume.dims(),
        fingerprint: volume.fingerprint(),
        warnings,
    };
    drop(volume);
    info!("reconstructing {} structure(s)", jobs.len());

    let outcomes = thread::scope(|s| {
        let handles: Vec<_> = jobs
            .into_iter()
            .map(|(name, mask)| {
                let label = mask.label;
                let task_name = name.clone();
                let handle = s.spawn(move |_| process_structure(&task_name, mask, config, cancel));
                (name, label, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(name, label, handle)| {
                handle.join().unwrap_or_else(|_| {
                    error!("task for '{}' panicked", name);
                    let mut result = StructureResult::new(&name, label);
                    result.status = StructureStatus::Omitted;
                    result.reasons.push("structure task panicked".into());
                    result
                })
            })
            .collect::<Vec<_>>()
    })
    .unwrap_or_else(|_| {
        error!("structure task scope panicked");
        Vec::new()
    });

    Ok(assemble(outcomes, metadata))
}

/// One structure from mask to markers; never fails, errors become the status.
fn process_structure(
    name: &str,
    mask: LabelMask,
    config: &ReconstructionConfig,
    cancel: &CancellationToken,
) -> StructureResult {
    let mut result = StructureResult::new(name, mask.label);
    if let Err(e) = run_stages(&mut result, mask, config, cancel) {
        warn!("{} (label {}): {}", name, result.label, e);
        result.record_failure(&e);
    }
    info!("{} (label {}): {:?}", name, result.label, result.status);
    result
}

fn run_stages(
    result: &mut StructureResult,
    mask: LabelMask,
    config: &ReconstructionConfig,
    cancel: &CancellationToken,
) -> Result<()> {
    cancel.check("structure start")?;
    let extraction = extract_surface(mask, config, cancel)?;
    result.warnings.extend(extraction.warnings);
    result.fragments = Some(extraction.fragments);
    result.surface_metrics = Some(extraction.surface.metrics());
    let surface = result.surface.insert(extraction.surface);

    let centerline = extract_centerline(surface, config, cancel)?;
    let metrics = analyze_centerline(&centerline, config);
    result.centerline = Some(centerline);
    result.metrics = Some(metrics?);
    Ok(())
}
