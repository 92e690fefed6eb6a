use anyhow::{Context, Result};
use csv::Writer;
use log::info;
use nalgebra::{Point3, Vector3};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::analysis::{Disc, VesselMetrics};
use crate::centerline::Centerline;
use crate::result::ReconstructionResult;
use crate::surface::Surface;

/// Writes a triangle mesh with per-vertex normals as Wavefront OBJ.
fn write_obj<P: AsRef<Path>>(
    path: P,
    name: &str,
    vertices: &[Point3<f64>],
    normals: &[Vector3<f64>],
    triangles: &[[u32; 3]],
) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "o {}", name)?;
    for v in vertices {
        writeln!(writer, "v {} {} {}", v.x, v.y, v.z)?;
    }
    for n in normals {
        writeln!(writer, "vn {} {} {}", n.x, n.y, n.z)?;
    }
    // OBJ indices are 1-based
    for t in triangles {
        let (a, b, c) = (t[0] + 1, t[1] + 1, t[2] + 1);
        writeln!(writer, "f {}//{} {}//{} {}//{}", a, a, b, b, c, c)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_surface_obj<P: AsRef<Path>>(surface: &Surface, name: &str, path: P) -> Result<()> {
    write_obj(path, name, &surface.vertices, &surface.vertex_normals(), &surface.triangles)
}

pub fn write_disc_obj<P: AsRef<Path>>(disc: &Disc, name: &str, path: P) -> Result<()> {
    let normals = vec![disc.normal; disc.vertices.len()];
    write_obj(path, name, &disc.vertices, &normals, &disc.triangles)
}

#[derive(Debug, Serialize)]
struct CenterlineRow {
    index: usize,
    x: f64,
    y: f64,
    z: f64,
    radius: f64,
    arc_length: f64,
    diameter: f64,
}

/// One row per centerline point, proximal first, with the diameter profile.
pub fn write_centerline_csv<P: AsRef<Path>>(centerline: &Centerline, path: P) -> Result<()> {
    let path = path.as_ref();
    let mut wtr = Writer::from_path(path).with_context(|| format!("failed to create {}", path.display()))?;
    let arc_lengths = centerline.arc_lengths();
    for (i, (p, arc_length)) in centerline.points.iter().zip(arc_lengths).enumerate() {
        wtr.serialize(CenterlineRow {
            index: i,
            x: p.position.x,
            y: p.position.y,
            z: p.position.z,
            radius: p.radius,
            arc_length,
            diameter: 2.0 * p.radius,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct MetricsRow<'a> {
    structure: &'a str,
    length: f64,
    endpoint_distance: f64,
    tortuosity: f64,
    coverage: f64,
    diameter_min: f64,
    diameter_mean: f64,
    diameter_median: f64,
    diameter_max: f64,
    max_arc_length: f64,
    max_x: f64,
    max_y: f64,
    max_z: f64,
}

/// Summary table with one row per structure that has markers.
pub fn write_metrics_csv<P: AsRef<Path>>(metrics: &[(&str, &VesselMetrics)], path: P) -> Result<()> {
    let path = path.as_ref();
    let mut wtr = Writer::from_path(path).with_context(|| format!("failed to create {}", path.display()))?;
    for &(structure, m) in metrics {
        let marker = &m.max_diameter;
        wtr.serialize(MetricsRow {
            structure,
            length: m.length,
            endpoint_distance: m.endpoint_distance,
            tortuosity: m.tortuosity,
            coverage: m.centerline_coverage,
            diameter_min: m.stats.min,
            diameter_mean: m.stats.mean,
            diameter_median: m.stats.median,
            diameter_max: m.stats.max,
            max_arc_length: marker.arc_length,
            max_x: marker.position.x,
            max_y: marker.position.y,
            max_z: marker.position.z,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_result_json<P: AsRef<Path>>(result: &ReconstructionResult, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), result)
        .with_context(|| format!("failed to serialize result to {}", path.display()))?;
    Ok(())
}

/// Writes everything a reviewer needs into `dir`:
///
/// - `result.json` with the complete result
/// - `<structure>_surface.obj` for every reconstructed surface
/// - `<structure>_centerline.csv` for every centerline
/// - `<structure>_max_diameter.obj` for every max-diameter marker
/// - `metrics.csv` with one summary row per measured structure
pub fn write_result<P: AsRef<Path>>(result: &ReconstructionResult, dir: P) -> Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let mut measured = Vec::new();
    for structure in &result.structures {
        let name = structure.name.as_str();
        if let Some(surface) = &structure.surface {
            write_surface_obj(surface, name, dir.join(format!("{}_surface.obj", name)))?;
        }
        if let Some(centerline) = &structure.centerline {
            write_centerline_csv(centerline, dir.join(format!("{}_centerline.csv", name)))?;
        }
        if let Some(metrics) = &structure.metrics {
            write_disc_obj(
                &metrics.max_diameter.disc,
                &format!("{}_max_diameter", name),
                dir.join(format!("{}_max_diameter.obj", name)),
            )?;
            measured.push((name, metrics));
        }
    }
    write_metrics_csv(&measured, dir.join("metrics.csv"))?;
    write_result_json(result, dir.join("result.json"))?;
    info!("wrote {} structure(s) to {}", result.structures.len(), dir.display());
    Ok(())
}
