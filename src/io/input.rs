use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use image::DynamicImage;
use log::{debug, info};
use nalgebra::Point3;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::volume::{MaskSlice, SliceMetadata};

/// Slice table expected next to the mask images.
pub const SLICES_FILE: &str = "slices.csv";

/// Utility: detect whether the file uses comma or tab as delimiter.
fn detect_delimiter<P: AsRef<Path>>(path: P) -> Result<u8> {
    let file = File::open(&path)
        .with_context(|| format!("failed to open {:?} for delimiter sniffing", path.as_ref()))?;
    let mut reader = BufReader::new(file);
    let mut first_line = String::new();
    reader
        .read_line(&mut first_line)
        .context("failed to read first line for delimiter detection")?;

    let tabs = first_line.matches('\t').count();
    let commas = first_line.matches(',').count();
    Ok(if tabs > commas { b'\t' } else { b',' })
}

/// One row of `slices.csv`: the mask image and where the slice sits.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SliceRecord {
    pub file: String,
    pub row_spacing: f64,
    pub col_spacing: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

pub fn read_slice_records<P: AsRef<Path>>(path: P) -> Result<Vec<SliceRecord>> {
    let delim = detect_delimiter(&path)?;
    let file = File::open(&path)?;
    let mut reader = ReaderBuilder::new()
        .delimiter(delim)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut records = Vec::new();
    for (i, result) in reader.deserialize().enumerate() {
        let record: SliceRecord =
            result.with_context(|| format!("bad row {} in {:?}", i + 1, path.as_ref()))?;
        records.push(record);
    }
    Ok(records)
}

/// Reads a grayscale label image; pixel values are label ids.
///
/// Only 8- and 16-bit single channel images are accepted so that label ids
/// are never rescaled by a color conversion.
pub fn read_label_image<P: AsRef<Path>>(path: P) -> Result<(usize, usize, Vec<u16>)> {
    let path = path.as_ref();
    let img = image::open(path).with_context(|| format!("failed to open mask {}", path.display()))?;
    let (cols, rows) = (img.width() as usize, img.height() as usize);
    let labels = match img {
        DynamicImage::ImageLuma8(buf) => buf.into_raw().into_iter().map(u16::from).collect(),
        DynamicImage::ImageLuma16(buf) => buf.into_raw(),
        other => bail!(
            "mask {} must be 8- or 16-bit grayscale, found {:?}",
            path.display(),
            other.color()
        ),
    };
    Ok((rows, cols, labels))
}

/// Loads every slice listed in `<dir>/slices.csv`, in file order.
///
/// Image paths in the table are relative to `dir`.
pub fn load_slices<P: AsRef<Path>>(dir: P) -> Result<Vec<MaskSlice>> {
    let dir = dir.as_ref();
    let table = dir.join(SLICES_FILE);
    let records = read_slice_records(&table)
        .with_context(|| format!("failed to read slice table {}", table.display()))?;
    if records.is_empty() {
        bail!("slice table {} lists no slices", table.display());
    }

    let mut slices = Vec::with_capacity(records.len());
    for record in records {
        let (rows, cols, labels) = read_label_image(dir.join(&record.file))?;
        debug!("read {} ({} x {})", record.file, rows, cols);
        slices.push(MaskSlice::new(
            rows,
            cols,
            labels,
            SliceMetadata {
                pixel_spacing: (record.row_spacing, record.col_spacing),
                position: Point3::new(record.x, record.y, record.z),
            },
        ));
    }
    info!("loaded {} slices from {}", slices.len(), dir.display());
    Ok(slices)
}

#[cfg(test)]
mod input_tests {
    use super::*;
    use image::{ImageBuffer, Luma};
    use std::io::Write;

    fn write_mask_u8(path: &Path, pixels: &[u8], cols: u32, rows: u32) {
        let img: ImageBuffer<Luma<u8>, Vec<u8>> = ImageBuffer::from_raw(cols, rows, pixels.to_vec()).unwrap();
        img.save(path).unwrap();
    }

    #[test]
    fn test_load_slices_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_mask_u8(&dir.path().join("s0.png"), &[0, 1, 2, 0, 0, 3], 3, 2);
        write_mask_u8(&dir.path().join("s1.png"), &[0, 0, 0, 1, 1, 1], 3, 2);
        let mut table = File::create(dir.path().join(SLICES_FILE)).unwrap();
        writeln!(table, "file,row_spacing,col_spacing,x,y,z").unwrap();
        writeln!(table, "s0.png,0.8,0.7,-10.0,5.0,30.0").unwrap();
        writeln!(table, "s1.png,0.8,0.7,-10.0,5.0,32.5").unwrap();
        drop(table);

        let slices = load_slices(dir.path()).unwrap();
        assert_eq!(slices.len(), 2);
        assert_eq!((slices[0].rows, slices[0].cols), (2, 3));
        assert_eq!(slices[0].labels, vec![0, 1, 2, 0, 0, 3]);
        assert_eq!(slices[1].metadata.pixel_spacing, (0.8, 0.7));
        assert_eq!(slices[1].metadata.position, Point3::new(-10.0, 5.0, 32.5));
    }

    #[test]
    fn test_sixteen_bit_labels_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.png");
        let img: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_raw(2, 1, vec![300, 0]).unwrap();
        img.save(&path).unwrap();
        let (rows, cols, labels) = read_label_image(&path).unwrap();
        assert_eq!((rows, cols), (1, 2));
        assert_eq!(labels, vec![300, 0]);
    }

    #[test]
    fn test_tab_separated_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SLICES_FILE);
        std::fs::write(&path, "file\trow_spacing\tcol_spacing\tx\ty\tz\na.png\t1\t1\t0\t0\t2\n").unwrap();
        let records = read_slice_records(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].file, "a.png");
        assert_eq!(records[0].z, 2.0);
    }

    #[test]
    fn test_missing_table_has_context() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_slices(dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains(SLICES_FILE));
    }
}
