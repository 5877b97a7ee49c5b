//! Stencil generation pipeline
//!
//! ```text
//! paste files ─ rasterize ─ QFN ─ offset ─┐
//!                                         ├─ output mode ─ locators ─ backend ─ STL
//! outline file ─ reconstruct (fallback) ──┘
//! ```
//!
//! Each request runs synchronously on the calling thread. The cancellation
//! flag is polled between stages.

use crate::files::find_files;
use geo::{BooleanOps, BoundingRect};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;
use stencilforge_core::{CancelFlag, Error, GeometryError, MultiPolygon, Result, StencilTrace};
use stencilforge_geometry::{
    buffer, polygon, rasterize, read_layer, LocatorBuilder, OutlineReconstructor, QfnRegenerator,
    RasterSettings,
};
use stencilforge_mesh::{backend_for, ExportInput};
use stencilforge_settings::{OutputMode, StencilConfig};
use tracing::info;

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn raster_settings(config: &StencilConfig) -> RasterSettings {
    RasterSettings {
        arc_steps: config.arc_steps,
        curve_resolution: config.curve_resolution,
    }
}

/// Rasterize and union every paste file
fn load_paste(files: &[PathBuf], raster: &RasterSettings) -> Result<MultiPolygon<f64>> {
    let mut layers = Vec::with_capacity(files.len());
    for path in files {
        let layer = read_layer(path)?.into_millimeters();
        layers.push(rasterize(&layer.primitives, raster));
    }
    let paste = polygon::union_many(layers);
    if polygon::area(&paste) <= 0.0 {
        return Err(GeometryError::EmptyLayer {
            layer: "paste".to_string(),
        }
        .into());
    }
    Ok(paste)
}

/// Paste bounding box grown by `margin`
pub fn outline_from_paste(paste: &MultiPolygon<f64>, margin: f64) -> Result<MultiPolygon<f64>> {
    let rect = paste.bounding_rect().ok_or_else(|| GeometryError::EmptyRegion {
        stage: "outline fallback".to_string(),
    })?;
    let (min, max) = (rect.min(), rect.max());
    Ok(MultiPolygon::new(vec![polygon::rect_polygon(
        min.x - margin,
        min.y - margin,
        max.x + margin,
        max.y + margin,
    )]))
}

/// Generate a stencil STL at `output` from the Gerber files in `input_dir`
///
/// QFN regeneration, outline reconstruction and the watertight rebuild
/// degrade instead of failing; the returned trace records what happened.
pub fn generate_stencil(
    input_dir: &Path,
    output: &Path,
    config: &StencilConfig,
    cancel: &CancelFlag,
) -> Result<StencilTrace> {
    config.validate()?;
    let started = Instant::now();
    let raster = raster_settings(config);
    let mut trace = StencilTrace::default();
    info!("Generating stencil from {}", input_dir.display());
    info!("Output STL: {}", output.display());

    // Paste
    cancel.checkpoint("paste")?;
    let stage = Instant::now();
    let paste_files = find_files(input_dir, &config.paste_patterns)?;
    if paste_files.is_empty() {
        return Err(Error::MissingLayer {
            layer: "paste".to_string(),
            dir: input_dir.to_path_buf(),
        });
    }
    trace.paste_files = paste_files.iter().map(|p| file_name(p)).collect();
    info!("Paste layers: {}", trace.paste_files.join(", "));
    let mut paste = load_paste(&paste_files, &raster)?;
    info!(
        "Paste region: {} polygon(s), {:.3} mm2 in {:.2?}",
        paste.0.len(),
        polygon::area(&paste),
        stage.elapsed()
    );

    if config.qfn.enabled {
        cancel.checkpoint("qfn")?;
        let regenerator = QfnRegenerator::new(&config.qfn);
        match panic::catch_unwind(AssertUnwindSafe(|| regenerator.regenerate(&paste))) {
            Ok((regenerated, report)) => {
                paste = regenerated;
                trace.qfn = Some(report);
            }
            Err(_) => trace.degrade("qfn", "regeneration panicked; paste left unchanged"),
        }
    }

    cancel.checkpoint("paste_offset")?;
    paste = buffer(&paste, config.paste_offset_mm, config.curve_resolution);
    if polygon::area(&paste) <= 0.0 {
        return Err(GeometryError::EmptyAfterOffset {
            offset_mm: config.paste_offset_mm,
        }
        .into());
    }
    info!("Paste offset: {} mm", config.paste_offset_mm);

    // Outline
    cancel.checkpoint("outline")?;
    let stage = Instant::now();
    let mut outline = None;
    let outline_files = find_files(input_dir, &config.outline_patterns)?;
    if let Some(path) = outline_files.first() {
        trace.outline_file = Some(file_name(path));
        info!("Outline layer: {}", file_name(path));
        let layer = read_layer(path)?.into_millimeters();
        let board = OutlineReconstructor::new(&config.outline, raster).reconstruct(&layer.primitives)?;
        let area = board.area();
        if area <= 0.0 {
            return Err(GeometryError::OutlineReconstruction {
                reason: format!("{} encloses no area", file_name(path)),
                eps_mm: board.trace.eps_mm,
                arc_err_mm: board.trace.arc_chord_error_mm,
                raw_segments: board.trace.raw_segments,
                deduped_segments: board.trace.deduped_segments,
                buffer_fallback: config.outline.buffer_fallback,
            }
            .into());
        }
        trace.outline = Some(board.trace);
        outline = Some(board.region);
    }
    let outline = match outline {
        Some(outline) => outline,
        None => {
            info!("Outline fallback margin: {} mm", config.outline_margin_mm);
            outline_from_paste(&paste, config.outline_margin_mm)?
        }
    };
    info!(
        "Outline: {:.3} mm2 in {:.2?}",
        polygon::area(&outline),
        stage.elapsed()
    );

    // Stencil plane
    info!("Output mode: {}", config.output_mode);
    let mut stencil = match config.output_mode {
        OutputMode::HolesOnly => paste,
        OutputMode::SolidWithCutouts => {
            let plate = outline.difference(&paste);
            let holes: usize = plate.0.iter().map(|p| p.interiors().len()).sum();
            info!(
                "Stencil 2D: {} polygon(s), area={:.6} holes={}",
                plate.0.len(),
                polygon::area(&plate),
                holes
            );
            plate
        }
    };

    cancel.checkpoint("locator")?;
    let locators = LocatorBuilder::new(&config.locator, config.curve_resolution).build(&outline);
    if let Some(bridge) = &locators.bridge {
        stencil = polygon::union_many([stencil, bridge.clone()]);
    }
    info!("Base thickness: {} mm", config.thickness_mm);

    // Mesh
    cancel.checkpoint("mesh")?;
    let stage = Instant::now();
    let backend = backend_for(config.model_backend);
    info!("Mesh backend: {} ({})", backend.name(), backend.description());
    let input = ExportInput::new(&stencil).with_locators(&locators);
    let summary = backend.export(&input, config, output)?;
    info!("Mesh and export in {:.2?}", stage.elapsed());

    trace.degradations.extend(summary.degradations);
    trace.mesh = Some(summary.report);
    trace.stl_bytes = summary.stl.bytes;
    trace.stl_faces = summary.stl.faces;
    info!(
        "Stencil complete: {} bytes, {} faces in {:.2?}",
        trace.stl_bytes,
        trace.stl_faces,
        started.elapsed()
    );
    Ok(trace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::Area;

    #[test]
    fn test_outline_from_paste_margin() {
        let paste = MultiPolygon::new(vec![
            polygon::rect_polygon(10.0, 10.0, 12.0, 11.0),
            polygon::rect_polygon(20.0, 14.0, 21.0, 15.0),
        ]);
        let outline = outline_from_paste(&paste, 5.0).unwrap();
        assert_relative_eq!(outline.unsigned_area(), 21.0 * 15.0, epsilon = 1e-9);
    }

    #[test]
    fn test_outline_from_empty_paste() {
        let err = outline_from_paste(&MultiPolygon::new(vec![]), 5.0).unwrap_err();
        assert!(err.is_input_geometry());
    }
}
