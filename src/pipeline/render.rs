//! Document rasterisation: every page of the uploaded PDF becomes a PNG
//! artifact in the run's temp workspace.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async
//! contexts. `tokio::task::spawn_blocking` moves the work onto a dedicated
//! thread-pool thread designed for blocking operations, preventing the Tokio
//! worker threads from stalling during CPU-heavy rendering.
//!
//! ## Why cap pixels, not DPI?
//!
//! Page sizes vary: a poster-sized attachment at 300 DPI would produce a
//! 10 000+ px image. `max_rendered_pixels` caps the longest edge regardless
//! of physical size, keeping memory bounded while ordinary A4 lab reports
//! still render at scanner quality.

use std::path::{Path, PathBuf};

use image::ImageFormat;
use pdfium_render::prelude::*;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::IngestError;

/// One rendered page artifact.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 1-indexed page number.
    pub page: usize,
    /// PNG artifact inside the run workspace.
    pub path: PathBuf,
}

/// Rasterise every page of `pdf_bytes` into PNG files under `workdir`.
///
/// Any failure here is fatal for the run: without page images there is
/// nothing downstream to extract from.
pub async fn render_document(
    pdf_bytes: &[u8],
    filename: &str,
    workdir: &Path,
    config: &PipelineConfig,
) -> Result<Vec<PageImage>, IngestError> {
    let pdf_path = workdir.join(format!("upload_{filename}"));
    tokio::fs::write(&pdf_path, pdf_bytes)
        .await
        .map_err(|e| IngestError::Workspace(format!("writing temp PDF: {e}")))?;

    let out_dir = workdir.to_path_buf();
    let dpi = config.dpi;
    let max_pixels = config.max_rendered_pixels;
    let source = filename.to_string();

    let pages = tokio::task::spawn_blocking(move || {
        render_document_blocking(&pdf_path, &out_dir, dpi, max_pixels, &source)
    })
    .await
    .map_err(|e| IngestError::Internal(format!("Render task panicked: {e}")))??;

    info!("Converted {} pages to images for '{filename}'", pages.len());
    Ok(pages)
}

/// Blocking implementation of page rendering.
fn render_document_blocking(
    pdf_path: &Path,
    out_dir: &Path,
    dpi: u32,
    max_pixels: u32,
    filename: &str,
) -> Result<Vec<PageImage>, IngestError> {
    let pdfium = Pdfium::default();

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| IngestError::ConversionFailed {
            filename: filename.to_string(),
            detail: format!("{e:?}"),
        })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    debug!("Document loaded: {total_pages} pages");

    let mut results = Vec::with_capacity(total_pages);

    for idx in 0..total_pages {
        let page_num = idx + 1;
        let page = pages
            .get(idx as u16)
            .map_err(|e| IngestError::ConversionFailed {
                filename: filename.to_string(),
                detail: format!("page {page_num}: {e:?}"),
            })?;

        // Page width is in points (1/72 in); convert to pixels at the
        // configured DPI, then apply the hard pixel cap.
        let width_px = ((page.width().value / 72.0) * dpi as f32).round() as u32;
        let target_width = width_px.clamp(1, max_pixels);
        let render_config = PdfRenderConfig::new()
            .set_target_width(target_width as i32)
            .set_maximum_height(max_pixels as i32);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| IngestError::ConversionFailed {
                filename: filename.to_string(),
                detail: format!("page {page_num}: {e:?}"),
            })?;

        let image = bitmap.as_image();
        let path = out_dir.join(format!("medical_page_{page_num}.png"));
        image
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|e| IngestError::ConversionFailed {
                filename: filename.to_string(),
                detail: format!("saving page {page_num}: {e}"),
            })?;

        debug!(
            "Rendered page {page_num} -> {}x{} px at {}",
            image.width(),
            image.height(),
            path.display()
        );
        results.push(PageImage {
            page: page_num,
            path,
        });
    }

    Ok(results)
}
