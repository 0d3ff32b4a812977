//! Page Rasterizer: turn an input file into an in-memory [`Document`].
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! `tokio::task::spawn_blocking` moves the work onto a dedicated blocking
//! thread so Tokio workers never stall during CPU-heavy rendering.
//!
//! ## Scale and pixel cap
//!
//! Every page is oversampled by `scale_factor` in both axes (2.0 by default),
//! then capped at `max_rendered_pixels` per edge so an A0 poster cannot
//! allocate a 12,000 × 17,000 px bitmap. Region coordinates downstream are in
//! this rendered pixel space.

use crate::config::PipelineConfig;
use crate::document::Document;
use crate::error::{DocumentOpenError, LayoutError};
use crate::output::DocumentMetadata;
use crate::pipeline::input::InputKind;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit pdfium shared library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Rasterise `input` into a [`Document`].
///
/// PDFs are rendered page by page; raster images become a one-page document
/// at their native resolution.
pub async fn load_document(
    input: &InputKind,
    config: &PipelineConfig,
) -> Result<Document, LayoutError> {
    match input {
        InputKind::Pdf(path) => render_document(path, config).await,
        InputKind::Image(path) => load_image_document(path).await,
    }
}

/// Rasterise every page of a PDF.
pub async fn render_document(
    pdf_path: &Path,
    config: &PipelineConfig,
) -> Result<Document, LayoutError> {
    let path = pdf_path.to_path_buf();
    let scale = config.scale_factor;
    let max_pixels = config.max_rendered_pixels;
    let password = config.password.clone();

    tokio::task::spawn_blocking(move || {
        render_document_blocking(&path, scale, max_pixels, password.as_deref())
    })
    .await
    .map_err(|e| LayoutError::Internal(format!("Render task panicked: {}", e)))?
}

fn render_document_blocking(
    pdf_path: &Path,
    scale: f32,
    max_pixels: u32,
    password: Option<&str>,
) -> Result<Document, LayoutError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| open_error(pdf_path, password, e))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(scale)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut images = Vec::with_capacity(total_pages);
    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            DocumentOpenError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image().to_rgb8();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(image);
    }

    Ok(Document::from_images(pdf_path, images))
}

/// Decode a raster image into a one-page document.
pub async fn load_image_document(path: &Path) -> Result<Document, LayoutError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let image = image::open(&path).map_err(|e| DocumentOpenError::ImageDecode {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        let rgb = image.to_rgb8();
        debug!(
            "Loaded image {} → {}x{} px",
            path.display(),
            rgb.width(),
            rgb.height()
        );
        Ok(Document::from_images(path, vec![rgb]))
    })
    .await
    .map_err(|e| LayoutError::Internal(format!("Image decode task panicked: {}", e)))?
}

/// Extract document metadata from a PDF without rendering pages.
pub async fn extract_metadata(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, LayoutError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(|s| s.to_string());

    tokio::task::spawn_blocking(move || extract_metadata_blocking(&path, pwd.as_deref()))
        .await
        .map_err(|e| LayoutError::Internal(format!("Metadata task panicked: {}", e)))?
}

fn extract_metadata_blocking(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, LayoutError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| open_error(pdf_path, password, e))?;

    let metadata = document.metadata();
    let pages = document.pages();

    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };

    Ok(DocumentMetadata {
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
        subject: get_meta(PdfDocumentMetadataTagType::Subject),
        creator: get_meta(PdfDocumentMetadataTagType::Creator),
        producer: get_meta(PdfDocumentMetadataTagType::Producer),
        creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
        modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
        page_count: pages.len() as usize,
        pdf_version: format!("{:?}", document.version()),
    })
}

/// Bind pdfium from `PDFIUM_LIB_PATH`, the working directory, or the system.
fn bind_pdfium() -> Result<Pdfium, LayoutError> {
    let bindings = match std::env::var(PDFIUM_LIB_PATH_ENV) {
        Ok(lib) if !lib.is_empty() => Pdfium::bind_to_library(PathBuf::from(&lib)),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| LayoutError::PdfiumBindingFailed(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

/// Map a pdfium load failure onto the open-error taxonomy.
fn open_error(pdf_path: &Path, password: Option<&str>, e: PdfiumError) -> LayoutError {
    let err_str = format!("{:?}", e);
    let path = pdf_path.to_path_buf();
    let err = if err_str.contains("Password") || err_str.contains("password") {
        if password.is_some() {
            DocumentOpenError::WrongPassword { path }
        } else {
            DocumentOpenError::PasswordRequired { path }
        }
    } else {
        DocumentOpenError::CorruptPdf {
            path,
            detail: err_str,
        }
    };
    err.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[tokio::test]
    async fn image_becomes_one_page_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        RgbImage::from_pixel(30, 20, Rgb([200, 200, 200]))
            .save(&path)
            .unwrap();

        let doc = load_image_document(&path).await.unwrap();
        assert_eq!(doc.page_count(), 1);
        assert_eq!(doc.pages[0].index, 0);
        assert_eq!((doc.pages[0].width(), doc.pages[0].height()), (30, 20));
        assert_eq!(doc.stem(), "scan");
    }

    #[tokio::test]
    async fn undecodable_image_is_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not a jpeg").unwrap();

        let err = load_image_document(&path).await.unwrap_err();
        assert!(matches!(
            err,
            LayoutError::DocumentOpen(DocumentOpenError::ImageDecode { .. })
        ));
    }
}
