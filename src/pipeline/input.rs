//! Input resolution: classify a user-supplied path and validate it.
//!
//! Classification happens before any decoding so an unsupported file is
//! rejected with [`LayoutError::UnsupportedFileType`] without partial work.
//! PDFs are checked for the `%PDF` magic so callers get a meaningful error
//! rather than a pdfium parse failure.

use crate::error::{DocumentOpenError, LayoutError};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Media families the surrounding system accepts for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Text,
    Image,
    Audio,
    Video,
}

/// Accepted extensions per media family, lowercase with the leading dot.
pub const ALLOWED_FILE_EXTENSIONS: &[(MediaKind, &[&str])] = &[
    (MediaKind::Text, &[".txt", ".pdf", ".doc", ".docx", ".csv"]),
    (MediaKind::Image, &[".jpg", ".jpeg", ".png"]),
    (MediaKind::Audio, &[".wav", ".mp3"]),
    (MediaKind::Video, &[".aac", ".mp4"]),
];

/// What the layout pipeline can do with a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    /// Paginated PDF, rasterised page by page.
    Pdf(PathBuf),
    /// Single raster image, processed as a one-page document.
    Image(PathBuf),
}

impl InputKind {
    pub fn path(&self) -> &Path {
        match self {
            InputKind::Pdf(p) | InputKind::Image(p) => p,
        }
    }
}

/// Lowercase extension with a leading dot, or an empty string.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Media family of `path`, or `None` if the extension is not accepted at all.
pub fn media_kind(path: &Path) -> Option<MediaKind> {
    let ext = extension_of(path);
    ALLOWED_FILE_EXTENSIONS
        .iter()
        .find(|(_, exts)| exts.contains(&ext.as_str()))
        .map(|(kind, _)| *kind)
}

/// Resolve `path` to something the layout pipeline can open.
///
/// Only `.pdf` and the image extensions are processable; every other
/// extension, including accepted-but-not-paginated ones such as `.docx` or
/// `.mp3`, is an [`LayoutError::UnsupportedFileType`].
pub fn resolve_input(path: &Path) -> Result<InputKind, LayoutError> {
    let ext = extension_of(path);
    let kind = match (media_kind(path), ext.as_str()) {
        (Some(MediaKind::Text), ".pdf") => InputKind::Pdf(path.to_path_buf()),
        (Some(MediaKind::Image), _) => InputKind::Image(path.to_path_buf()),
        _ => {
            return Err(LayoutError::UnsupportedFileType {
                path: path.to_path_buf(),
                extension: ext,
            })
        }
    };

    let magic = read_magic(path)?;
    if let InputKind::Pdf(_) = kind {
        if let Some(magic) = magic {
            if &magic != b"%PDF" {
                return Err(DocumentOpenError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                }
                .into());
            }
        }
    }

    debug!("Resolved input {:?}", kind);
    Ok(kind)
}

/// First four bytes, or `None` for files shorter than that.
fn read_magic(path: &Path) -> Result<Option<[u8; 4]>, DocumentOpenError> {
    if !path.exists() {
        return Err(DocumentOpenError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            Ok(f.read_exact(&mut magic).ok().map(|_| magic))
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(DocumentOpenError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => Err(DocumentOpenError::FileNotFound {
            path: path.to_path_buf(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_media_kind() {
        assert_eq!(media_kind(Path::new("a/report.PDF")), Some(MediaKind::Text));
        assert_eq!(media_kind(Path::new("scan.jpeg")), Some(MediaKind::Image));
        assert_eq!(media_kind(Path::new("talk.mp3")), Some(MediaKind::Audio));
        assert_eq!(media_kind(Path::new("clip.mp4")), Some(MediaKind::Video));
        assert_eq!(media_kind(Path::new("clip.mkv")), None);
        assert_eq!(media_kind(Path::new("README")), None);
    }

    #[test]
    fn test_unsupported_before_io() {
        // The file does not exist; classification must fail first.
        let err = resolve_input(Path::new("/nonexistent/notes.docx")).unwrap_err();
        assert!(matches!(err, LayoutError::UnsupportedFileType { ref extension, .. } if extension == ".docx"));
    }

    #[test]
    fn test_missing_pdf() {
        let err = resolve_input(Path::new("/nonexistent/report.pdf")).unwrap_err();
        assert!(matches!(
            err,
            LayoutError::DocumentOpen(DocumentOpenError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_bad_magic() {
        let mut f = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        f.write_all(b"GIF89a").unwrap();
        let err = resolve_input(f.path()).unwrap_err();
        assert!(matches!(
            err,
            LayoutError::DocumentOpen(DocumentOpenError::NotAPdf { magic, .. }) if &magic == b"GIF8"
        ));
    }

    #[test]
    fn test_pdf_and_image_resolve() {
        let mut pdf = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        pdf.write_all(b"%PDF-1.7\n").unwrap();
        assert!(matches!(resolve_input(pdf.path()).unwrap(), InputKind::Pdf(_)));

        let png = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        assert!(matches!(resolve_input(png.path()).unwrap(), InputKind::Image(_)));
    }
}
