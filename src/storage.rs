//! Storage collaborators: where artifacts and results go.
//!
//! The pipeline never touches the filesystem directly for its outputs. Figure
//! crops and annotated previews go to an [`ArtifactStore`]; finished
//! [`DocumentResult`]s go to a [`ResultStore`] keyed by `(project, filename)`.
//! Both are async traits so an object store or database can stand in for the
//! filesystem implementations shipped here.
//!
//! ## Atomic writes
//!
//! [`FsResultStore`] and [`FsArtifactStore`] write to `<path>.tmp` and rename,
//! so a crash mid-write never leaves a truncated JSON file that a later
//! correction would fail to parse.

use crate::error::StoreError;
use crate::output::{DocumentResult, RecognitionResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Side-channel sink for binary artifacts (PNG previews, figure crops).
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under `name` (a relative, `/`-separated key) and return
    /// the location it can be read back from.
    async fn write_artifact(&self, name: &str, bytes: Vec<u8>) -> Result<String, StoreError>;

    async fn read_artifact(&self, name: &str) -> Result<Vec<u8>, StoreError>;
}

/// Persistence for finished results, with in-place correction.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn save(
        &self,
        project: &str,
        filename: &str,
        result: &DocumentResult,
    ) -> Result<(), StoreError>;

    async fn load(&self, project: &str, filename: &str) -> Result<DocumentResult, StoreError>;

    /// Replace every page's `layout_dets`, keeping `page_info` untouched.
    ///
    /// `layout_dets` must have one entry per stored page.
    async fn update_layout_dets(
        &self,
        project: &str,
        filename: &str,
        layout_dets: Vec<Vec<RecognitionResult>>,
    ) -> Result<DocumentResult, StoreError> {
        let mut result = self.load(project, filename).await?;
        apply_layout_dets(&mut result, layout_dets)?;
        self.save(project, filename, &result).await?;
        Ok(result)
    }

    /// Correct the text of a single entry.
    async fn update_entry_text(
        &self,
        project: &str,
        filename: &str,
        page: usize,
        index: usize,
        text: String,
    ) -> Result<DocumentResult, StoreError> {
        let mut result = self.load(project, filename).await?;
        let entry = result
            .pages
            .get_mut(page)
            .and_then(|p| p.layout_dets.get_mut(index))
            .ok_or(StoreError::EntryOutOfRange { page, index })?;
        entry.text = text;
        self.save(project, filename, &result).await?;
        Ok(result)
    }
}

/// Swap in corrected `layout_dets`; page count must match.
pub fn apply_layout_dets(
    result: &mut DocumentResult,
    layout_dets: Vec<Vec<RecognitionResult>>,
) -> Result<(), StoreError> {
    if layout_dets.len() != result.pages.len() {
        return Err(StoreError::PageCountMismatch {
            expected: result.pages.len(),
            got: layout_dets.len(),
        });
    }
    for (page, dets) in result.pages.iter_mut().zip(layout_dets) {
        page.layout_dets = dets;
    }
    Ok(())
}

/// A project or file key. Keys become single path components.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let bad = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0']);
    if bad {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// An artifact name: relative, `/`-separated, no `..` or root components.
pub fn validate_artifact_name(name: &str) -> Result<(), StoreError> {
    let path = Path::new(name);
    let ok = !name.is_empty()
        && !name.contains(['\\', '\0'])
        && path.components().all(|c| matches!(c, Component::Normal(_)));
    if !ok {
        return Err(StoreError::InvalidKey(name.to_string()));
    }
    Ok(())
}

/// Write `bytes` to `path` via a sibling temp file and rename.
pub(crate) async fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// ── Filesystem artifact store ───────────────────────────────────────────────

/// Artifacts as files under a root directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        validate_artifact_name(name)?;
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn write_artifact(&self, name: &str, bytes: Vec<u8>) -> Result<String, StoreError> {
        let path = self.path_for(name)?;
        atomic_write(&path, &bytes).await.map_err(io_err(&path))?;
        debug!("Wrote artifact {} ({} bytes)", path.display(), bytes.len());
        Ok(path.to_string_lossy().into_owned())
    }

    async fn read_artifact(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(name)?;
        tokio::fs::read(&path).await.map_err(io_err(&path))
    }
}

/// Artifacts kept in memory; for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    artifacts: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored names, sorted.
    pub fn names(&self) -> Vec<String> {
        let map = self.artifacts.lock().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<_> = map.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn write_artifact(&self, name: &str, bytes: Vec<u8>) -> Result<String, StoreError> {
        validate_artifact_name(name)?;
        self.artifacts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), bytes);
        Ok(format!("memory://{name}"))
    }

    async fn read_artifact(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        self.artifacts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::Io {
                path: PathBuf::from(name),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
    }
}

// ── Filesystem result store ─────────────────────────────────────────────────

/// Results stored as `<root>/<project>/<filename>.json`.
#[derive(Debug, Clone)]
pub struct FsResultStore {
    root: PathBuf,
}

impl FsResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, project: &str, filename: &str) -> Result<PathBuf, StoreError> {
        validate_key(project)?;
        validate_key(filename)?;
        Ok(self.root.join(project).join(format!("{filename}.json")))
    }
}

#[async_trait]
impl ResultStore for FsResultStore {
    async fn save(
        &self,
        project: &str,
        filename: &str,
        result: &DocumentResult,
    ) -> Result<(), StoreError> {
        let path = self.path_for(project, filename)?;
        let json = result.to_json_pretty()?;
        atomic_write(&path, json.as_bytes())
            .await
            .map_err(io_err(&path))?;
        debug!("Saved result {}", path.display());
        Ok(())
    }

    async fn load(&self, project: &str, filename: &str) -> Result<DocumentResult, StoreError> {
        let path = self.path_for(project, filename)?;
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    project: project.to_string(),
                    filename: filename.to_string(),
                })
            }
            Err(e) => return Err(io_err(&path)(e)),
        };
        Ok(DocumentResult::from_json(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{PageInfo, PageResult, Score};

    fn entry(text: &str) -> RecognitionResult {
        RecognitionResult {
            category_type: "plain_text".into(),
            poly: vec![0, 0, 10, 0, 10, 5, 0, 5],
            text: text.into(),
            score: Score::from(0.9),
        }
    }

    fn two_pages() -> DocumentResult {
        let page = |n: usize| PageResult {
            layout_dets: vec![entry(&format!("page {n}"))],
            page_info: PageInfo {
                page_no: n,
                height: 1684,
                width: 1190,
            },
            preview: None,
        };
        DocumentResult {
            pages: vec![page(0), page(1)],
        }
    }

    #[test]
    fn key_validation() {
        assert!(validate_key("report.pdf").is_ok());
        assert!(validate_key("项目").is_ok());
        for bad in ["", ".", "..", "a/b", "a\\b"] {
            assert!(validate_key(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn artifact_name_validation() {
        assert!(validate_artifact_name("report/page_1_annotated.png").is_ok());
        for bad in ["", "../x.png", "/abs.png", "a/../b.png", "a\\b.png"] {
            assert!(validate_artifact_name(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[tokio::test]
    async fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsResultStore::new(dir.path());
        store.save("proj", "report.pdf", &two_pages()).await.unwrap();

        assert!(dir.path().join("proj/report.pdf.json").exists());
        assert!(!dir.path().join("proj/report.pdf.json.tmp").exists());

        let back = store.load("proj", "report.pdf").await.unwrap();
        assert_eq!(back.pages.len(), 2);
        assert_eq!(back.pages[1].layout_dets[0].text, "page 1");
    }

    #[tokio::test]
    async fn load_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsResultStore::new(dir.path())
            .load("proj", "nope.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn update_layout_dets_preserves_page_info() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsResultStore::new(dir.path());
        store.save("p", "f.pdf", &two_pages()).await.unwrap();

        let updated = store
            .update_layout_dets("p", "f.pdf", vec![vec![entry("fixed")], vec![]])
            .await
            .unwrap();
        assert_eq!(updated.pages[0].layout_dets[0].text, "fixed");
        assert!(updated.pages[1].layout_dets.is_empty());
        assert_eq!(updated.pages[1].page_info.page_no, 1);
        assert_eq!(updated.pages[1].page_info.width, 1190);

        let reloaded = store.load("p", "f.pdf").await.unwrap();
        assert_eq!(reloaded.pages[0].layout_dets[0].text, "fixed");
    }

    #[tokio::test]
    async fn update_layout_dets_rejects_page_count_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsResultStore::new(dir.path());
        store.save("p", "f.pdf", &two_pages()).await.unwrap();

        let err = store
            .update_layout_dets("p", "f.pdf", vec![vec![]])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::PageCountMismatch {
                expected: 2,
                got: 1
            }
        ));
    }

    #[tokio::test]
    async fn update_entry_text() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsResultStore::new(dir.path());
        store.save("p", "f.pdf", &two_pages()).await.unwrap();

        let updated = store
            .update_entry_text("p", "f.pdf", 1, 0, "corrected".into())
            .await
            .unwrap();
        assert_eq!(updated.pages[1].layout_dets[0].text, "corrected");
        assert_eq!(updated.pages[1].layout_dets[0].score, Score::from(0.9));

        let err = store
            .update_entry_text("p", "f.pdf", 1, 5, "x".into())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::EntryOutOfRange { page: 1, index: 5 }));
    }

    #[tokio::test]
    async fn fs_artifacts_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        let location = store
            .write_artifact("report/page_1_annotated.png", vec![1, 2, 3])
            .await
            .unwrap();
        assert!(location.ends_with("page_1_annotated.png"));
        assert_eq!(
            store.read_artifact("report/page_1_annotated.png").await.unwrap(),
            vec![1, 2, 3]
        );
        assert!(store.write_artifact("../escape.png", vec![]).await.is_err());
    }

    #[tokio::test]
    async fn memory_artifacts() {
        let store = MemoryArtifactStore::new();
        store.write_artifact("b/x.png", vec![9]).await.unwrap();
        store.write_artifact("a/y.png", vec![8]).await.unwrap();
        assert_eq!(store.names(), vec!["a/y.png", "b/x.png"]);
        assert_eq!(store.read_artifact("b/x.png").await.unwrap(), vec![9]);
        assert!(store.read_artifact("missing").await.is_err());
    }
}
