use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StorageError;

const DOCUMENTS_DIR: &str = "documents";
const TEXT_DIR: &str = "text";
const ANALYSIS_DIR: &str = "analysis";
const SCRATCH_DIR: &str = "scratch";

/// Filesystem layout for uploaded documents and everything derived from them.
///
/// ```text
/// <root>/documents/<job_id>/<filename>   raw upload, written once
/// <root>/text/<job_id>.txt               extraction output
/// <root>/text/<job_id>_metadata.json     optional extractor sidecar
/// <root>/analysis/<job_id>.json          analysis output
/// <root>/scratch/<job_id>-topics.json    per-run taxonomy snapshot
/// ```
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the artifact directories stages write into.
    pub fn prepare(&self) -> Result<(), StorageError> {
        for dir in [DOCUMENTS_DIR, TEXT_DIR, ANALYSIS_DIR, SCRATCH_DIR] {
            ensure_directory(&self.root.join(dir))?;
        }
        Ok(())
    }

    /// Writes the raw upload for a job. Fails rather than overwrite: the
    /// source document is immutable once stored.
    pub fn store_document(
        &self,
        job_id: &str,
        filename: &str,
        content: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let dir_path = self.job_document_dir(job_id);
        ensure_directory(&dir_path)?;

        let path = dir_path.join(filename);
        // create_new gives O_CREAT | O_EXCL.
        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StorageError::FileExists(path));
            }
            Err(e) => return Err(StorageError::WriteFile { path, source: e }),
        };

        if let Err(e) = file.write_all(content).and_then(|_| file.sync_all()) {
            drop(file);
            let _ = std::fs::remove_file(&path);
            return Err(StorageError::WriteFile { path, source: e });
        }

        Ok(path)
    }

    pub fn extracted_text_path(&self, job_id: &str) -> PathBuf {
        self.root.join(TEXT_DIR).join(format!("{}.txt", job_id))
    }

    pub fn analysis_output_path(&self, job_id: &str) -> PathBuf {
        self.root.join(ANALYSIS_DIR).join(format!("{}.json", job_id))
    }

    pub fn topic_snapshot_path(&self, job_id: &str) -> PathBuf {
        self.root
            .join(SCRATCH_DIR)
            .join(format!("{}-topics.json", job_id))
    }

    /// Writes a scratch file, replacing any stale copy from an earlier run.
    pub fn write_scratch(&self, path: &Path, content: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            ensure_directory(parent)?;
        }
        std::fs::write(path, content).map_err(|e| StorageError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Removes a file. A file that is already gone counts as removed.
    pub fn remove_file(&self, path: &Path) -> Result<(), StorageError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Remove {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    /// Removes every artifact belonging to a job, continuing past failures.
    /// Returns the failures so the caller can report them.
    pub fn remove_job_artifacts(&self, job_id: &str) -> Vec<StorageError> {
        let mut failures = Vec::new();

        let document_dir = self.job_document_dir(job_id);
        match std::fs::remove_dir_all(&document_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => failures.push(StorageError::Remove {
                path: document_dir,
                source: e,
            }),
        }

        let text_path = self.extracted_text_path(job_id);
        let files = [
            metadata_sidecar_path(&text_path),
            text_path,
            self.analysis_output_path(job_id),
            self.topic_snapshot_path(job_id),
        ];
        for path in files {
            if let Err(e) = self.remove_file(&path) {
                failures.push(e);
            }
        }

        failures
    }

    fn job_document_dir(&self, job_id: &str) -> PathBuf {
        self.root.join(DOCUMENTS_DIR).join(job_id)
    }
}

/// Sidecar written by the extractor next to its text output:
/// `text/<job_id>.txt` -> `text/<job_id>_metadata.json`.
pub fn metadata_sidecar_path(text_path: &Path) -> PathBuf {
    let stem = text_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    text_path.with_file_name(format!("{}_metadata.json", stem))
}

fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
            path: path.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}
