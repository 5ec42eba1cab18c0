//! Mock implementations for testing

use coldstart_core::transform::{RequireScanTransform, Transform, TransformFailure, TransformOutput};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Default transform that records every file it is asked to transform
#[derive(Debug, Default)]
pub struct CountingTransform {
    calls: AtomicUsize,
    files: Mutex<Vec<PathBuf>>,
}

impl CountingTransform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Transformed files, sorted (transforms may run in parallel)
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files = self.files.lock().unwrap().clone();
        files.sort();
        files
    }
}

impl Transform for CountingTransform {
    fn transform(
        &self,
        source: &str,
        file_path: &Path,
    ) -> Result<TransformOutput, TransformFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.files.lock().unwrap().push(file_path.to_path_buf());
        RequireScanTransform.transform(source, file_path)
    }
}

/// Transform that fails for one file name and scans everything else
#[derive(Debug)]
pub struct FailingTransform {
    file_name: String,
}

impl FailingTransform {
    pub fn new(file_name: &str) -> Arc<Self> {
        Arc::new(Self {
            file_name: file_name.to_string(),
        })
    }
}

impl Transform for FailingTransform {
    fn transform(
        &self,
        source: &str,
        file_path: &Path,
    ) -> Result<TransformOutput, TransformFailure> {
        if file_path.ends_with(&self.file_name) {
            return Err(TransformFailure::new("refused by test transform"));
        }
        RequireScanTransform.transform(source, file_path)
    }
}
