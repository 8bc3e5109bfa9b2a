//! Document access consumed by the driver.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use plan_model::{PlanError, Result, Workbook};

use crate::paths::resolve_input_path;

/// Opens and persists workbooks.
pub trait DocumentAdapter {
    /// Locate an input document, falling back to the executable directory.
    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        resolve_input_path(path)
    }

    fn open_workbook(&self, path: &Path) -> Result<Workbook>;

    fn save_workbook(&self, workbook: &Workbook, path: &Path) -> Result<()>;
}

/// Keeps workbooks in memory keyed by path.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    documents: Mutex<HashMap<PathBuf, Workbook>>,
    saves: Mutex<Vec<PathBuf>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, path: impl Into<PathBuf>, workbook: Workbook) -> Self {
        if let Ok(documents) = self.documents.get_mut() {
            documents.insert(path.into(), workbook);
        }
        self
    }

    /// Current contents stored under `path`.
    pub fn document(&self, path: &Path) -> Option<Workbook> {
        self.documents.lock().ok()?.get(path).cloned()
    }

    /// Paths written by `save_workbook`, in call order.
    pub fn saved_paths(&self) -> Vec<PathBuf> {
        self.saves
            .lock()
            .map(|saves| saves.clone())
            .unwrap_or_default()
    }
}

impl DocumentAdapter for MemoryAdapter {
    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        let documents = self.documents.lock().map_err(|_| poisoned())?;
        if documents.contains_key(path) {
            Ok(path.to_path_buf())
        } else {
            Err(PlanError::FileNotFound {
                path: path.to_path_buf(),
            })
        }
    }

    fn open_workbook(&self, path: &Path) -> Result<Workbook> {
        let documents = self.documents.lock().map_err(|_| poisoned())?;
        let mut workbook = documents
            .get(path)
            .cloned()
            .ok_or_else(|| PlanError::FileNotFound {
                path: path.to_path_buf(),
            })?;
        workbook.mark_clean();
        Ok(workbook)
    }

    fn save_workbook(&self, workbook: &Workbook, path: &Path) -> Result<()> {
        let mut documents = self.documents.lock().map_err(|_| poisoned())?;
        documents.insert(path.to_path_buf(), workbook.clone());
        self.saves
            .lock()
            .map_err(|_| poisoned())?
            .push(path.to_path_buf());
        Ok(())
    }
}

fn poisoned() -> PlanError {
    PlanError::Message("memory adapter lock poisoned".to_string())
}
