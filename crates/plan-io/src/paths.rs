use std::path::{Path, PathBuf};

use tracing::debug;

use plan_model::{PlanError, Result};

/// Resolve an input document path.
///
/// A path that does not name an existing file is retried relative to the
/// directory holding the running executable.
pub fn resolve_input_path(path: &Path) -> Result<PathBuf> {
    resolve_with_fallback(path, executable_dir().as_deref())
}

pub fn resolve_with_fallback(path: &Path, fallback_dir: Option<&Path>) -> Result<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    if path.is_relative()
        && let Some(dir) = fallback_dir
    {
        let candidate = dir.join(path);
        if candidate.is_file() {
            debug!(
                requested = %path.display(),
                resolved = %candidate.display(),
                "resolved input relative to executable directory"
            );
            return Ok(candidate);
        }
    }
    Err(PlanError::FileNotFound {
        path: path.to_path_buf(),
    })
}

/// Directory of the running executable, with symlinks resolved.
pub fn executable_dir() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let exe = exe.canonicalize().unwrap_or(exe);
    exe.parent().map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn existing_path_is_returned_as_is() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("plan.xlsx");
        fs::write(&file, b"x").expect("write");
        assert_eq!(resolve_with_fallback(&file, None).expect("resolve"), file);
    }

    #[test]
    fn relative_path_falls_back_to_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("plan_only_in_fallback.xlsx"), b"x").expect("write");
        let resolved = resolve_with_fallback(
            Path::new("plan_only_in_fallback.xlsx"),
            Some(dir.path()),
        )
        .expect("resolve");
        assert_eq!(resolved, dir.path().join("plan_only_in_fallback.xlsx"));
    }

    #[test]
    fn missing_everywhere_is_file_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let error = resolve_with_fallback(Path::new("nope.xlsx"), Some(dir.path())).unwrap_err();
        assert!(matches!(error, PlanError::FileNotFound { .. }));
    }

    #[test]
    fn directories_are_not_documents() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(resolve_with_fallback(dir.path(), None).is_err());
    }
}
