use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use crate::utils::{GeneratorError, GeneratorResult};

/// Removes a file, logging instead of failing when it is already gone.
pub fn remove_file_quiet(path: impl AsRef<Path>) {
    let path = path.as_ref();
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

/// Check if file exists
pub fn file_exists(path: impl AsRef<Path>) -> bool {
    path.as_ref().is_file()
}

/// Turns an image type name into something safe to use as a file stem.
pub fn sanitize_file_stem(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned
    }
}

/// Creates `root/<stamp>`, appending `-N` when that directory already exists.
pub fn create_unique_dir(root: &Path, stamp: &str) -> GeneratorResult<PathBuf> {
    std::fs::create_dir_all(root).map_err(|e| {
        GeneratorError::Io(format!("Failed to create {}: {}", root.display(), e))
    })?;

    let mut candidate = root.join(stamp);
    let mut suffix = 1;
    loop {
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                candidate = root.join(format!("{stamp}-{suffix}"));
                suffix += 1;
            }
            Err(e) => {
                return Err(GeneratorError::Io(format!(
                    "Failed to create {}: {}",
                    candidate.display(),
                    e
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_path_characters() {
        assert_eq!(sanitize_file_stem("cpu/load avg"), "cpu_load_avg");
        assert_eq!(sanitize_file_stem("net-eth0_rx"), "net-eth0_rx");
        assert_eq!(sanitize_file_stem(""), "image");
    }

    #[test]
    fn unique_dir_gets_suffix_on_collision() {
        let root = tempfile::tempdir().unwrap();
        let first = create_unique_dir(root.path(), "2024-01-01_00-00-00").unwrap();
        let second = create_unique_dir(root.path(), "2024-01-01_00-00-00").unwrap();
        assert_ne!(first, second);
        assert!(second.ends_with("2024-01-01_00-00-00-1"));
        assert!(first.is_dir() && second.is_dir());
    }

    #[test]
    fn remove_missing_file_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        remove_file_quiet(dir.path().join("absent.png"));
        let present = dir.path().join("present.png");
        std::fs::write(&present, b"x").unwrap();
        remove_file_quiet(&present);
        assert!(!file_exists(&present));
    }
}
