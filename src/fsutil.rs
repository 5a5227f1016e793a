//! Output directory handling.

use std::path::{Path, PathBuf};

use crate::{ARCHIVE_FILE_NAME, QprofError, QprofResult};

/// Creates `out` if needed and returns where the archive will be written.
pub fn prepare_output_dir(out: &Path) -> QprofResult<PathBuf> {
    std::fs::create_dir_all(out)?;
    if !out.is_dir() {
        return Err(QprofError::InvalidArgument(format!(
            "output path {} is not a directory",
            out.display()
        )));
    }
    Ok(out.join(ARCHIVE_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn creates_nested_output_dir() {
        let out = std::env::temp_dir()
            .join(format!("qprof-fsutil-{}", Uuid::new_v4()))
            .join("nested");
        let path = prepare_output_dir(&out).expect("prepare");
        assert!(out.is_dir());
        assert_eq!(path, out.join("profiles.tar.gz"));
        assert!(!path.exists());
    }

    #[test]
    fn rejects_file_as_output_dir() {
        let file = std::env::temp_dir().join(format!("qprof-fsutil-file-{}", Uuid::new_v4()));
        std::fs::write(&file, b"x").expect("write");
        assert!(prepare_output_dir(&file).is_err());
    }
}
