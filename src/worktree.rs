//! Write cloned files below a directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::upload_pack::ClonedFile;

/// Write every file below `base`, creating directories as needed, and return
/// the paths written.
///
/// Paths come from the remote, so components that are empty, `.` or `..`
/// are refused before anything touches the filesystem.
pub fn write_files(base: &Path, files: &[ClonedFile]) -> Result<Vec<PathBuf>> {
    let targets = files
        .iter()
        .map(|file| resolve(base, &file.path))
        .collect::<Result<Vec<_>>>()?;

    for (file, target) in files.iter().zip(&targets) {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        fs::write(target, &file.content)
            .with_context(|| format!("Failed to write file: {:?}", target))?;
        tracing::debug!("wrote {} ({} bytes)", file.path, file.content.len());
    }

    Ok(targets)
}

fn resolve(base: &Path, path: &str) -> Result<PathBuf> {
    let mut target = base.to_path_buf();
    for component in path.split('/') {
        if component.is_empty() || component == "." || component == ".." {
            bail!("Refusing to write unsafe path {:?}", path);
        }
        target.push(component);
    }
    Ok(target)
}
