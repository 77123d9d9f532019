use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::restore::pathing::{file_name_lossy, staged_input_name};

#[derive(Debug, Error)]
pub enum DirectoryPrepError {
    #[error("failed to clear {path}: {source}")]
    Clear { path: PathBuf, source: io::Error },
    #[error("failed to create directory {path}: {source}")]
    Create { path: PathBuf, source: io::Error },
    #[error("failed to stage {source_path} as {staged_name}: {source}")]
    StageCopy {
        source_path: PathBuf,
        staged_name: String,
        source: io::Error,
    },
    #[error("failed to write artifact {path}: {source}")]
    ArtifactWrite { path: PathBuf, source: io::Error },
    #[error("failed to export restored copy to {path}: {source}")]
    Export { path: PathBuf, source: io::Error },
}

/// Deletes whatever sits at `path` and recreates it as an empty
/// directory. The engine mixes new outputs into a dirty tree without
/// complaint, so every batch starts from a clean slate. Idempotent.
pub fn prepare_output_dir(path: &Path) -> Result<(), DirectoryPrepError> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => {
            fs::remove_dir_all(path).map_err(|source| DirectoryPrepError::Clear {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Ok(_) => {
            fs::remove_file(path).map_err(|source| DirectoryPrepError::Clear {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Err(source) if source.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(DirectoryPrepError::Clear {
                path: path.to_path_buf(),
                source,
            });
        }
    }
    fs::create_dir_all(path).map_err(|source| DirectoryPrepError::Create {
        path: path.to_path_buf(),
        source,
    })
}

pub fn ensure_input_dir(path: &Path) -> Result<(), DirectoryPrepError> {
    fs::create_dir_all(path).map_err(|source| DirectoryPrepError::Create {
        path: path.to_path_buf(),
        source,
    })
}

/// One source image copied into the engine's input directory under an
/// index-based name. The engine walks its input folder in its own order,
/// so the index keeps results attributable to their sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedInput {
    pub index: usize,
    pub source_path: PathBuf,
    pub source_filename: String,
    pub staged_name: String,
    pub staged_path: PathBuf,
}

pub fn stage_inputs(
    input_dir: &Path,
    sources: &[PathBuf],
) -> Result<Vec<StagedInput>, DirectoryPrepError> {
    ensure_input_dir(input_dir)?;
    let mut staged = Vec::with_capacity(sources.len());
    for (index, source_path) in sources.iter().enumerate() {
        let source_filename = file_name_lossy(source_path.as_path());
        let staged_name = staged_input_name(index, source_filename.as_str());
        let staged_path = input_dir.join(staged_name.as_str());
        fs::copy(source_path.as_path(), staged_path.as_path()).map_err(|source| {
            DirectoryPrepError::StageCopy {
                source_path: source_path.clone(),
                staged_name: staged_name.clone(),
                source,
            }
        })?;
        staged.push(StagedInput {
            index,
            source_path: source_path.clone(),
            source_filename,
            staged_name,
            staged_path,
        });
    }
    Ok(staged)
}

pub fn write_artifact_bytes(path: &Path, bytes: &[u8]) -> Result<u64, DirectoryPrepError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| DirectoryPrepError::Create {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, bytes).map_err(|source| DirectoryPrepError::ArtifactWrite {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(bytes.len() as u64)
}

/// Throwaway input/output pair for single-image runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchWorkspace {
    pub root: PathBuf,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl ScratchWorkspace {
    pub fn cleanup(&self) {
        let _ = fs::remove_dir_all(self.root.as_path());
    }
}

pub fn create_scratch_workspace(base_dir: &Path) -> Result<ScratchWorkspace, DirectoryPrepError> {
    let root = base_dir.join(format!("restore_run_{}", Uuid::new_v4()));
    let input_dir = root.join("input");
    let output_dir = root.join("output");
    ensure_input_dir(input_dir.as_path())?;
    Ok(ScratchWorkspace {
        root,
        input_dir,
        output_dir,
    })
}

/// Copies a restored image into the download directory under a
/// timestamped name, mirroring how results were handed to users before.
pub fn export_restored_copy(
    download_dir: &Path,
    restored_path: &Path,
) -> Result<PathBuf, DirectoryPrepError> {
    fs::create_dir_all(download_dir).map_err(|source| DirectoryPrepError::Create {
        path: download_dir.to_path_buf(),
        source,
    })?;
    let extension = restored_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("jpg");
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let destination = download_dir.join(format!("restored_photo_{stamp}.{extension}"));
    fs::copy(restored_path, destination.as_path()).map_err(|source| {
        DirectoryPrepError::Export {
            path: destination.clone(),
            source,
        }
    })?;
    Ok(destination)
}
