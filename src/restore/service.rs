use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::restore::batch::{BatchCoordinator, BatchRunError, BatchRunRequest};
use crate::restore::job_dirs::{self, DirectoryPrepError};
use crate::restore::pathing::{is_image_path, list_image_files_sorted};
use crate::restore::{EngineOptions, RestorationJob};

/// One caller-facing result row: the submitted original paired with
/// whatever the run produced for it. `restored = None` marks an
/// unresolved or failed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredItem {
    pub original: PathBuf,
    pub restored: Option<PathBuf>,
    pub comparison: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManyRestoreOutcome {
    pub success: bool,
    pub engine_status_code: Option<i32>,
    pub engine_stderr: String,
    pub output_dir: PathBuf,
    pub items: Vec<RestoredItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleRestoreOutcome {
    pub original: PathBuf,
    pub restored: Option<PathBuf>,
    pub comparison: Option<PathBuf>,
    pub exported: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum RestoreServiceError {
    #[error("input path not found: {0}")]
    InputNotFound(PathBuf),
    #[error("unsupported input (expected an image file): {0}")]
    UnsupportedInput(PathBuf),
    #[error("no image files found under {0}")]
    NoImagesFound(PathBuf),
    #[error("failed to list images under {path}: {source}")]
    ListImages {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Batch(#[from] BatchRunError),
    #[error(transparent)]
    DirectoryPrep(#[from] DirectoryPrepError),
}

/// Caller-facing driver around the batch coordinator: validates inputs,
/// owns the scratch staging area, and maps staged results back to the
/// originals the caller submitted.
pub struct RestoreService {
    coordinator: BatchCoordinator,
    scratch_base: PathBuf,
    download_dir: PathBuf,
}

impl RestoreService {
    pub fn new(coordinator: BatchCoordinator) -> Self {
        Self {
            coordinator,
            scratch_base: std::env::temp_dir(),
            download_dir: PathBuf::from("downloads"),
        }
    }

    pub fn with_scratch_base(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_base = dir.into();
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// Restores one image and, when something was produced, exports a
    /// timestamped copy into the download directory.
    pub fn restore_single(
        &self,
        image_path: &Path,
        options: EngineOptions,
    ) -> Result<SingleRestoreOutcome, RestoreServiceError> {
        validate_input_image(image_path)?;
        let outcome = self.execute(&[image_path.to_path_buf()], None, options, true)?;
        let (restored, comparison) = match outcome.items.into_iter().next() {
            Some(item) => (item.restored, item.comparison),
            None => (None, None),
        };
        let exported = match restored.as_deref() {
            Some(found) => Some(job_dirs::export_restored_copy(
                self.download_dir.as_path(),
                found,
            )?),
            None => None,
        };
        Ok(SingleRestoreOutcome {
            original: image_path.to_path_buf(),
            restored,
            comparison,
            exported,
        })
    }

    /// Restores a list of images through one engine invocation.
    pub fn restore_many(
        &self,
        images: &[PathBuf],
        options: EngineOptions,
        compose_comparisons: bool,
    ) -> Result<ManyRestoreOutcome, RestoreServiceError> {
        if images.is_empty() {
            return Err(RestoreServiceError::Batch(BatchRunError::NoInputs));
        }
        for image in images {
            validate_input_image(image.as_path())?;
        }
        self.execute(images, None, options, compose_comparisons)
    }

    /// Restores every image under `input_dir` into `output_dir`. The
    /// caller's input directory is read, never written: staging happens
    /// in a scratch tree.
    pub fn restore_dir(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        options: EngineOptions,
        compose_comparisons: bool,
    ) -> Result<ManyRestoreOutcome, RestoreServiceError> {
        if !input_dir.is_dir() {
            return Err(RestoreServiceError::InputNotFound(input_dir.to_path_buf()));
        }
        let sources = list_image_files_sorted(input_dir).map_err(|source| {
            RestoreServiceError::ListImages {
                path: input_dir.to_path_buf(),
                source,
            }
        })?;
        if sources.is_empty() {
            return Err(RestoreServiceError::NoImagesFound(input_dir.to_path_buf()));
        }
        self.execute(
            &sources,
            Some(output_dir.to_path_buf()),
            options,
            compose_comparisons,
        )
    }

    fn execute(
        &self,
        sources: &[PathBuf],
        output_dir: Option<PathBuf>,
        options: EngineOptions,
        compose_comparisons: bool,
    ) -> Result<ManyRestoreOutcome, RestoreServiceError> {
        // The scratch tree is left in place after the run: for list and
        // single runs the outcome paths point into it.
        let workspace = job_dirs::create_scratch_workspace(self.scratch_base.as_path())?;
        let output_dir = output_dir.unwrap_or_else(|| workspace.output_dir.clone());
        let request = BatchRunRequest {
            job: RestorationJob {
                input_dir: workspace.input_dir.clone(),
                output_dir: output_dir.clone(),
                options,
            },
            inputs: sources.to_vec(),
            compose_comparisons,
        };
        let result = self.coordinator.run(&request)?;
        let items = sources
            .iter()
            .zip(result.items)
            .map(|(original, item)| RestoredItem {
                original: original.clone(),
                restored: item.found_path,
                comparison: item.comparison_path,
            })
            .collect();
        Ok(ManyRestoreOutcome {
            success: result.success,
            engine_status_code: result.engine_status_code,
            engine_stderr: result.engine_stderr,
            output_dir,
            items,
        })
    }
}

fn validate_input_image(path: &Path) -> Result<(), RestoreServiceError> {
    if !path.exists() {
        return Err(RestoreServiceError::InputNotFound(path.to_path_buf()));
    }
    if !path.is_file() || !is_image_path(path) {
        return Err(RestoreServiceError::UnsupportedInput(path.to_path_buf()));
    }
    Ok(())
}
