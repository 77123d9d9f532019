use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use crate::restore::comparison::{self, ComposeOptions};
use crate::restore::engine::{EngineInvocationError, SharedRestoreEngine};
use crate::restore::job_dirs::{self, DirectoryPrepError, StagedInput};
use crate::restore::resolver::{resolve_output, ResolvedResult};
use crate::restore::runlog::{self, BatchRunLog, BatchRunLogItem};
use crate::restore::{EngineOptions, RestorationJob};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRunRequest {
    pub job: RestorationJob,
    pub inputs: Vec<PathBuf>,
    pub compose_comparisons: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItemResult {
    pub source_filename: String,
    pub staged_name: String,
    pub found_path: Option<PathBuf>,
    pub image_dimensions: Option<(u32, u32)>,
    pub comparison_path: Option<PathBuf>,
}

/// Aggregate of one batch: `items` is 1:1 with the submitted inputs in
/// submission order, misses included. `success` reports the engine
/// invocation itself, not per-item resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub success: bool,
    pub engine_status_code: Option<i32>,
    pub engine_stderr: String,
    pub items: Vec<BatchItemResult>,
}

#[derive(Debug, Error)]
pub enum BatchRunError {
    #[error("a batch needs at least one input image")]
    NoInputs,
    #[error(transparent)]
    DirectoryPrep(#[from] DirectoryPrepError),
    #[error(transparent)]
    Engine(#[from] EngineInvocationError),
}

/// Runs one engine invocation over a staged set of inputs, then resolves
/// and aggregates per-item results. The engine runs exactly once per
/// batch; resolution misses never abort the rest of the batch.
pub struct BatchCoordinator {
    engine: SharedRestoreEngine,
    resolution_workers: usize,
    compose_options: ComposeOptions,
}

impl BatchCoordinator {
    pub fn new(engine: SharedRestoreEngine) -> Self {
        Self {
            engine,
            resolution_workers: 1,
            compose_options: ComposeOptions::default(),
        }
    }

    pub fn with_resolution_workers(mut self, workers: usize) -> Self {
        self.resolution_workers = workers.max(1);
        self
    }

    pub fn with_compose_options(mut self, options: ComposeOptions) -> Self {
        self.compose_options = options;
        self
    }

    pub fn run(&self, request: &BatchRunRequest) -> Result<BatchResult, BatchRunError> {
        if request.inputs.is_empty() {
            return Err(BatchRunError::NoInputs);
        }
        let started_at = runlog::iso_timestamp_now();
        let job = &request.job;
        job_dirs::prepare_output_dir(job.output_dir.as_path())?;
        let staged = job_dirs::stage_inputs(job.input_dir.as_path(), &request.inputs)?;

        let outcome = self.engine.invoke(job)?;
        if !outcome.ok {
            warn!(
                status_code = outcome.status_code,
                "engine invocation failed; reporting every input as unresolved"
            );
            let items = staged
                .iter()
                .map(|input| BatchItemResult {
                    source_filename: input.source_filename.clone(),
                    staged_name: input.staged_name.clone(),
                    found_path: None,
                    image_dimensions: None,
                    comparison_path: None,
                })
                .collect();
            let result = BatchResult {
                success: false,
                engine_status_code: Some(outcome.status_code),
                engine_stderr: outcome.stderr,
                items,
            };
            self.write_run_log(job, &result, started_at);
            return Ok(result);
        }

        let resolved = self.resolve_all(job.output_dir.as_path(), &job.options, &staged);
        let mut items = Vec::with_capacity(staged.len());
        for (input, resolved) in staged.iter().zip(resolved) {
            if resolved.found_path.is_none() {
                warn!(
                    staged_name = %input.staged_name,
                    source = %input.source_filename,
                    "no restored output located for input"
                );
            }
            let comparison_path = match (&resolved.found_path, request.compose_comparisons) {
                (Some(found), true) => match comparison::compose_comparison_file(
                    input.staged_path.as_path(),
                    found.as_path(),
                    job.output_dir.as_path(),
                    input.staged_name.as_str(),
                    self.compose_options,
                ) {
                    Ok(artifact) => Some(artifact.path),
                    Err(error) => {
                        warn!(
                            source = %input.source_filename,
                            %error,
                            "comparison image could not be composed"
                        );
                        None
                    }
                },
                _ => None,
            };
            items.push(BatchItemResult {
                source_filename: input.source_filename.clone(),
                staged_name: input.staged_name.clone(),
                found_path: resolved.found_path,
                image_dimensions: resolved.image_dimensions,
                comparison_path,
            });
        }

        let result = BatchResult {
            success: true,
            engine_status_code: Some(outcome.status_code),
            engine_stderr: outcome.stderr,
            items,
        };
        self.write_run_log(job, &result, started_at);
        Ok(result)
    }

    /// Resolution is read-only and item-independent, so it may fan out
    /// across a bounded set of threads. The engine invocation itself
    /// stays strictly serialized in `run`.
    fn resolve_all(
        &self,
        output_dir: &Path,
        options: &EngineOptions,
        staged: &[StagedInput],
    ) -> Vec<ResolvedResult> {
        if self.resolution_workers <= 1 || staged.len() <= 1 {
            return staged
                .iter()
                .map(|input| resolve_output(output_dir, input.staged_name.as_str(), options))
                .collect();
        }
        let mut results: Vec<Option<ResolvedResult>> = vec![None; staged.len()];
        let chunk_size = (staged.len() + self.resolution_workers - 1) / self.resolution_workers;
        std::thread::scope(|scope| {
            for (inputs, slots) in staged.chunks(chunk_size).zip(results.chunks_mut(chunk_size)) {
                scope.spawn(move || {
                    for (input, slot) in inputs.iter().zip(slots.iter_mut()) {
                        *slot = Some(resolve_output(
                            output_dir,
                            input.staged_name.as_str(),
                            options,
                        ));
                    }
                });
            }
        });
        results
            .into_iter()
            .zip(staged)
            .map(|(resolved, input)| {
                resolved.unwrap_or_else(|| ResolvedResult::miss(input.staged_name.clone()))
            })
            .collect()
    }

    fn write_run_log(&self, job: &RestorationJob, result: &BatchResult, started_at: String) {
        let log = BatchRunLog {
            started_at,
            finished_at: runlog::iso_timestamp_now(),
            input_dir: job.input_dir.display().to_string(),
            output_dir: job.output_dir.display().to_string(),
            use_gpu: job.options.use_gpu,
            remove_scratches: job.options.remove_scratches,
            high_resolution: job.options.high_resolution,
            success: result.success,
            engine_status_code: result.engine_status_code,
            items: result
                .items
                .iter()
                .map(|item| BatchRunLogItem {
                    source_filename: item.source_filename.clone(),
                    staged_name: item.staged_name.clone(),
                    found_path: item
                        .found_path
                        .as_ref()
                        .map(|path| path.display().to_string()),
                    comparison_path: item
                        .comparison_path
                        .as_ref()
                        .map(|path| path.display().to_string()),
                })
                .collect(),
        };
        let path = runlog::batch_run_log_path(job.output_dir.as_path());
        let rendered = match runlog::render_batch_run_log(&log) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(%error, "run log could not be serialized");
                return;
            }
        };
        if let Err(error) = job_dirs::write_artifact_bytes(path.as_path(), rendered.as_slice()) {
            warn!(%error, path = %path.display(), "run log could not be written");
        }
    }
}
