pub mod batch;
pub mod comparison;
pub mod engine;
pub mod job_dirs;
pub mod pathing;
pub mod preflight;
pub mod report;
pub mod resolver;
pub mod runlog;
pub mod runtime;
pub mod service;
pub mod settings;
pub mod stages;

use std::path::PathBuf;

/// Option toggles selected per run. They drive both the engine's command
/// flags and which stage directories the engine will emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EngineOptions {
    pub use_gpu: bool,
    pub remove_scratches: bool,
    pub high_resolution: bool,
}

/// One engine invocation over one input directory. Immutable once handed to
/// the invoker; the output directory belongs to this job alone until the run
/// returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestorationJob {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub options: EngineOptions,
}
