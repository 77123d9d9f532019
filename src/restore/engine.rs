use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::restore::pathing::absolute_path_string;
use crate::restore::preflight::ensure_engine_setup;
use crate::restore::runtime::{
    CommandSpec, CommandWait, EngineCommandRunner, InvocationBudget, StdEngineCommandRunner,
};
use crate::restore::RestorationJob;

pub const ENGINE_RUN_SCRIPT: &str = "run.py";
pub const DEFAULT_PYTHON_BINARY: &str = "python";

/// Where the external engine lives and how to launch it. The engine resolves
/// its checkpoint paths relative to its own root, so every invocation runs
/// with `engine_root` as cwd.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineLayout {
    pub engine_root: PathBuf,
    pub python_binary: String,
    pub run_script: String,
}

impl EngineLayout {
    pub fn new(engine_root: PathBuf) -> Self {
        Self {
            engine_root,
            python_binary: String::from(DEFAULT_PYTHON_BINARY),
            run_script: String::from(ENGINE_RUN_SCRIPT),
        }
    }

    pub fn with_python_binary(mut self, python_binary: impl Into<String>) -> Self {
        self.python_binary = python_binary.into();
        self
    }

    pub fn with_run_script(mut self, run_script: impl Into<String>) -> Self {
        self.run_script = run_script.into();
        self
    }

    pub fn run_script_path(&self) -> PathBuf {
        self.engine_root.join(self.run_script.as_str())
    }
}

/// What one engine invocation reported. A non-zero exit is a job-level
/// failure the caller maps to an all-miss batch, not a Rust error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationOutcome {
    pub ok: bool,
    pub status_code: i32,
    pub stderr: String,
}

#[derive(Debug, Error)]
pub enum EngineInvocationError {
    #[error("engine setup incomplete under {engine_root}; missing: {}", missing.join(", "))]
    SetupMissing {
        engine_root: PathBuf,
        missing: Vec<String>,
    },
    #[error("engine invocation failed to execute: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine invocation exceeded its deadline ({waited:?}) and was killed")]
    Timeout { waited: Duration },
    #[error("engine invocation was cancelled before completion")]
    Cancelled,
}

pub trait RestoreEngine: Send + Sync + 'static {
    fn invoke(&self, job: &RestorationJob) -> Result<InvocationOutcome, EngineInvocationError>;
}

pub type SharedRestoreEngine = Arc<dyn RestoreEngine>;

pub fn gpu_flag_value(use_gpu: bool, gpu_device: i64) -> i64 {
    if use_gpu {
        gpu_device
    } else {
        -1
    }
}

/// Invoker for the script-based restoration engine. Exactly one invocation
/// per batch; no retries.
#[derive(Clone)]
pub struct ScriptRestoreEngine<R: EngineCommandRunner> {
    layout: EngineLayout,
    runner: R,
    budget: InvocationBudget,
    gpu_device: i64,
}

impl<R: EngineCommandRunner> ScriptRestoreEngine<R> {
    pub fn new(layout: EngineLayout, runner: R) -> Self {
        Self {
            layout,
            runner,
            budget: InvocationBudget::unlimited(),
            gpu_device: 0,
        }
    }

    pub fn with_budget(mut self, budget: InvocationBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_gpu_device(mut self, gpu_device: i64) -> Self {
        self.gpu_device = gpu_device;
        self
    }

    pub fn layout(&self) -> &EngineLayout {
        &self.layout
    }

    fn build_restore_command(&self, job: &RestorationJob) -> CommandSpec {
        let mut args = vec![
            self.layout.run_script.clone(),
            String::from("--input_folder"),
            absolute_path_string(job.input_dir.as_path()),
            String::from("--output_folder"),
            absolute_path_string(job.output_dir.as_path()),
            String::from("--GPU"),
            gpu_flag_value(job.options.use_gpu, self.gpu_device).to_string(),
        ];
        if job.options.remove_scratches {
            args.push(String::from("--with_scratch"));
        }
        if job.options.high_resolution {
            args.push(String::from("--HR"));
        }
        CommandSpec {
            program: self.layout.python_binary.clone(),
            args,
            cwd: self.layout.engine_root.clone(),
        }
    }
}

impl<R: EngineCommandRunner> RestoreEngine for ScriptRestoreEngine<R> {
    fn invoke(&self, job: &RestorationJob) -> Result<InvocationOutcome, EngineInvocationError> {
        ensure_engine_setup(&self.layout)?;

        let spec = self.build_restore_command(job);
        info!(
            program = %spec.program,
            cwd = %spec.cwd.display(),
            "invoking restoration engine"
        );
        match self.runner.run(&spec, &self.budget)? {
            CommandWait::Completed(output) => {
                let ok = output.status_code == 0;
                if !ok {
                    warn!(
                        status_code = output.status_code,
                        "restoration engine exited non-zero"
                    );
                }
                Ok(InvocationOutcome {
                    ok,
                    status_code: output.status_code,
                    stderr: output.stderr,
                })
            }
            CommandWait::DeadlineExpired { waited } => {
                Err(EngineInvocationError::Timeout { waited })
            }
            CommandWait::Cancelled => Err(EngineInvocationError::Cancelled),
        }
    }
}

pub fn default_script_restore_engine(
    engine_root: PathBuf,
) -> ScriptRestoreEngine<StdEngineCommandRunner> {
    ScriptRestoreEngine::new(EngineLayout::new(engine_root), StdEngineCommandRunner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::restore::preflight::tests_support::seed_complete_engine_root;
    use crate::restore::runtime::CommandOutput;
    use crate::restore::EngineOptions;
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[derive(Clone, Default)]
    struct FakeEngineRunner {
        seen: Arc<Mutex<Vec<CommandSpec>>>,
        next: Arc<Mutex<Option<CommandWait>>>,
    }

    impl FakeEngineRunner {
        fn with_next(wait: CommandWait) -> Self {
            Self {
                seen: Arc::new(Mutex::new(Vec::new())),
                next: Arc::new(Mutex::new(Some(wait))),
            }
        }

        fn take_seen(&self) -> Vec<CommandSpec> {
            std::mem::take(&mut *self.seen.lock().expect("fake runner mutex poisoned"))
        }
    }

    impl EngineCommandRunner for FakeEngineRunner {
        fn run(
            &self,
            spec: &CommandSpec,
            _budget: &InvocationBudget,
        ) -> std::io::Result<CommandWait> {
            self.seen
                .lock()
                .expect("fake runner mutex poisoned")
                .push(spec.clone());
            Ok(self
                .next
                .lock()
                .expect("fake runner mutex poisoned")
                .take()
                .unwrap_or(CommandWait::Completed(CommandOutput {
                    status_code: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                })))
        }
    }

    fn temp_engine_root(tag: &str) -> PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        let root = std::env::temp_dir().join(format!("relume_engine_{tag}_{stamp}"));
        seed_complete_engine_root(root.as_path());
        root
    }

    fn job_for(root: &Path) -> RestorationJob {
        RestorationJob {
            input_dir: root.join("job/input"),
            output_dir: root.join("job/output"),
            options: EngineOptions::default(),
        }
    }

    #[test]
    fn builds_the_documented_flag_set_with_cwd_pinned_to_engine_root() {
        let root = temp_engine_root("flags");
        let engine = ScriptRestoreEngine::new(
            EngineLayout::new(root.clone()),
            FakeEngineRunner::default(),
        );
        let mut job = job_for(root.as_path());
        job.options.remove_scratches = true;
        job.options.high_resolution = true;

        let spec = engine.build_restore_command(&job);

        assert_eq!(spec.program, "python");
        assert_eq!(spec.cwd, root);
        assert_eq!(spec.args[0], "run.py");
        assert_eq!(spec.args[1], "--input_folder");
        assert_eq!(spec.args[3], "--output_folder");
        assert_eq!(spec.args[5], "--GPU");
        assert_eq!(spec.args[6], "-1");
        assert!(spec.args.contains(&String::from("--with_scratch")));
        assert!(spec.args.contains(&String::from("--HR")));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn gpu_flag_selects_device_only_when_gpu_requested() {
        assert_eq!(gpu_flag_value(false, 0), -1);
        assert_eq!(gpu_flag_value(false, 2), -1);
        assert_eq!(gpu_flag_value(true, 0), 0);
        assert_eq!(gpu_flag_value(true, 2), 2);
    }

    #[test]
    fn optional_flags_stay_absent_for_default_options() {
        let root = temp_engine_root("defaults");
        let engine = ScriptRestoreEngine::new(
            EngineLayout::new(root.clone()),
            FakeEngineRunner::default(),
        );
        let job = job_for(root.as_path());

        let spec = engine.build_restore_command(&job);

        assert!(!spec.args.contains(&String::from("--with_scratch")));
        assert!(!spec.args.contains(&String::from("--HR")));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn invoke_refuses_to_run_when_setup_is_incomplete() {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        let root = std::env::temp_dir().join(format!("relume_engine_missing_{stamp}"));
        fs::create_dir_all(root.as_path()).expect("engine root should exist");
        let runner = FakeEngineRunner::default();
        let engine = ScriptRestoreEngine::new(EngineLayout::new(root.clone()), runner.clone());

        let error = engine
            .invoke(&job_for(root.as_path()))
            .expect_err("incomplete setup should fail");

        assert!(matches!(error, EngineInvocationError::SetupMissing { .. }));
        assert!(runner.take_seen().is_empty());

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn invoke_maps_non_zero_exit_to_a_failed_outcome_with_stderr() {
        let root = temp_engine_root("nonzero");
        let runner = FakeEngineRunner::with_next(CommandWait::Completed(CommandOutput {
            status_code: 1,
            stdout: String::new(),
            stderr: String::from("CUDA out of memory"),
        }));
        let engine = ScriptRestoreEngine::new(EngineLayout::new(root.clone()), runner.clone());

        let outcome = engine
            .invoke(&job_for(root.as_path()))
            .expect("invocation itself should not error");

        assert!(!outcome.ok);
        assert_eq!(outcome.status_code, 1);
        assert_eq!(outcome.stderr, "CUDA out of memory");
        assert_eq!(runner.take_seen().len(), 1);

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn invoke_surfaces_distinct_timeout_and_cancel_kinds() {
        let root = temp_engine_root("deadline");
        let timeout_engine = ScriptRestoreEngine::new(
            EngineLayout::new(root.clone()),
            FakeEngineRunner::with_next(CommandWait::DeadlineExpired {
                waited: Duration::from_secs(5),
            }),
        );
        let cancelled_engine = ScriptRestoreEngine::new(
            EngineLayout::new(root.clone()),
            FakeEngineRunner::with_next(CommandWait::Cancelled),
        );
        let job = job_for(root.as_path());

        let timeout = timeout_engine
            .invoke(&job)
            .expect_err("deadline expiry should error");
        let cancelled = cancelled_engine
            .invoke(&job)
            .expect_err("cancellation should error");

        assert!(matches!(timeout, EngineInvocationError::Timeout { .. }));
        assert!(matches!(cancelled, EngineInvocationError::Cancelled));

        let _ = fs::remove_dir_all(root);
    }
}

