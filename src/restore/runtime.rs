use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Cooperative stop signal shared between the caller and a running
/// invocation. Cloning hands out another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Limits applied to one invocation. An empty budget blocks until the child
/// exits, matching the engine's historical behavior.
#[derive(Debug, Clone, Default)]
pub struct InvocationBudget {
    pub deadline: Option<Duration>,
    pub cancel: Option<CancelToken>,
}

impl InvocationBudget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_unlimited(&self) -> bool {
        self.deadline.is_none() && self.cancel.is_none()
    }
}

#[derive(Debug)]
pub enum CommandWait {
    Completed(CommandOutput),
    DeadlineExpired { waited: Duration },
    Cancelled,
}

pub trait EngineCommandRunner: Send + Sync + 'static {
    fn run(&self, spec: &CommandSpec, budget: &InvocationBudget)
        -> std::io::Result<CommandWait>;
}

#[derive(Debug, Default, Clone)]
pub struct StdEngineCommandRunner;

impl EngineCommandRunner for StdEngineCommandRunner {
    fn run(
        &self,
        spec: &CommandSpec,
        budget: &InvocationBudget,
    ) -> std::io::Result<CommandWait> {
        if budget.is_unlimited() {
            let output = Command::new(spec.program.as_str())
                .args(spec.args.iter().map(String::as_str))
                .current_dir(spec.cwd.as_path())
                .output()?;
            return Ok(CommandWait::Completed(CommandOutput {
                status_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(output.stdout.as_slice()).to_string(),
                stderr: String::from_utf8_lossy(output.stderr.as_slice()).to_string(),
            }));
        }

        let mut child = Command::new(spec.program.as_str())
            .args(spec.args.iter().map(String::as_str))
            .current_dir(spec.cwd.as_path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        // Drain pipes on their own threads so a chatty child cannot fill a
        // pipe buffer and stall while we poll for exit.
        let stdout_drain = spawn_pipe_drain(child.stdout.take());
        let stderr_drain = spawn_pipe_drain(child.stderr.take());

        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(CommandWait::Completed(CommandOutput {
                    status_code: status.code().unwrap_or(-1),
                    stdout: join_pipe_drain(stdout_drain),
                    stderr: join_pipe_drain(stderr_drain),
                }));
            }

            if budget
                .cancel
                .as_ref()
                .is_some_and(CancelToken::is_cancelled)
            {
                let _ = child.kill();
                let _ = child.wait();
                let _ = join_pipe_drain(stdout_drain);
                let _ = join_pipe_drain(stderr_drain);
                return Ok(CommandWait::Cancelled);
            }

            if let Some(deadline) = budget.deadline {
                let waited = started.elapsed();
                if waited >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = join_pipe_drain(stdout_drain);
                    let _ = join_pipe_drain(stderr_drain);
                    return Ok(CommandWait::DeadlineExpired { waited });
                }
            }

            std::thread::sleep(WAIT_POLL_INTERVAL);
        }
    }
}

fn spawn_pipe_drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut reader| {
        std::thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = reader.read_to_end(&mut buffer);
            String::from_utf8_lossy(buffer.as_slice()).to_string()
        })
    })
}

fn join_pipe_drain(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|drain| drain.join().ok())
        .unwrap_or_default()
}
