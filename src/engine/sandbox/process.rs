use std::{
    path::PathBuf,
    process::Stdio,
    time::{Duration, Instant},
};

use anyhow::Context;
use async_trait::async_trait;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    process::Command,
};

use crate::{
    config::{ExecutionLimits, StderrPolicy},
    engine::sandbox::Runner,
    error::{EngineError, EngineResult},
};

/// A fully resolved program invocation.
#[derive(Debug, Clone)]
pub struct RunCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
    pub limit_address_space: bool,
}

impl RunCommand {
    pub fn new(program: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            work_dir: work_dir.into(),
            limit_address_space: true,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn without_address_space_limit(mut self) -> Self {
        self.limit_address_space = false;
        self
    }
}

/// What a child process did, before any judgement is applied.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub timed_out: bool,
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }

    /// Turns the raw outcome into the program's trimmed stdout or a
    /// runtime/timeout failure.
    pub fn classify(self, policy: StderrPolicy, timeout: Duration) -> EngineResult<String> {
        if self.timed_out {
            return Err(EngineError::Timeout {
                limit_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            });
        }

        let stderr = self.stderr.trim();
        let failed_exit = self.exit_code != Some(0);
        let noisy = policy == StderrPolicy::Strict && !stderr.is_empty();

        if failed_exit || noisy {
            let message = if !stderr.is_empty() {
                stderr.to_string()
            } else if let Some(signal) = self.signal {
                format!("process terminated by signal {signal}")
            } else {
                format!(
                    "process exited with status {}",
                    self.exit_code.unwrap_or(-1)
                )
            };
            return Err(EngineError::Runtime(message));
        }

        Ok(self.stdout.trim().to_string())
    }
}

/// Time allowed to collect output when the program exits right at its deadline.
const DRAIN_GRACE: Duration = Duration::from_millis(50);

/// rlimits applied in the child between fork and exec.
#[derive(Debug, Clone, Copy)]
struct ChildLimits {
    cpu_seconds: u64,
    address_space_bytes: Option<u64>,
    max_processes: Option<u64>,
    max_file_size_bytes: u64,
}

pub struct ProcessRunner {
    limits: ExecutionLimits,
}

impl ProcessRunner {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self { limits }
    }

    pub fn timeout(&self) -> Duration {
        self.limits.run_timeout()
    }

    fn child_limits(&self, command: &RunCommand) -> ChildLimits {
        ChildLimits {
            cpu_seconds: self.limits.run_timeout_ms.div_ceil(1000) + 1,
            address_space_bytes: command
                .limit_address_space
                .then(|| self.limits.memory_mb * 1024 * 1024),
            max_processes: (self.limits.max_processes > 0).then_some(self.limits.max_processes),
            max_file_size_bytes: self.limits.max_file_size_bytes,
        }
    }
}

#[async_trait]
impl Runner for ProcessRunner {
    async fn run(&self, command: &RunCommand, stdin: &str) -> EngineResult<ProcessOutput> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(&command.work_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            let limits = self.child_limits(command);
            cmd.process_group(0);
            // SAFETY: the closure only calls setrlimit, which is async-signal-safe.
            unsafe {
                cmd.pre_exec(move || apply_rlimits(&limits));
            }
        }

        let started = Instant::now();
        let deadline = started + self.timeout();
        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn {}", command.program.display()))?;
        let group = child.id();

        if let Some(mut pipe) = child.stdin.take() {
            let input = stdin.as_bytes().to_vec();
            tokio::spawn(async move {
                // Programs that exit without reading everything close the pipe early.
                let _ = pipe.write_all(&input).await;
            });
        }

        let stdout = child.stdout.take().context("missing stdout pipe")?;
        let stderr = child.stderr.take().context("missing stderr pipe")?;
        let limit = self.limits.max_output_bytes;
        let mut stdout_task = tokio::spawn(async move { read_limited(stdout, limit).await });
        let mut stderr_task = tokio::spawn(async move { read_limited(stderr, limit).await });

        let status = match tokio::time::timeout_at(deadline.into(), child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(err)) => {
                kill_process_group(group);
                stdout_task.abort();
                stderr_task.abort();
                return Err(anyhow::Error::new(err)
                    .context("failed waiting for child process")
                    .into());
            }
            Err(_) => {
                kill_process_group(group);
                let _ = child.kill().await;
                None
            }
        };

        // Anything the program left running in the background dies with it.
        if status.is_some() {
            kill_process_group(group);
        }

        // A process that left the group can still hold the pipes open, so the
        // drain shares the run deadline.
        let drain_deadline = deadline.max(Instant::now() + DRAIN_GRACE);
        let drained = match status {
            Some(_) => tokio::time::timeout_at(drain_deadline.into(), async {
                let stdout = (&mut stdout_task).await.unwrap_or_default();
                let stderr = (&mut stderr_task).await.unwrap_or_default();
                (stdout, stderr)
            })
            .await
            .ok(),
            None => None,
        };
        let duration = started.elapsed();

        let (Some(status), Some((stdout, stderr))) = (status, drained) else {
            stdout_task.abort();
            stderr_task.abort();
            tracing::debug!(
                program = %command.program.display(),
                elapsed_ms = duration.as_millis() as u64,
                "child process timed out"
            );
            return Ok(ProcessOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: None,
                signal: None,
                timed_out: true,
                duration,
            });
        };

        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code: status.code(),
            signal,
            timed_out: false,
            duration,
        })
    }
}

#[cfg(unix)]
fn kill_process_group(group: Option<u32>) {
    use nix::{
        errno::Errno,
        sys::signal::{Signal, killpg},
        unistd::Pid,
    };

    let Some(pgid) = group.and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => tracing::debug!(pgid, error = %err, "failed to kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_group: Option<u32>) {}

#[cfg(unix)]
fn apply_rlimits(limits: &ChildLimits) -> std::io::Result<()> {
    use nix::sys::resource::{Resource, setrlimit};

    setrlimit(Resource::RLIMIT_CPU, limits.cpu_seconds, limits.cpu_seconds)?;
    setrlimit(
        Resource::RLIMIT_FSIZE,
        limits.max_file_size_bytes,
        limits.max_file_size_bytes,
    )?;
    setrlimit(Resource::RLIMIT_CORE, 0, 0)?;
    if let Some(bytes) = limits.address_space_bytes {
        setrlimit(Resource::RLIMIT_AS, bytes, bytes)?;
    }
    if let Some(count) = limits.max_processes {
        setrlimit(Resource::RLIMIT_NPROC, count, count)?;
    }
    Ok(())
}

async fn read_limited<R>(mut reader: R, limit: usize) -> Vec<u8>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut out = Vec::with_capacity(limit.min(8192));
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if out.len() < limit {
                    let remaining = limit - out.len();
                    out.extend_from_slice(&chunk[..remaining.min(n)]);
                }
            }
            Err(_) => break,
        }
    }
    out
}
