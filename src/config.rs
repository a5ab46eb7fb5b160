use std::{env, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub bind_addr: SocketAddr,
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub workspace_root: PathBuf,
    pub limits: ExecutionLimits,
    pub request_limits: RequestLimits,
    pub stderr_policy: StderrPolicy,
    pub case_error_policy: CaseErrorPolicy,
    pub toolchain: Toolchain,
    pub log_level: String,
    pub log_format: LogFormat,
}

/// Ceilings applied to every compile and every child process.
#[derive(Debug, Clone)]
pub struct ExecutionLimits {
    pub run_timeout_ms: u64,
    pub compile_timeout_ms: u64,
    pub memory_mb: u64,
    /// RLIMIT_NPROC for each child. The kernel counts every thread the user
    /// owns against it, so `0` (no limit) is the default.
    pub max_processes: u64,
    pub max_file_size_bytes: u64,
    pub max_output_bytes: usize,
}

impl ExecutionLimits {
    pub fn normalized(mut self) -> Self {
        self.run_timeout_ms = self.run_timeout_ms.clamp(50, 60_000);
        self.compile_timeout_ms = self.compile_timeout_ms.clamp(1_000, 120_000);
        self.memory_mb = self.memory_mb.clamp(32, 8192);
        self.max_processes = self.max_processes.min(1024);
        self.max_file_size_bytes = self.max_file_size_bytes.clamp(1024, 1024 * 1024 * 1024);
        self.max_output_bytes = self.max_output_bytes.clamp(1024, 16 * 1024 * 1024);
        self
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_timeout_ms)
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            run_timeout_ms: 2_000,
            compile_timeout_ms: 10_000,
            memory_mb: 256,
            max_processes: 0,
            max_file_size_bytes: 16 * 1024 * 1024,
            max_output_bytes: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestLimits {
    pub max_code_bytes: usize,
    pub max_input_bytes: usize,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_code_bytes: 100_000,
            max_input_bytes: 1_000_000,
        }
    }
}

/// Binaries used to compile and launch submissions.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub cxx: String,
    pub javac: String,
    pub java: String,
    pub python: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            cxx: "g++".to_string(),
            javac: "javac".to_string(),
            java: "java".to_string(),
            python: "python3".to_string(),
        }
    }
}

/// How output on stderr is judged when the process otherwise succeeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StderrPolicy {
    /// Any stderr output fails the run, even with exit status 0.
    #[default]
    Strict,
    /// Only the exit status decides.
    Lenient,
}

impl FromStr for StderrPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            _ => Err(format!("unsupported stderr policy: {s}")),
        }
    }
}

/// What graded mode does when a single case crashes or times out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaseErrorPolicy {
    /// Record the case as failed and keep going.
    #[default]
    Score,
    /// Fail the whole submission with the case's error.
    Abort,
}

impl FromStr for CaseErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "score" => Ok(Self::Score),
            "abort" => Ok(Self::Abort),
            _ => Err(format!("unsupported case error policy: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(format!("unsupported log format: {s}")),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse::<SocketAddr>()
            .context("invalid BIND_ADDR")?;

        let defaults = ExecutionLimits::default();
        let limits = ExecutionLimits {
            run_timeout_ms: parse_env("RUN_TIMEOUT_MS", defaults.run_timeout_ms),
            compile_timeout_ms: parse_env("COMPILE_TIMEOUT_MS", defaults.compile_timeout_ms),
            memory_mb: parse_env("MEMORY_LIMIT_MB", defaults.memory_mb),
            max_processes: parse_env("MAX_PROCESSES", defaults.max_processes),
            max_file_size_bytes: parse_env("MAX_FILE_SIZE_BYTES", defaults.max_file_size_bytes),
            max_output_bytes: parse_env("MAX_OUTPUT_BYTES", defaults.max_output_bytes),
        }
        .normalized();

        let request_defaults = RequestLimits::default();
        let request_limits = RequestLimits {
            max_code_bytes: parse_env("MAX_CODE_BYTES", request_defaults.max_code_bytes),
            max_input_bytes: parse_env("MAX_INPUT_BYTES", request_defaults.max_input_bytes),
        };

        let toolchain_defaults = Toolchain::default();
        let toolchain = Toolchain {
            cxx: env::var("CXX").unwrap_or(toolchain_defaults.cxx),
            javac: env::var("JAVAC").unwrap_or(toolchain_defaults.javac),
            java: env::var("JAVA").unwrap_or(toolchain_defaults.java),
            python: env::var("PYTHON").unwrap_or(toolchain_defaults.python),
        };

        let workspace_root = env::var("WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir().join("judge-workspaces"));

        Ok(Self {
            bind_addr,
            worker_count: parse_env("WORKER_COUNT", 4usize).clamp(1, 256),
            queue_capacity: parse_env("QUEUE_CAPACITY", 256usize).max(1),
            workspace_root,
            limits,
            request_limits,
            stderr_policy: parse_env("STDERR_POLICY", StderrPolicy::Strict),
            case_error_policy: parse_env("CASE_ERROR_POLICY", CaseErrorPolicy::Score),
            toolchain,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: parse_env("LOG_FORMAT", LogFormat::Compact),
        })
    }

    /// A config rooted at `workspace_root`, with defaults everywhere else.
    #[cfg(test)]
    pub fn for_tests(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            worker_count: 2,
            queue_capacity: 8,
            workspace_root: workspace_root.into(),
            limits: ExecutionLimits::default(),
            request_limits: RequestLimits::default(),
            stderr_policy: StderrPolicy::Strict,
            case_error_policy: CaseErrorPolicy::Score,
            toolchain: Toolchain::default(),
            log_level: "debug".to_string(),
            log_format: LogFormat::Compact,
        }
    }
}

fn parse_env<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
