//! Compile step for compiled languages.
//!
//! Turns a materialized workspace into a [`RunCommand`]. C++ goes through the
//! system C++ compiler, Java through `javac`, Python passes straight through.

use std::{path::Path, process::Stdio};

use anyhow::Context;
use tokio::process::Command;

use crate::{
    config::{ExecutionLimits, StderrPolicy, Toolchain},
    engine::sandbox::{Language, LanguageSpec, RunCommand, Workspace},
    error::{EngineError, EngineResult},
};

/// Entry class every Java submission has to declare.
pub const JAVA_ENTRY_CLASS: &str = "Main";

pub struct Compiler {
    toolchain: Toolchain,
    limits: ExecutionLimits,
    stderr_policy: StderrPolicy,
}

impl Compiler {
    pub fn new(toolchain: Toolchain, limits: ExecutionLimits, stderr_policy: StderrPolicy) -> Self {
        Self {
            toolchain,
            limits,
            stderr_policy,
        }
    }

    /// Compiles the source already written to `workspace` and returns the
    /// command that runs it.
    pub async fn prepare(
        &self,
        language: Language,
        workspace: &Workspace,
        code: &str,
    ) -> EngineResult<RunCommand> {
        let spec = LanguageSpec::for_language(language);
        let dir = workspace.path();
        let source = spec.source_path(dir);

        match language {
            Language::Cpp => {
                let artifact = spec
                    .artifact_path(dir)
                    .context("C++ layout has no artifact path")?;
                let args = vec![
                    "-std=c++17".to_string(),
                    "-O2".to_string(),
                    "-o".to_string(),
                    artifact.display().to_string(),
                    source.display().to_string(),
                ];
                let strict = self.stderr_policy == StderrPolicy::Strict;
                self.invoke(&self.toolchain.cxx, &args, dir, strict).await?;
            }
            Language::Java => {
                if !declares_main_class(code) {
                    return Err(EngineError::Compile(format!(
                        "Java submissions must declare a class named `{JAVA_ENTRY_CLASS}`"
                    )));
                }
                let args = vec![
                    "-encoding".to_string(),
                    "UTF-8".to_string(),
                    "-d".to_string(),
                    dir.display().to_string(),
                    source.display().to_string(),
                ];
                self.invoke(&self.toolchain.javac, &args, dir, false).await?;
            }
            Language::Py => {}
        }

        Ok(self.run_command(language, dir))
    }

    pub fn run_command(&self, language: Language, dir: &Path) -> RunCommand {
        let spec = LanguageSpec::for_language(language);
        let command = match language {
            Language::Cpp => RunCommand::new(dir.join(spec.artifact_name.unwrap_or("main")), dir),
            Language::Py => RunCommand::new(&self.toolchain.python, dir)
                .with_args([spec.source_path(dir).display().to_string()]),
            Language::Java => RunCommand::new(&self.toolchain.java, dir).with_args([
                format!("-Xmx{}m", self.limits.memory_mb),
                "-cp".to_string(),
                dir.display().to_string(),
                JAVA_ENTRY_CLASS.to_string(),
            ]),
        };
        if spec.limit_address_space {
            command
        } else {
            command.without_address_space_limit()
        }
    }

    async fn invoke(
        &self,
        program: &str,
        args: &[String],
        dir: &Path,
        fail_on_diagnostics: bool,
    ) -> EngineResult<()> {
        tracing::debug!(program, ?args, "invoking compiler");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let limit = self.limits.compile_timeout();
        let output = match tokio::time::timeout(limit, cmd.output()).await {
            Ok(result) => result.with_context(|| format!("failed to run compiler {program}"))?,
            Err(_) => {
                return Err(EngineError::Compile(format!(
                    "compilation timed out after {} ms",
                    limit.as_millis()
                )));
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

        if !output.status.success() {
            let diagnostics = match (stderr.is_empty(), stdout.is_empty()) {
                (false, _) => stderr,
                (true, false) => stdout,
                (true, true) => format!(
                    "compiler exited with status {}",
                    output.status.code().unwrap_or(-1)
                ),
            };
            return Err(EngineError::Compile(diagnostics));
        }

        if fail_on_diagnostics && !stderr.is_empty() {
            return Err(EngineError::Compile(stderr));
        }

        Ok(())
    }
}

/// Whether `code` declares `class Main`, ignoring modifiers and layout.
pub fn declares_main_class(code: &str) -> bool {
    let tokens: Vec<&str> = code
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .filter(|token| !token.is_empty())
        .collect();
    tokens
        .windows(2)
        .any(|pair| pair[0] == "class" && pair[1] == JAVA_ENTRY_CLASS)
}
