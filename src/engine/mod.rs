pub mod api;
pub mod metrics;
pub mod models;
pub mod queue;
pub mod sandbox;
pub mod sanitize;
pub mod testcase;
pub mod verdict;
pub mod worker;

use std::{path::PathBuf, sync::Arc, time::Instant};

use uuid::Uuid;

use crate::{
    config::{CaseErrorPolicy, EngineConfig, ExecutionLimits, StderrPolicy},
    engine::{
        models::{ExecutionMode, ExecutionOutcome, Submission},
        sandbox::{Compiler, Fixture, ProcessRunner, RunCommand, Runner, Workspace},
        sanitize::Sanitizer,
        testcase::pair_cases,
        verdict::Grader,
    },
    error::EngineResult,
};

/// Workspace → compile → run or grade → sanitize, for one submission.
pub struct Engine {
    workspace_root: PathBuf,
    limits: ExecutionLimits,
    stderr_policy: StderrPolicy,
    case_error_policy: CaseErrorPolicy,
    compiler: Compiler,
    runner: Arc<dyn Runner>,
}

impl Engine {
    pub fn new(config: &EngineConfig) -> Self {
        let runner = Arc::new(ProcessRunner::new(config.limits.clone()));
        Self::with_runner(config, runner)
    }

    pub fn with_runner(config: &EngineConfig, runner: Arc<dyn Runner>) -> Self {
        Self {
            workspace_root: config.workspace_root.clone(),
            limits: config.limits.clone(),
            stderr_policy: config.stderr_policy,
            case_error_policy: config.case_error_policy,
            compiler: Compiler::new(
                config.toolchain.clone(),
                config.limits.clone(),
                config.stderr_policy,
            ),
            runner,
        }
    }

    /// Runs the whole pipeline. The workspace is gone by the time this returns,
    /// and compiler/runtime error text no longer mentions host paths.
    pub async fn execute(
        &self,
        id: Uuid,
        mode: ExecutionMode,
        submission: &Submission,
    ) -> EngineResult<ExecutionOutcome> {
        let started = Instant::now();
        let workspace = Workspace::create(&self.workspace_root, id).await?;
        let sanitizer = Sanitizer::new(submission.language, workspace.path());

        let result = self.pipeline(mode, submission, &workspace, &sanitizer).await;
        workspace.dispose().await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => tracing::info!(
                submission_id = %id,
                language = %submission.language,
                mode = mode.as_str(),
                elapsed_ms,
                "submission finished"
            ),
            Err(err) => tracing::info!(
                submission_id = %id,
                language = %submission.language,
                mode = mode.as_str(),
                elapsed_ms,
                error = err.message(),
                "submission failed"
            ),
        }

        result.map_err(|err| err.map_diagnostic(|text| sanitizer.clean(text)))
    }

    async fn pipeline(
        &self,
        mode: ExecutionMode,
        submission: &Submission,
        workspace: &Workspace,
        sanitizer: &Sanitizer,
    ) -> EngineResult<ExecutionOutcome> {
        let language = submission.language;
        workspace.write_source(language, &submission.code).await?;
        workspace
            .write_fixture(Fixture::Input, &submission.raw_input)
            .await?;
        if let Some(expected) = &submission.raw_expected_output {
            workspace
                .write_fixture(Fixture::ExpectedOutput, expected)
                .await?;
        }

        let command = self
            .compiler
            .prepare(language, workspace, &submission.code)
            .await?;

        match mode {
            ExecutionMode::Run => self.run_once(&command, &submission.raw_input).await,
            ExecutionMode::Submit => {
                let raw_input = workspace.read_fixture(Fixture::Input).await?;
                let raw_expected = match submission.raw_expected_output {
                    Some(_) => workspace.read_fixture(Fixture::ExpectedOutput).await?,
                    None => String::new(),
                };
                let cases = pair_cases(&raw_input, &raw_expected);
                tracing::debug!(
                    submission_id = %workspace.id(),
                    cases = cases.len(),
                    "grading submission"
                );

                let grader = Grader::new(
                    self.runner.as_ref(),
                    sanitizer,
                    self.stderr_policy,
                    self.case_error_policy,
                    self.limits.run_timeout(),
                );
                let result = grader.grade(&command, &cases).await?;
                Ok(ExecutionOutcome::Graded(result))
            }
        }
    }

    async fn run_once(&self, command: &RunCommand, stdin: &str) -> EngineResult<ExecutionOutcome> {
        let output = self.runner.run(command, stdin).await?;
        let stdout = output.classify(self.stderr_policy, self.limits.run_timeout())?;
        Ok(ExecutionOutcome::Output(stdout))
    }
}

#[cfg(test)]
mod tests {
    use std::{process::Stdio, time::Duration};

    use async_trait::async_trait;

    use super::*;
    use crate::{
        engine::{
            sandbox::{Language, ProcessOutput},
            verdict::Verdict,
        },
        error::EngineError,
    };

    fn has_tool(program: &str) -> bool {
        std::process::Command::new(program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    }

    fn config(root: &std::path::Path) -> EngineConfig {
        EngineConfig::for_tests(root)
    }

    fn submission(language: Language, code: &str, input: &str, expected: Option<&str>) -> Submission {
        Submission {
            language,
            code: code.to_string(),
            raw_input: input.to_string(),
            raw_expected_output: expected.map(str::to_string),
        }
    }

    fn leftover_entries(root: &std::path::Path) -> usize {
        std::fs::read_dir(root).map(|dir| dir.count()).unwrap_or(0)
    }

    /// Echoes stdin back; stdin `crash` fails with the source path on stderr.
    struct EchoRunner;

    #[async_trait]
    impl Runner for EchoRunner {
        async fn run(&self, command: &RunCommand, stdin: &str) -> EngineResult<ProcessOutput> {
            let (stdout, stderr, exit_code) = if stdin == "crash" {
                let path = command.work_dir.join("main.py");
                (String::new(), format!("{} crashed", path.display()), Some(1))
            } else {
                (stdin.to_string(), String::new(), Some(0))
            };
            Ok(ProcessOutput {
                stdout,
                stderr,
                exit_code,
                signal: None,
                timed_out: false,
                duration: Duration::from_millis(1),
            })
        }
    }

    fn echo_engine(root: &std::path::Path) -> Engine {
        Engine::with_runner(&config(root), Arc::new(EchoRunner))
    }

    #[tokio::test]
    async fn run_mode_feeds_whole_input_once() {
        let root = tempfile::tempdir().unwrap();
        let engine = echo_engine(root.path());
        let outcome = engine
            .execute(
                Uuid::new_v4(),
                ExecutionMode::Run,
                &submission(Language::Py, "print(input())", "a\n------\nb\n", None),
            )
            .await
            .unwrap();

        match outcome {
            ExecutionOutcome::Output(out) => assert_eq!(out, "a\n------\nb"),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(leftover_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn submit_mode_grades_each_case() {
        let root = tempfile::tempdir().unwrap();
        let engine = echo_engine(root.path());
        let outcome = engine
            .execute(
                Uuid::new_v4(),
                ExecutionMode::Submit,
                &submission(Language::Py, "x", "1\n------\n2\n------\n3", Some("1\n------\n9")),
            )
            .await
            .unwrap();

        let ExecutionOutcome::Graded(result) = outcome else {
            panic!("expected graded outcome");
        };
        assert_eq!(result.total, 3);
        assert_eq!(result.passed, 1);
        assert_eq!(result.failed, 2);
        assert_eq!(result.verdicts[2].expected, "");
        assert_eq!(leftover_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn runtime_errors_are_sanitized() {
        let root = tempfile::tempdir().unwrap();
        let engine = echo_engine(root.path());
        let err = engine
            .execute(
                Uuid::new_v4(),
                ExecutionMode::Run,
                &submission(Language::Py, "x", "crash", None),
            )
            .await
            .unwrap_err();

        assert_eq!(err.message(), "Runtime Error");
        assert_eq!(err.detail(), "YourCode.py crashed");
        assert_eq!(leftover_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn python_cases_pass_end_to_end() {
        if !has_tool("python3") {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let engine = Engine::new(&config(root.path()));
        let outcome = engine
            .execute(
                Uuid::new_v4(),
                ExecutionMode::Submit,
                &submission(
                    Language::Py,
                    "print(input())",
                    "hello\n------\nworld",
                    Some("hello\n------\nworld"),
                ),
            )
            .await
            .unwrap();

        let ExecutionOutcome::Graded(result) = outcome else {
            panic!("expected graded outcome");
        };
        assert_eq!(result.total, 2);
        assert_eq!(result.passed, 2);
        assert_eq!(result.overall(), Verdict::Passed);
    }

    #[tokio::test]
    async fn grading_is_repeatable() {
        if !has_tool("python3") {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let engine = Engine::new(&config(root.path()));
        let sub = submission(
            Language::Py,
            "n = int(input())\nprint(n * n)",
            "2\n------\n3\n------\n4",
            Some("4\n------\n9\n------\n15"),
        );

        let mut results = Vec::new();
        for _ in 0..2 {
            let ExecutionOutcome::Graded(result) = engine
                .execute(Uuid::new_v4(), ExecutionMode::Submit, &sub)
                .await
                .unwrap()
            else {
                panic!("expected graded outcome");
            };
            results.push(
                result
                    .verdicts
                    .iter()
                    .map(|case| case.verdict)
                    .collect::<Vec<_>>(),
            );
        }
        assert_eq!(results[0], results[1]);
        assert_eq!(results[0], vec![Verdict::Passed, Verdict::Passed, Verdict::Failed]);
    }

    #[tokio::test]
    async fn stderr_noise_depends_on_policy() {
        if !has_tool("python3") {
            return;
        }
        let code = "import sys\nsys.stderr.write('debug\\n')\nprint(input())";
        let sub = submission(Language::Py, code, "7", Some("7"));

        let root = tempfile::tempdir().unwrap();
        let strict = Engine::new(&config(root.path()));
        let err = strict
            .execute(Uuid::new_v4(), ExecutionMode::Run, &sub)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Runtime(ref msg) if msg == "debug"));

        let mut lenient_config = config(root.path());
        lenient_config.stderr_policy = StderrPolicy::Lenient;
        let lenient = Engine::new(&lenient_config);
        let ExecutionOutcome::Graded(result) = lenient
            .execute(Uuid::new_v4(), ExecutionMode::Submit, &sub)
            .await
            .unwrap()
        else {
            panic!("expected graded outcome");
        };
        assert_eq!(result.overall(), Verdict::Passed);
    }

    #[tokio::test]
    async fn cpp_compile_error_hides_workspace_path() {
        if !has_tool("g++") {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let engine = Engine::new(&config(root.path()));
        let err = engine
            .execute(
                Uuid::new_v4(),
                ExecutionMode::Run,
                &submission(Language::Cpp, "int main() { int x = 1 return x; }", "", None),
            )
            .await
            .unwrap_err();

        assert_eq!(err.message(), "Compilation Error");
        let detail = err.detail();
        assert!(detail.contains("Line") || detail.contains("YourCode.cpp"));
        assert!(!detail.contains(&root.path().display().to_string()));
        assert_eq!(leftover_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn java_cases_pass_end_to_end() {
        if !has_tool("javac") || !has_tool("java") {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let mut config = config(root.path());
        // JVM startup is slow on shared runners and may print notices on stderr.
        config.limits.run_timeout_ms = 10_000;
        config.stderr_policy = StderrPolicy::Lenient;
        let engine = Engine::new(&config);

        let code = "import java.util.Scanner;\n\
public class Main {\n\
    public static void main(String[] args) {\n\
        Scanner in = new Scanner(System.in);\n\
        int n = in.nextInt();\n\
        System.out.println(n * n);\n\
    }\n\
}\n";
        let outcome = engine
            .execute(
                Uuid::new_v4(),
                ExecutionMode::Submit,
                &submission(Language::Java, code, "3\n------\n4", Some("9\n------\n16")),
            )
            .await
            .unwrap();

        let ExecutionOutcome::Graded(result) = outcome else {
            panic!("expected graded outcome");
        };
        assert_eq!(result.total, 2);
        assert_eq!(result.passed, 2);
        assert_eq!(result.verdicts[1].actual, "16");
        assert_eq!(leftover_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn workspace_failures_hide_host_paths() {
        let scratch = tempfile::tempdir().unwrap();
        let not_a_dir = scratch.path().join("occupied");
        std::fs::write(&not_a_dir, "x").unwrap();

        let engine = echo_engine(&not_a_dir);
        let err = engine
            .execute(
                Uuid::new_v4(),
                ExecutionMode::Run,
                &submission(Language::Py, "print(1)", "", None),
            )
            .await
            .unwrap_err();
        assert_eq!(err.message(), "Workspace Error");
        assert!(!err.detail().contains(&scratch.path().display().to_string()));
    }

    #[tokio::test]
    async fn java_without_main_is_rejected_before_compiling() {
        let root = tempfile::tempdir().unwrap();
        let mut config = config(root.path());
        config.toolchain.javac = "/nonexistent/javac".to_string();
        let engine = Engine::new(&config);

        let err = engine
            .execute(
                Uuid::new_v4(),
                ExecutionMode::Run,
                &submission(Language::Java, "public class Solution {}", "", None),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Compile(_)));
        assert_eq!(leftover_entries(root.path()), 0);
    }
}
