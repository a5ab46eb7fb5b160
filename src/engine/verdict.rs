use std::{fmt, time::Duration};

use serde::Serialize;

use crate::{
    config::{CaseErrorPolicy, StderrPolicy},
    engine::{
        sandbox::{RunCommand, Runner},
        sanitize::Sanitizer,
        testcase::TestCase,
    },
    error::{EngineError, EngineResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Passed,
    Failed,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => f.write_str("Passed"),
            Self::Failed => f.write_str("Failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseVerdict {
    pub test_case: usize,
    pub expected: String,
    pub actual: String,
    pub verdict: Verdict,
    pub time_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub verdicts: Vec<CaseVerdict>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub total_time_ms: u64,
}

impl RunResult {
    fn record(&mut self, case: CaseVerdict) {
        match case.verdict {
            Verdict::Passed => self.passed += 1,
            Verdict::Failed => self.failed += 1,
        }
        self.total += 1;
        self.total_time_ms = self.total_time_ms.saturating_add(case.time_ms);
        self.verdicts.push(case);
    }

    /// `Passed` iff every case passed. An empty run passes.
    pub fn overall(&self) -> Verdict {
        if self.passed == self.total {
            Verdict::Passed
        } else {
            Verdict::Failed
        }
    }
}

/// Runs a prepared program against test cases one at a time.
pub struct Grader<'a> {
    runner: &'a dyn Runner,
    sanitizer: &'a Sanitizer,
    stderr_policy: StderrPolicy,
    case_error_policy: CaseErrorPolicy,
    timeout: Duration,
}

impl<'a> Grader<'a> {
    pub fn new(
        runner: &'a dyn Runner,
        sanitizer: &'a Sanitizer,
        stderr_policy: StderrPolicy,
        case_error_policy: CaseErrorPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            sanitizer,
            stderr_policy,
            case_error_policy,
            timeout,
        }
    }

    pub async fn grade(&self, command: &RunCommand, cases: &[TestCase]) -> EngineResult<RunResult> {
        let mut result = RunResult::default();

        for case in cases {
            let output = self.runner.run(command, &case.input).await?;
            let time_ms = output.elapsed_ms();
            let expected = case.expected_output.trim().to_string();

            let (actual, verdict) = match output.classify(self.stderr_policy, self.timeout) {
                Ok(stdout) => {
                    let verdict = if stdout == expected {
                        Verdict::Passed
                    } else {
                        Verdict::Failed
                    };
                    (stdout, verdict)
                }
                Err(err) => match self.case_error_policy {
                    CaseErrorPolicy::Abort => {
                        tracing::debug!(case = case.index, error = %err, "aborting on case error");
                        return Err(err);
                    }
                    CaseErrorPolicy::Score => (self.describe(&err), Verdict::Failed),
                },
            };

            tracing::debug!(case = case.index, elapsed_ms = time_ms, %verdict, "case graded");
            result.record(CaseVerdict {
                test_case: case.index,
                expected,
                actual,
                verdict,
                time_ms,
            });
        }

        Ok(result)
    }

    fn describe(&self, err: &EngineError) -> String {
        format!("{}: {}", err.message(), self.sanitizer.clean(&err.detail()))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        path::Path,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;

    use super::*;
    use crate::engine::{
        sandbox::{Language, ProcessOutput},
        testcase::pair_cases,
    };

    /// Echoes stdin, except for a few magic inputs.
    struct FakeRunner {
        calls: AtomicUsize,
    }

    impl FakeRunner {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Runner for FakeRunner {
        async fn run(&self, _command: &RunCommand, stdin: &str) -> EngineResult<ProcessOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut out = ProcessOutput {
                stdout: format!("{stdin}\n"),
                stderr: String::new(),
                exit_code: Some(0),
                signal: None,
                timed_out: false,
                duration: Duration::from_millis(5),
            };
            match stdin {
                "crash" => {
                    out.stdout.clear();
                    out.stderr = "boom in /work/ws/main.py".to_string();
                    out.exit_code = Some(1);
                }
                "hang" => {
                    out.stdout.clear();
                    out.exit_code = None;
                    out.timed_out = true;
                }
                "warn" => out.stderr = "deprecated".to_string(),
                _ => {}
            }
            Ok(out)
        }
    }

    fn command() -> RunCommand {
        RunCommand::new("prog", "/work/ws")
    }

    fn sanitizer() -> Sanitizer {
        Sanitizer::new(Language::Py, Path::new("/work/ws"))
    }

    async fn grade(
        runner: &FakeRunner,
        stderr: StderrPolicy,
        on_error: CaseErrorPolicy,
        input: &str,
        expected: &str,
    ) -> EngineResult<RunResult> {
        let sanitizer = sanitizer();
        let grader = Grader::new(runner, &sanitizer, stderr, on_error, Duration::from_secs(2));
        grader.grade(&command(), &pair_cases(input, expected)).await
    }

    #[tokio::test]
    async fn compares_trimmed_output() {
        let runner = FakeRunner::new();
        let result = grade(
            &runner,
            StderrPolicy::Strict,
            CaseErrorPolicy::Score,
            "hello\n------\nworld\n------\nx",
            "  hello \n------\nWORLD\n------\nx",
        )
        .await
        .unwrap();

        assert_eq!(result.total, 3);
        assert_eq!(result.passed, 2);
        assert_eq!(result.failed, 1);
        assert_eq!(result.verdicts[1].verdict, Verdict::Failed);
        assert_eq!(result.verdicts[1].actual, "world");
        assert_eq!(result.verdicts[1].expected, "WORLD");
        assert_eq!(result.total_time_ms, 15);
        assert_eq!(result.overall(), Verdict::Failed);
    }

    #[tokio::test]
    async fn empty_fixture_passes_vacuously() {
        let runner = FakeRunner::new();
        let result = grade(&runner, StderrPolicy::Strict, CaseErrorPolicy::Score, "", "")
            .await
            .unwrap();
        assert_eq!(result.total, 0);
        assert_eq!(result.overall(), Verdict::Passed);
        assert_eq!(runner.calls(), 0);
    }

    #[tokio::test]
    async fn score_policy_records_failures_and_continues() {
        let runner = FakeRunner::new();
        let result = grade(
            &runner,
            StderrPolicy::Strict,
            CaseErrorPolicy::Score,
            "crash\n------\nhang\n------\nok",
            "x\n------\ny\n------\nok",
        )
        .await
        .unwrap();

        assert_eq!(runner.calls(), 3);
        assert_eq!(result.total, result.passed + result.failed);
        assert_eq!(result.total, result.verdicts.len());
        assert_eq!(result.passed, 1);
        assert_eq!(result.verdicts[0].actual, "Runtime Error: boom in YourCode.py");
        assert!(result.verdicts[1].actual.starts_with("Time Limit Exceeded"));
        assert_eq!(result.verdicts[2].verdict, Verdict::Passed);
    }

    #[tokio::test]
    async fn abort_policy_stops_at_first_error() {
        let runner = FakeRunner::new();
        let err = grade(
            &runner,
            StderrPolicy::Strict,
            CaseErrorPolicy::Abort,
            "ok\n------\nhang\n------\nok",
            "ok\n------\nok\n------\nok",
        )
        .await
        .unwrap_err();

        assert!(matches!(err, EngineError::Timeout { limit_ms: 2000 }));
        assert_eq!(runner.calls(), 2);
    }

    #[tokio::test]
    async fn stderr_policy_applies_per_case() {
        let runner = FakeRunner::new();
        let strict = grade(&runner, StderrPolicy::Strict, CaseErrorPolicy::Score, "warn", "warn")
            .await
            .unwrap();
        assert_eq!(strict.overall(), Verdict::Failed);

        let lenient = grade(&runner, StderrPolicy::Lenient, CaseErrorPolicy::Score, "warn", "warn")
            .await
            .unwrap();
        assert_eq!(lenient.overall(), Verdict::Passed);
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let mut result = RunResult::default();
        result.record(CaseVerdict {
            test_case: 1,
            expected: "a".into(),
            actual: "a".into(),
            verdict: Verdict::Passed,
            time_ms: 3,
        });
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["totalTimeMs"], 3);
        assert_eq!(json["verdicts"][0]["testCase"], 1);
        assert_eq!(json["verdicts"][0]["verdict"], "Passed");
    }
}
