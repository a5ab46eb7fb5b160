use serde::{Deserialize, Serialize};

use crate::{
    config::RequestLimits,
    engine::{
        sandbox::Language,
        verdict::{RunResult, Verdict},
    },
    error::{EngineError, EngineResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Feed the whole input once and return stdout.
    Run,
    /// Split fixtures into cases and grade each one.
    Submit,
}

impl ExecutionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Submit => "submit",
        }
    }
}

/// Request body shared by `/run` and `/submit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub expected_output: Option<String>,
}

/// A request that passed boundary validation.
#[derive(Debug, Clone)]
pub struct Submission {
    pub language: Language,
    pub code: String,
    pub raw_input: String,
    pub raw_expected_output: Option<String>,
}

impl ExecutionRequest {
    pub fn validate(self, mode: ExecutionMode, limits: &RequestLimits) -> EngineResult<Submission> {
        let language: Language = self.language.parse()?;

        if self.code.trim().is_empty() {
            return Err(EngineError::InvalidRequest("code must not be empty".into()));
        }
        if self.code.len() > limits.max_code_bytes {
            return Err(EngineError::InvalidRequest(format!(
                "code exceeds {} bytes",
                limits.max_code_bytes
            )));
        }
        if self.input.len() > limits.max_input_bytes {
            return Err(EngineError::InvalidRequest(format!(
                "input exceeds {} bytes",
                limits.max_input_bytes
            )));
        }
        let expected_len = self.expected_output.as_ref().map_or(0, String::len);
        if expected_len > limits.max_input_bytes {
            return Err(EngineError::InvalidRequest(format!(
                "expectedOutput exceeds {} bytes",
                limits.max_input_bytes
            )));
        }
        if mode == ExecutionMode::Submit && self.expected_output.is_none() {
            return Err(EngineError::InvalidRequest(
                "expectedOutput is required for submissions".into(),
            ));
        }

        Ok(Submission {
            language,
            code: self.code,
            raw_input: self.input,
            raw_expected_output: self.expected_output,
        })
    }
}

#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Output(String),
    Graded(RunResult),
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResponse {
    pub success: bool,
    pub output: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    #[serde(flatten)]
    pub result: RunResult,
    pub verdict: Verdict,
}

impl From<RunResult> for SubmitResponse {
    fn from(result: RunResult) -> Self {
        Self {
            success: true,
            verdict: result.overall(),
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(language: &str, code: &str) -> ExecutionRequest {
        ExecutionRequest {
            language: language.to_string(),
            code: code.to_string(),
            input: String::new(),
            expected_output: None,
        }
    }

    #[test]
    fn decodes_camel_case_body() {
        let body = r#"{"language":"py","code":"print(1)","expectedOutput":"1"}"#;
        let req: ExecutionRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.input, "");
        assert_eq!(req.expected_output.as_deref(), Some("1"));
    }

    #[test]
    fn rejects_unknown_language() {
        let err = request("rust", "fn main() {}")
            .validate(ExecutionMode::Run, &RequestLimits::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedLanguage(_)));
    }

    #[test]
    fn enforces_size_and_presence_rules() {
        let limits = RequestLimits {
            max_code_bytes: 8,
            max_input_bytes: 4,
        };

        let err = request("py", "   ").validate(ExecutionMode::Run, &limits).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));

        let err = request("py", "print(123456)")
            .validate(ExecutionMode::Run, &limits)
            .unwrap_err();
        assert!(err.detail().contains("code exceeds 8 bytes"));

        let mut big_input = request("py", "x=1");
        big_input.input = "12345".into();
        assert!(big_input.validate(ExecutionMode::Run, &limits).is_err());

        let err = request("py", "x=1")
            .validate(ExecutionMode::Submit, &limits)
            .unwrap_err();
        assert!(err.detail().contains("expectedOutput"));

        let submission = request("python", "x=1").validate(ExecutionMode::Run, &limits).unwrap();
        assert_eq!(submission.language, Language::Py);
    }

    #[test]
    fn submit_response_flattens_run_result() {
        let json = serde_json::to_value(SubmitResponse::from(RunResult::default())).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["total"], 0);
        assert_eq!(json["verdict"], "Passed");
        assert!(json["verdicts"].as_array().unwrap().is_empty());
    }
}
