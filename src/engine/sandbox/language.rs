use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Cpp,
    Py,
    Java,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpp => "cpp",
            Self::Py => "py",
            Self::Java => "java",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpp" | "c++" => Ok(Self::Cpp),
            "py" | "python" | "python3" => Ok(Self::Py),
            "java" => Ok(Self::Java),
            other => Err(EngineError::UnsupportedLanguage(other.to_string())),
        }
    }
}

/// File layout of a submission inside its workspace.
#[derive(Debug, Clone)]
pub struct LanguageSpec {
    pub source_name: &'static str,
    /// Name shown to users in place of the host path of the source file.
    pub placeholder: &'static str,
    /// Compiled output, relative to the workspace. `None` for interpreted languages.
    pub artifact_name: Option<&'static str>,
    /// Whether the address-space rlimit can be applied to the running program.
    pub limit_address_space: bool,
}

impl LanguageSpec {
    pub fn for_language(language: Language) -> Self {
        match language {
            Language::Cpp => Self {
                source_name: "main.cpp",
                placeholder: "YourCode.cpp",
                artifact_name: Some("main"),
                limit_address_space: true,
            },
            Language::Py => Self {
                source_name: "main.py",
                placeholder: "YourCode.py",
                artifact_name: None,
                limit_address_space: true,
            },
            // The JVM reserves far more virtual memory than it uses; the heap is
            // capped with -Xmx instead.
            Language::Java => Self {
                source_name: "Main.java",
                placeholder: "YourCode.java",
                artifact_name: Some("Main.class"),
                limit_address_space: false,
            },
        }
    }

    pub fn source_path(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(self.source_name)
    }

    pub fn artifact_path(&self, work_dir: &Path) -> Option<PathBuf> {
        self.artifact_name.map(|name| work_dir.join(name))
    }
}
