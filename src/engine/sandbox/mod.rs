mod compiler;
mod language;
mod process;
mod workspace;

use async_trait::async_trait;

use crate::error::EngineResult;

pub use compiler::Compiler;
pub use language::{Language, LanguageSpec};
pub use process::{ProcessOutput, ProcessRunner, RunCommand};
pub use workspace::{Fixture, Workspace};

/// Runs one program invocation to completion with the given stdin.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(&self, command: &RunCommand, stdin: &str) -> EngineResult<ProcessOutput>;
}
