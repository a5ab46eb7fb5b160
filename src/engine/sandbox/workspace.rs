//! Per-submission scratch directory.
//!
//! Every submission gets its own directory under the configured workspace
//! root. The directory is removed by [`Workspace::dispose`] on the normal path
//! and by the underlying `TempDir` destructor if the pipeline is dropped early.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use uuid::Uuid;

use crate::{
    engine::sandbox::{Language, LanguageSpec},
    error::{EngineError, EngineResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fixture {
    Input,
    ExpectedOutput,
}

impl Fixture {
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Input => "input.txt",
            Self::ExpectedOutput => "expected.txt",
        }
    }
}

#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    dir: TempDir,
}

impl Workspace {
    pub async fn create(root: &Path, id: Uuid) -> EngineResult<Self> {
        tokio::fs::create_dir_all(root).await.map_err(|err| {
            tracing::error!(root = %root.display(), error = %err, "cannot create workspace root");
            EngineError::Workspace(format!("cannot create workspace root: {err}"))
        })?;

        let root = root.to_path_buf();
        let prefix = format!("submission-{}-", id.as_simple());
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix(&prefix).tempdir_in(&root)
        })
        .await
        .map_err(|err| EngineError::Internal(format!("workspace task failed: {err}")))?
        .map_err(|err| EngineError::Workspace(format!("cannot allocate workspace: {err}")))?;

        tracing::debug!(submission_id = %id, path = %dir.path().display(), "workspace created");
        Ok(Self { id, dir })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes the submission source under the language's fixed file name.
    pub async fn write_source(&self, language: Language, code: &str) -> EngineResult<PathBuf> {
        let path = LanguageSpec::for_language(language).source_path(self.path());
        self.write_file(&path, code).await?;
        Ok(path)
    }

    pub async fn write_fixture(&self, fixture: Fixture, text: &str) -> EngineResult<PathBuf> {
        let path = self.path().join(fixture.file_name());
        self.write_file(&path, text).await?;
        Ok(path)
    }

    pub async fn read_fixture(&self, fixture: Fixture) -> EngineResult<String> {
        let path = self.path().join(fixture.file_name());
        tokio::fs::read_to_string(&path).await.map_err(|err| {
            EngineError::Workspace(format!("cannot read {}: {err}", fixture.file_name()))
        })
    }

    /// Removes the directory and everything the submission produced in it.
    pub async fn dispose(self) {
        let id = self.id;
        let path = self.path().to_path_buf();
        let dir = self.dir;
        match tokio::task::spawn_blocking(move || dir.close()).await {
            Ok(Ok(())) => {
                tracing::debug!(submission_id = %id, "workspace removed");
            }
            Ok(Err(err)) => {
                tracing::warn!(
                    submission_id = %id,
                    path = %path.display(),
                    error = %err,
                    "failed to remove workspace"
                );
            }
            Err(err) => {
                tracing::warn!(submission_id = %id, error = %err, "workspace cleanup task failed");
            }
        }
    }

    async fn write_file(&self, path: &Path, contents: &str) -> EngineResult<()> {
        let name = path
            .file_name()
            .map_or_else(|| "file".into(), |name| name.to_string_lossy());
        tokio::fs::write(path, contents.as_bytes())
            .await
            .map_err(|err| EngineError::Workspace(format!("cannot write {name}: {err}")))
    }
}
