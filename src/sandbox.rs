// src/sandbox.rs - Isolated execution of generated animation code
//! Generated code is untrusted. It runs as a subprocess in its own scratch
//! directory with no access to the service's persistence layer; the sandbox
//! is modeled as a pure function from code text to either a rendered file
//! or a structured error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Classification of a validation/execution failure, fed back to the
/// code agent so the revision prompt can be specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxErrorKind {
    Syntax,
    Runtime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxError {
    pub kind: SandboxErrorKind,
    pub message: String,
}

impl std::fmt::Display for SandboxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            SandboxErrorKind::Syntax => "syntax",
            SandboxErrorKind::Runtime => "runtime",
        };
        write!(f, "{} error: {}", kind, self.message)
    }
}

/// Dry-run validation and real rendering of scene code.
#[async_trait]
pub trait CodeSandbox: Send + Sync {
    /// Dry-run the code: confirm it produces a renderable scene without
    /// writing frames. No side effects beyond the scratch directory.
    async fn validate(&self, code: &str) -> Result<(), SandboxError>;

    /// Execute validated code and return the path of the rendered video.
    async fn render(&self, code: &str, workdir: &Path) -> Result<PathBuf, SandboxError>;
}

/// Runs scene code through the manim CLI in a scratch directory.
#[derive(Clone)]
pub struct ManimSandbox {
    quality_flag: String,
}

impl ManimSandbox {
    pub fn new() -> Self {
        Self {
            // medium quality, faster render
            quality_flag: "-ql".to_string(),
        }
    }

    async fn run_manim(
        &self,
        code: &str,
        workdir: &Path,
        dry_run: bool,
    ) -> Result<PathBuf, SandboxError> {
        let scene_file = workdir.join("scene.py");
        let output_file = workdir.join("output.mp4");

        tokio::fs::write(&scene_file, code)
            .await
            .map_err(|e| SandboxError {
                kind: SandboxErrorKind::Runtime,
                message: format!("failed to write scene file: {}", e),
            })?;

        let mut command = Command::new("manim");
        command
            .arg("render")
            .arg(&self.quality_flag)
            .arg(&scene_file)
            .arg("-o")
            .arg(&output_file)
            .current_dir(workdir);
        if dry_run {
            command.arg("--dry_run");
        }

        let output = command.output().await.map_err(|e| SandboxError {
            kind: SandboxErrorKind::Runtime,
            message: format!("failed to spawn manim: {}", e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(classify_failure(&stderr));
        }

        Ok(output_file)
    }
}

impl Default for ManimSandbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CodeSandbox for ManimSandbox {
    async fn validate(&self, code: &str) -> Result<(), SandboxError> {
        let scratch = tempdir().map_err(|e| SandboxError {
            kind: SandboxErrorKind::Runtime,
            message: format!("failed to create scratch dir: {}", e),
        })?;
        let result = self.run_manim(code, &scratch, true).await;
        let _ = tokio::fs::remove_dir_all(&scratch).await;
        result.map(|_| ())
    }

    async fn render(&self, code: &str, workdir: &Path) -> Result<PathBuf, SandboxError> {
        self.run_manim(code, workdir, false).await
    }
}

fn tempdir() -> std::io::Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!("lumeo-sandbox-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Sort a manim stderr dump into syntax vs runtime, keeping the tail of the
/// trace (the part the model needs to see to fix the code).
fn classify_failure(stderr: &str) -> SandboxError {
    let kind = if stderr.contains("SyntaxError") || stderr.contains("IndentationError") {
        SandboxErrorKind::Syntax
    } else {
        SandboxErrorKind::Runtime
    };

    // keep the last chunk of the traceback; leading frames are noise
    let mut start = stderr.len().saturating_sub(2000);
    while start < stderr.len() && !stderr.is_char_boundary(start) {
        start += 1;
    }
    let message = stderr[start..].to_string();

    SandboxError { kind, message }
}
