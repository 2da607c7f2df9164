// src/error.rs - Error taxonomy for the lecture pipeline
use thiserror::Error;

/// Stage of the pipeline a per-scene failure happened in.
/// Stored on the scene row so a failed lecture can tell the user
/// which scene broke and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneStage {
    Generation,
    Render,
}

impl std::fmt::Display for SceneStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneStage::Generation => write!(f, "generation"),
            SceneStage::Render => write!(f, "render"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The topic yielded no coherent plan. Fatal for the lecture.
    #[error("planning failed: {0}")]
    Planning(String),

    /// The agent loop exhausted its attempts for one scene.
    /// Absorbed by the orchestrator until the scene retry budget runs out.
    #[error("scene {index} generation failed: {detail}")]
    SceneGeneration { index: i32, detail: String },

    /// Rendering (TTS, animation execution or muxing) failed for one scene.
    #[error("scene {index} render failed: {detail}")]
    Render { index: i32, detail: String },

    /// All scenes succeeded but their artifacts are inconsistent
    /// (gapped/duplicated index, missing video). Signals a bug, never skipped.
    #[error("assembly failed: {0}")]
    Assembly(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("ffmpeg error: {0}")]
    Ffmpeg(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Scene-scoped failures feed the per-scene retry budget;
    /// everything else is lecture-fatal immediately.
    pub fn is_scene_scoped(&self) -> bool {
        matches!(
            self,
            PipelineError::SceneGeneration { .. } | PipelineError::Render { .. }
        )
    }

    pub fn scene_stage(&self) -> Option<SceneStage> {
        match self {
            PipelineError::SceneGeneration { .. } => Some(SceneStage::Generation),
            PipelineError::Render { .. } => Some(SceneStage::Render),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
