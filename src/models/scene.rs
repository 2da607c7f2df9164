// src/models/scene.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "scene_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SceneStatus {
    Processing,
    Completed,
    Failed,
}

/// One ordered segment of a lecture.
///
/// `index` is unique per lecture and defines playback order. `version`
/// strictly increases on every regeneration and is never reused; artifact
/// keys are tagged with it, so an artifact from an older version can never
/// be mistaken for current. `code` is non-null only after the agent loop
/// validated it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Scene {
    pub id: Uuid,
    pub user_id: String,
    pub lecture_id: Uuid,
    pub index: i32,
    pub version: i32,
    pub status: SceneStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub description: String,
    pub voiceover: String,
    pub user_prompt: Option<String>,
    pub code: Option<String>,
    pub audio_url: Option<String>,
    pub video_url: Option<String>,
    /// Last failure context (stage + message), kept so a failed lecture can
    /// point the user at the scene and stage that broke.
    pub last_error: Option<String>,
}

impl Scene {
    /// A scene counts as done only when its current version has a video.
    pub fn has_current_artifact(&self) -> bool {
        self.status == SceneStatus::Completed && self.video_url.is_some()
    }
}

/// Locators and timing for one rendered scene, returned by the renderer.
/// Immutable value; persistence goes through the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneArtifact {
    pub video_url: String,
    pub audio_url: String,
    pub duration_secs: f64,
}
