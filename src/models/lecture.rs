// src/models/lecture.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of a lecture. `Failed` is absorbing and reachable from any
/// non-terminal state; `Complete` is only reachable through `Assembling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "lecture_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LectureStatus {
    Draft,
    Planning,
    Generating,
    Assembling,
    Complete,
    Failed,
}

impl LectureStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LectureStatus::Complete | LectureStatus::Failed)
    }
}

/// Durable lecture record. Mutated only by the orchestrator and the
/// assembly stage; the pipeline never deletes it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lecture {
    pub id: Uuid,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub topic: String,
    pub resources: Option<String>,
    pub title: Option<String>,
    pub status: LectureStatus,
    pub voice_id: Option<String>,
    pub language: Option<String>,
    pub video_url: Option<String>,
    pub subtitles_url: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// Parameters for creating a draft lecture on user request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLecture {
    pub user_id: String,
    pub topic: String,
    pub resources: Option<String>,
    pub voice_id: Option<String>,
    pub language: Option<String>,
}
