// src/store.rs - Single-writer persistence for lecture and scene records
//! The orchestrator is the only component that mutates pipeline state, and it
//! does so exclusively through this seam. Agents, the renderer and assembly
//! return immutable values; nothing else touches the tables.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Result, SceneStage};
use crate::models::{Lecture, LectureStatus, NewLecture, Scene, SceneArtifact};

#[async_trait]
pub trait PipelineStore: Send + Sync {
    async fn create_lecture(&self, new: NewLecture) -> Result<Lecture>;
    async fn get_lecture(&self, id: Uuid) -> Result<Option<Lecture>>;
    async fn set_lecture_status(&self, id: Uuid, status: LectureStatus) -> Result<()>;
    async fn set_lecture_title(&self, id: Uuid, title: &str) -> Result<()>;
    /// Write final artifact locators and mark the lecture complete in one step.
    async fn publish_lecture(
        &self,
        id: Uuid,
        video_url: &str,
        subtitles_url: &str,
        thumbnail_url: &str,
    ) -> Result<()>;

    async fn create_scene(
        &self,
        lecture_id: Uuid,
        user_id: &str,
        index: i32,
        description: &str,
        voiceover: &str,
    ) -> Result<Scene>;
    async fn get_scene(&self, lecture_id: Uuid, index: i32) -> Result<Option<Scene>>;
    /// All scenes of a lecture in `index` order.
    async fn list_scenes(&self, lecture_id: Uuid) -> Result<Vec<Scene>>;
    /// Increment `version`, clear code/artifacts/error, set status back to
    /// processing. Every regeneration goes through here before re-drafting.
    async fn bump_scene_version(&self, scene_id: Uuid, user_prompt: Option<&str>)
        -> Result<Scene>;
    /// Record validated code after the agent loop accepted it.
    async fn record_scene_code(&self, scene_id: Uuid, code: &str) -> Result<()>;
    /// Record rendered artifact locators and mark the scene completed, but
    /// only while the scene is still at `version`. Returns false (writing
    /// nothing) when a regeneration has moved the scene past that version,
    /// so a superseded render can never land as current.
    async fn record_scene_artifact(
        &self,
        scene_id: Uuid,
        version: i32,
        artifact: &SceneArtifact,
    ) -> Result<bool>;
    /// Record failure context (stage + message) and mark the scene failed.
    async fn record_scene_failure(
        &self,
        scene_id: Uuid,
        stage: SceneStage,
        message: &str,
    ) -> Result<()>;
}

/// Postgres-backed store over the shared pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PipelineStore for PgStore {
    async fn create_lecture(&self, new: NewLecture) -> Result<Lecture> {
        let lecture = sqlx::query_as::<_, Lecture>(
            r#"
            INSERT INTO lectures (user_id, topic, resources, voice_id, language, status)
            VALUES ($1, $2, $3, $4, $5, 'draft')
            RETURNING *
            "#,
        )
        .bind(&new.user_id)
        .bind(&new.topic)
        .bind(&new.resources)
        .bind(&new.voice_id)
        .bind(&new.language)
        .fetch_one(&self.pool)
        .await?;
        Ok(lecture)
    }

    async fn get_lecture(&self, id: Uuid) -> Result<Option<Lecture>> {
        let lecture = sqlx::query_as::<_, Lecture>("SELECT * FROM lectures WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(lecture)
    }

    async fn set_lecture_status(&self, id: Uuid, status: LectureStatus) -> Result<()> {
        sqlx::query("UPDATE lectures SET status = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_lecture_title(&self, id: Uuid, title: &str) -> Result<()> {
        sqlx::query("UPDATE lectures SET title = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(title)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn publish_lecture(
        &self,
        id: Uuid,
        video_url: &str,
        subtitles_url: &str,
        thumbnail_url: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE lectures
            SET video_url = $2, subtitles_url = $3, thumbnail_url = $4,
                status = 'complete', updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(video_url)
        .bind(subtitles_url)
        .bind(thumbnail_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_scene(
        &self,
        lecture_id: Uuid,
        user_id: &str,
        index: i32,
        description: &str,
        voiceover: &str,
    ) -> Result<Scene> {
        let scene = sqlx::query_as::<_, Scene>(
            r#"
            INSERT INTO scenes (lecture_id, user_id, "index", version, status, description, voiceover)
            VALUES ($1, $2, $3, 1, 'processing', $4, $5)
            RETURNING *
            "#,
        )
        .bind(lecture_id)
        .bind(user_id)
        .bind(index)
        .bind(description)
        .bind(voiceover)
        .fetch_one(&self.pool)
        .await?;
        Ok(scene)
    }

    async fn get_scene(&self, lecture_id: Uuid, index: i32) -> Result<Option<Scene>> {
        let scene = sqlx::query_as::<_, Scene>(
            r#"SELECT * FROM scenes WHERE lecture_id = $1 AND "index" = $2"#,
        )
        .bind(lecture_id)
        .bind(index)
        .fetch_optional(&self.pool)
        .await?;
        Ok(scene)
    }

    async fn list_scenes(&self, lecture_id: Uuid) -> Result<Vec<Scene>> {
        let scenes = sqlx::query_as::<_, Scene>(
            r#"SELECT * FROM scenes WHERE lecture_id = $1 ORDER BY "index""#,
        )
        .bind(lecture_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(scenes)
    }

    async fn bump_scene_version(
        &self,
        scene_id: Uuid,
        user_prompt: Option<&str>,
    ) -> Result<Scene> {
        let scene = sqlx::query_as::<_, Scene>(
            r#"
            UPDATE scenes
            SET version = version + 1,
                status = 'processing',
                user_prompt = COALESCE($2, user_prompt),
                code = NULL,
                audio_url = NULL,
                video_url = NULL,
                last_error = NULL,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(scene_id)
        .bind(user_prompt)
        .fetch_one(&self.pool)
        .await?;
        Ok(scene)
    }

    async fn record_scene_code(&self, scene_id: Uuid, code: &str) -> Result<()> {
        sqlx::query("UPDATE scenes SET code = $2, updated_at = now() WHERE id = $1")
            .bind(scene_id)
            .bind(code)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_scene_artifact(
        &self,
        scene_id: Uuid,
        version: i32,
        artifact: &SceneArtifact,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scenes
            SET audio_url = $3, video_url = $4, status = 'completed',
                last_error = NULL, updated_at = now()
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(scene_id)
        .bind(version)
        .bind(&artifact.audio_url)
        .bind(&artifact.video_url)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_scene_failure(
        &self,
        scene_id: Uuid,
        stage: SceneStage,
        message: &str,
    ) -> Result<()> {
        let context = format!("{}: {}", stage, message);
        sqlx::query(
            r#"
            UPDATE scenes
            SET status = 'failed', last_error = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(scene_id)
        .bind(context)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
