// src/handlers/lectures.rs
//! Lecture generation endpoints - create, inspect, regenerate

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::NewLecture;
use crate::pipeline::spawn_lecture_generation;
use crate::AppState;

#[derive(Deserialize)]
pub struct CreateLectureRequest {
    pub user_id: String,
    pub topic: String,
    pub resources: Option<String>,
    pub language: Option<String>,
    pub voice_id: Option<String>,
}

#[derive(Serialize)]
pub struct CreateLectureResponse {
    pub lecture_id: Uuid,
}

#[derive(Deserialize)]
pub struct RegenerateSceneRequest {
    pub prompt: Option<String>,
}

#[derive(Serialize)]
pub struct AcceptedResponse {
    pub lecture_id: Uuid,
    pub message: String,
}

/// POST /api/lectures - create a draft lecture and start the pipeline
pub async fn create_lecture(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<CreateLectureRequest>,
) -> impl IntoResponse {
    if request.topic.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "topic must not be empty").into_response();
    }

    let new = NewLecture {
        user_id: request.user_id,
        topic: request.topic,
        resources: request.resources,
        voice_id: request.voice_id,
        language: request.language,
    };

    match state.store.create_lecture(new).await {
        Ok(lecture) => {
            spawn_lecture_generation(state.orchestrator.clone(), lecture.id);
            (
                StatusCode::ACCEPTED,
                Json(CreateLectureResponse {
                    lecture_id: lecture.id,
                }),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Failed to create lecture: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to create lecture").into_response()
        }
    }
}

/// GET /api/lectures/:id - fetch the lecture record
pub async fn get_lecture(
    Path(lecture_id): Path<Uuid>,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    match state.store.get_lecture(lecture_id).await {
        Ok(Some(lecture)) => (StatusCode::OK, Json(lecture)).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "Lecture not found").into_response(),
        Err(e) => {
            tracing::error!("Failed to fetch lecture {}: {}", lecture_id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to fetch lecture").into_response()
        }
    }
}

/// GET /api/lectures/:id/scenes - scenes in playback order
pub async fn list_scenes(
    Path(lecture_id): Path<Uuid>,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    match state.store.list_scenes(lecture_id).await {
        Ok(scenes) => (StatusCode::OK, Json(scenes)).into_response(),
        Err(e) => {
            tracing::error!("Failed to list scenes for {}: {}", lecture_id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to list scenes").into_response()
        }
    }
}

/// POST /api/lectures/:id/scenes/:index/regenerate - scoped regeneration
pub async fn regenerate_scene(
    Path((lecture_id, index)): Path<(Uuid, i32)>,
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<RegenerateSceneRequest>,
) -> impl IntoResponse {
    match state.store.get_scene(lecture_id, index).await {
        Ok(Some(_)) => {}
        Ok(None) => return (StatusCode::NOT_FOUND, "Scene not found").into_response(),
        Err(e) => {
            tracing::error!(
                "Failed to fetch scene {} of lecture {}: {}",
                index,
                lecture_id,
                e
            );
            return (StatusCode::INTERNAL_SERVER_ERROR, "failed to fetch scene").into_response();
        }
    }

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator
            .regenerate_scene(lecture_id, index, request.prompt)
            .await
        {
            tracing::error!(
                "Scene regeneration failed: lecture {} scene {} - {}",
                lecture_id,
                index,
                e
            );
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            lecture_id,
            message: format!("regenerating scene {}", index),
        }),
    )
        .into_response()
}

pub fn routes() -> Router {
    Router::new()
        .route("/api/lectures", post(create_lecture))
        .route("/api/lectures/:id", get(get_lecture))
        .route("/api/lectures/:id/scenes", get(list_scenes))
        .route(
            "/api/lectures/:id/scenes/:index/regenerate",
            post(regenerate_scene),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{LectureModel, LecturePlanner, SceneCodeAgent};
    use crate::assembly::{Assembler, LectureArtifact};
    use crate::config::PipelineConfig;
    use crate::models::{Lecture, NewLecture, Scene, SceneArtifact};
    use crate::pipeline::Orchestrator;
    use crate::renderer::{RenderRequest, SceneRenderer};
    use crate::sandbox::{CodeSandbox, SandboxError};
    use crate::store::testing::MemoryStore;
    use crate::store::PipelineStore;
    use async_trait::async_trait;
    use std::path::{Path as FsPath, PathBuf};
    use std::time::Duration;

    struct StubModel;

    #[async_trait]
    impl LectureModel for StubModel {
        async fn complete_json(
            &self,
            _system: &str,
            _prompt: &str,
        ) -> std::result::Result<String, String> {
            Ok(r#"{"title":"T","scenes":[{"description":"d","voiceover":"v"}]}"#.to_string())
        }
        async fn complete(
            &self,
            _system: &str,
            _prompt: &str,
        ) -> std::result::Result<String, String> {
            Ok("from manim import *".to_string())
        }
    }

    struct StubSandbox;

    #[async_trait]
    impl CodeSandbox for StubSandbox {
        async fn validate(&self, _code: &str) -> std::result::Result<(), SandboxError> {
            Ok(())
        }
        async fn render(
            &self,
            _code: &str,
            _workdir: &FsPath,
        ) -> std::result::Result<PathBuf, SandboxError> {
            Ok(PathBuf::from("/tmp/out.mp4"))
        }
    }

    struct StubRenderer;

    #[async_trait]
    impl SceneRenderer for StubRenderer {
        async fn render(
            &self,
            request: &RenderRequest,
        ) -> std::result::Result<SceneArtifact, String> {
            Ok(SceneArtifact {
                video_url: format!("mem://scene_{}_v{}.mp4", request.index, request.version),
                audio_url: format!("mem://scene_{}_v{}.mp3", request.index, request.version),
                duration_secs: 1.0,
            })
        }
    }

    struct StubAssembler;

    #[async_trait]
    impl Assembler for StubAssembler {
        async fn assemble(
            &self,
            lecture: &Lecture,
            _scenes: &[Scene],
        ) -> crate::error::Result<LectureArtifact> {
            Ok(LectureArtifact {
                video_url: format!("mem://{}/final.mp4", lecture.id),
                subtitles_url: format!("mem://{}/subtitles.vtt", lecture.id),
                thumbnail_url: format!("mem://{}/thumbnail.png", lecture.id),
            })
        }
    }

    fn app_state() -> (Arc<AppState>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let model: Arc<dyn LectureModel> = Arc::new(StubModel);
        let sandbox: Arc<dyn CodeSandbox> = Arc::new(StubSandbox);
        let config = PipelineConfig {
            max_agent_attempts: 1,
            max_scene_attempts: 1,
            scene_workers: 1,
            generation_timeout: Duration::from_secs(5),
            render_timeout: Duration::from_secs(5),
        };
        let planner = Arc::new(LecturePlanner::new(model.clone(), config.generation_timeout));
        let agent = Arc::new(SceneCodeAgent::new(
            model,
            sandbox,
            config.max_agent_attempts,
            config.generation_timeout,
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            planner,
            agent,
            Arc::new(StubRenderer),
            Arc::new(StubAssembler),
            config,
        ));
        (
            Arc::new(AppState {
                store: store.clone(),
                orchestrator,
            }),
            store,
        )
    }

    #[tokio::test]
    async fn regenerating_an_unknown_scene_returns_not_found() {
        let (state, _) = app_state();
        let response = regenerate_scene(
            Path((Uuid::new_v4(), 0)),
            Extension(state),
            Json(RegenerateSceneRequest { prompt: None }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn regenerating_an_existing_scene_is_accepted() {
        let (state, store) = app_state();
        let lecture = store
            .create_lecture(NewLecture {
                user_id: "u1".to_string(),
                topic: "circles".to_string(),
                resources: None,
                voice_id: None,
                language: None,
            })
            .await
            .unwrap();
        store
            .create_scene(lecture.id, "u1", 0, "d", "v")
            .await
            .unwrap();

        let response = regenerate_scene(
            Path((lecture.id, 0)),
            Extension(state),
            Json(RegenerateSceneRequest { prompt: None }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn blank_topic_is_rejected() {
        let (state, _) = app_state();
        let response = create_lecture(
            Extension(state),
            Json(CreateLectureRequest {
                user_id: "u1".to_string(),
                topic: "   ".to_string(),
                resources: None,
                language: None,
                voice_id: None,
            }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
