// src/pipeline/orchestrator.rs - Per-lecture state machine and scene fan-out
//! Drives a lecture through draft -> planning -> generating -> assembling ->
//! complete, with failed absorbing from any non-terminal state. The
//! orchestrator exclusively owns status and version transitions; agents,
//! renderer and assembly hand back immutable values.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::agent::{AgentOutcome, LecturePlanner, SceneCodeAgent, SceneDraft};
use crate::assembly::Assembler;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result, SceneStage};
use crate::models::{Lecture, LectureStatus, Scene};
use crate::renderer::{RenderRequest, SceneRenderer};
use crate::store::PipelineStore;

/// Result of one scene's whole pipeline (agent loop + render), reported back
/// to the supervising task. Persistence already happened inside
/// `process_scene`; the supervisor only aggregates.
struct SceneOutcome {
    index: i32,
    result: std::result::Result<(), PipelineError>,
    discarded: bool,
}

#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn PipelineStore>,
    planner: Arc<LecturePlanner>,
    agent: Arc<SceneCodeAgent>,
    renderer: Arc<dyn SceneRenderer>,
    assembler: Arc<dyn Assembler>,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn PipelineStore>,
        planner: Arc<LecturePlanner>,
        agent: Arc<SceneCodeAgent>,
        renderer: Arc<dyn SceneRenderer>,
        assembler: Arc<dyn Assembler>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            planner,
            agent,
            renderer,
            assembler,
            config,
        }
    }

    /// Run the full pipeline for a lecture. Terminal state on return is
    /// either `complete` or `failed`; the error carries the first fatal
    /// failure for the caller's log.
    pub async fn run(&self, lecture_id: Uuid) -> Result<()> {
        let lecture = self.require_lecture(lecture_id).await?;
        tracing::info!("Starting lecture pipeline: {} ({})", lecture.id, lecture.topic);

        // planning
        self.store
            .set_lecture_status(lecture.id, LectureStatus::Planning)
            .await?;

        let plan = match self
            .planner
            .plan(
                &lecture.topic,
                lecture.resources.as_deref(),
                lecture.language.as_deref(),
            )
            .await
        {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!("Planning failed for lecture {}: {}", lecture.id, e);
                self.fail_lecture(lecture.id).await;
                return Err(e);
            }
        };

        self.store.set_lecture_title(lecture.id, &plan.title).await?;

        let mut scenes = Vec::with_capacity(plan.scenes.len());
        for spec in &plan.scenes {
            let scene = self
                .store
                .create_scene(
                    lecture.id,
                    &lecture.user_id,
                    spec.index,
                    &spec.description,
                    &spec.voiceover,
                )
                .await?;
            scenes.push(scene);
        }

        // generating
        self.store
            .set_lecture_status(lecture.id, LectureStatus::Generating)
            .await?;

        let first_failure = self.generate_scenes(&lecture, scenes).await;

        if let Some(e) = first_failure {
            // Partial success still fails the lecture: no partial publish.
            self.fail_lecture(lecture.id).await;
            return Err(e);
        }

        self.assemble_and_publish(&lecture).await
    }

    /// User-triggered regeneration of a single scene, optionally with a
    /// revision prompt. Bumps the version (invalidating the prior artifact),
    /// returns the lecture to `generating`, and re-assembles on success.
    pub async fn regenerate_scene(
        &self,
        lecture_id: Uuid,
        index: i32,
        user_prompt: Option<String>,
    ) -> Result<()> {
        let lecture = self.require_lecture(lecture_id).await?;
        let scene = self
            .store
            .get_scene(lecture_id, index)
            .await?
            .ok_or(PipelineError::Database(sqlx::Error::RowNotFound))?;

        tracing::info!(
            "Regenerating scene {} of lecture {} (version {} -> {})",
            index,
            lecture_id,
            scene.version,
            scene.version + 1
        );

        let scene = self
            .store
            .bump_scene_version(scene.id, user_prompt.as_deref())
            .await?;
        self.store
            .set_lecture_status(lecture.id, LectureStatus::Generating)
            .await?;

        let outcome = self.process_scene(lecture.clone(), scene).await;
        if let Err(e) = outcome.result {
            self.fail_lecture(lecture.id).await;
            return Err(e);
        }

        self.assemble_and_publish(&lecture).await
    }

    /// Fan scenes out over the bounded worker pool and wait for all of them
    /// to settle. Returns the first fatal failure, if any. One scene's
    /// failure never aborts its siblings; their artifacts stay recorded.
    async fn generate_scenes(
        &self,
        lecture: &Lecture,
        scenes: Vec<Scene>,
    ) -> Option<PipelineError> {
        let semaphore = Arc::new(Semaphore::new(self.config.scene_workers));
        let mut workers: JoinSet<SceneOutcome> = JoinSet::new();

        // Dispatch follows index order; completion order does not matter,
        // assembly re-sorts by index.
        for scene in scenes {
            let this = self.clone();
            let lecture = lecture.clone();
            let semaphore = semaphore.clone();
            workers.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                this.process_scene(lecture, scene).await
            });
        }

        let mut first_failure: Option<PipelineError> = None;
        let mut completed = 0usize;

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => {
                    if outcome.discarded {
                        tracing::warn!(
                            "Discarding late result for scene {} (lecture already failed)",
                            outcome.index
                        );
                        continue;
                    }
                    match outcome.result {
                        Ok(()) => {
                            completed += 1;
                            tracing::info!(
                                "Scene {} done ({} completed so far)",
                                outcome.index,
                                completed
                            );
                        }
                        Err(e) => {
                            tracing::error!("Scene {} failed: {}", outcome.index, e);
                            if first_failure.is_none() {
                                first_failure = Some(e);
                            }
                        }
                    }
                }
                Err(join_err) => {
                    tracing::error!("Scene worker panicked: {}", join_err);
                    if first_failure.is_none() {
                        first_failure = Some(PipelineError::SceneGeneration {
                            index: -1,
                            detail: format!("worker panicked: {}", join_err),
                        });
                    }
                }
            }
        }

        first_failure
    }

    /// One scene through agent -> render, with the per-scene retry budget.
    /// Every retry bumps the version and invalidates the prior artifact
    /// before re-entering Drafting.
    async fn process_scene(&self, lecture: Lecture, scene: Scene) -> SceneOutcome {
        let index = scene.index;
        let mut current = scene;
        let mut last_error: Option<PipelineError> = None;

        for attempt in 1..=self.config.max_scene_attempts {
            if attempt > 1 {
                current = match self.store.bump_scene_version(current.id, None).await {
                    Ok(scene) => scene,
                    Err(e) => return SceneOutcome { index, result: Err(e), discarded: false },
                };
            }

            tracing::info!(
                "Scene {} attempt {}/{} (version {})",
                index,
                attempt,
                self.config.max_scene_attempts,
                current.version
            );

            match self.attempt_scene(&lecture, &current).await {
                Ok(discarded) => return SceneOutcome { index, result: Ok(()), discarded },
                Err(e) if e.is_scene_scoped() => {
                    let stage = e.scene_stage().unwrap_or(SceneStage::Generation);
                    if let Err(db_err) = self
                        .store
                        .record_scene_failure(current.id, stage, &e.to_string())
                        .await
                    {
                        return SceneOutcome { index, result: Err(db_err), discarded: false };
                    }
                    last_error = Some(e);
                }
                // Store/storage errors are not retryable per scene.
                Err(e) => return SceneOutcome { index, result: Err(e), discarded: false },
            }
        }

        SceneOutcome {
            index,
            result: Err(last_error.unwrap_or(PipelineError::SceneGeneration {
                index,
                detail: "retry budget exhausted".to_string(),
            })),
            discarded: false,
        }
    }

    /// One whole attempt: agent loop, then render, then persist. Returns
    /// Ok(true) when the result was discarded because the lecture had
    /// already failed while this scene was in flight.
    async fn attempt_scene(&self, lecture: &Lecture, scene: &Scene) -> Result<bool> {
        let draft = SceneDraft {
            description: scene.description.clone(),
            voiceover: scene.voiceover.clone(),
            user_prompt: scene.user_prompt.clone(),
        };

        let code = match self.agent.generate(&draft).await {
            AgentOutcome::Accepted { code, attempts } => {
                tracing::info!("Scene {} code accepted after {} attempts", scene.index, attempts);
                code
            }
            AgentOutcome::Exhausted { detail, attempts } => {
                return Err(PipelineError::SceneGeneration {
                    index: scene.index,
                    detail: format!("agent exhausted after {} attempts: {}", attempts, detail),
                });
            }
        };

        self.store.record_scene_code(scene.id, &code).await?;

        let request = RenderRequest {
            lecture_id: lecture.id,
            index: scene.index,
            version: scene.version,
            code,
            voiceover: scene.voiceover.clone(),
            voice_id: lecture.voice_id.clone(),
            language: lecture.language.clone(),
        };

        let artifact = self
            .renderer
            .render(&request)
            .await
            .map_err(|detail| PipelineError::Render {
                index: scene.index,
                detail,
            })?;

        // In-flight work finishes, but its result is not persisted once the
        // lecture has already been marked failed.
        if let Some(current) = self.store.get_lecture(lecture.id).await? {
            if current.status == LectureStatus::Failed {
                return Ok(true);
            }
        }

        // The store refuses the write if a regeneration bumped the version
        // while this render was in flight; the stale result is discarded.
        let recorded = self
            .store
            .record_scene_artifact(scene.id, scene.version, &artifact)
            .await?;
        Ok(!recorded)
    }

    /// Aggregate gate: only reached when every scene holds a current-version
    /// artifact. Assembly failure past this point is lecture-fatal.
    async fn assemble_and_publish(&self, lecture: &Lecture) -> Result<()> {
        self.store
            .set_lecture_status(lecture.id, LectureStatus::Assembling)
            .await?;

        let scenes = self.store.list_scenes(lecture.id).await?;

        let artifact = match self.assembler.assemble(lecture, &scenes).await {
            Ok(artifact) => artifact,
            Err(e) => {
                tracing::error!("Assembly failed for lecture {}: {}", lecture.id, e);
                self.fail_lecture(lecture.id).await;
                return Err(e);
            }
        };

        self.store
            .publish_lecture(
                lecture.id,
                &artifact.video_url,
                &artifact.subtitles_url,
                &artifact.thumbnail_url,
            )
            .await?;

        tracing::info!("Lecture {} complete", lecture.id);
        Ok(())
    }

    async fn require_lecture(&self, lecture_id: Uuid) -> Result<Lecture> {
        self.store
            .get_lecture(lecture_id)
            .await?
            .ok_or(PipelineError::Database(sqlx::Error::RowNotFound))
    }

    async fn fail_lecture(&self, lecture_id: Uuid) {
        if let Err(e) = self
            .store
            .set_lecture_status(lecture_id, LectureStatus::Failed)
            .await
        {
            tracing::error!("Failed to mark lecture {} failed: {}", lecture_id, e);
        }
    }
}

/// Run a lecture pipeline in the background and log its terminal state.
pub fn spawn_lecture_generation(orchestrator: Arc<Orchestrator>, lecture_id: Uuid) {
    tokio::spawn(async move {
        match orchestrator.run(lecture_id).await {
            Ok(()) => tracing::info!("Lecture generation finished: {}", lecture_id),
            Err(e) => tracing::error!("Lecture generation failed: {} - {}", lecture_id, e),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::LectureModel;
    use crate::assembly::{verify_scene_sequence, LectureArtifact};
    use crate::models::{NewLecture, SceneArtifact, SceneStatus};
    use crate::sandbox::{CodeSandbox, SandboxError, SandboxErrorKind};
    use crate::store::testing::MemoryStore;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    // ------------------------------------------------------------------
    // Seam fakes. Scene descriptions containing FAIL produce code the
    // sandbox always rejects; descriptions containing NORENDER produce
    // artifacts the renderer always refuses.
    // ------------------------------------------------------------------

    struct ScriptedModel {
        plan_json: String,
    }

    #[async_trait]
    impl LectureModel for ScriptedModel {
        async fn complete_json(&self, _system: &str, _prompt: &str) -> std::result::Result<String, String> {
            Ok(self.plan_json.clone())
        }

        async fn complete(&self, _system: &str, prompt: &str) -> std::result::Result<String, String> {
            if prompt.contains("FAIL") {
                Ok("# FAIL marker\nfrom manim import *".to_string())
            } else if prompt.contains("NORENDER") {
                Ok("# NORENDER marker\nfrom manim import *".to_string())
            } else {
                Ok("from manim import *".to_string())
            }
        }
    }

    struct MarkerSandbox;

    #[async_trait]
    impl CodeSandbox for MarkerSandbox {
        async fn validate(&self, code: &str) -> std::result::Result<(), SandboxError> {
            if code.contains("FAIL") {
                Err(SandboxError {
                    kind: SandboxErrorKind::Runtime,
                    message: "marker scene never validates".to_string(),
                })
            } else {
                Ok(())
            }
        }

        async fn render(&self, _code: &str, _workdir: &Path) -> std::result::Result<PathBuf, SandboxError> {
            Ok(PathBuf::from("/tmp/out.mp4"))
        }
    }

    struct FakeRenderer;

    #[async_trait]
    impl SceneRenderer for FakeRenderer {
        async fn render(&self, request: &RenderRequest) -> std::result::Result<SceneArtifact, String> {
            if request.code.contains("NORENDER") {
                Err("renderer refused marker scene".to_string())
            } else {
                Ok(SceneArtifact {
                    video_url: format!(
                        "mem://scenes/{}/scene_{}_v{}.mp4",
                        request.lecture_id, request.index, request.version
                    ),
                    audio_url: format!(
                        "mem://scenes/{}/scene_{}_v{}.mp3",
                        request.lecture_id, request.index, request.version
                    ),
                    duration_secs: 5.0,
                })
            }
        }
    }

    /// Renderer whose lecture gets marked failed elsewhere while the render
    /// is still in flight.
    struct FailsLectureMidRender {
        store: Arc<MemoryStore>,
    }

    #[async_trait]
    impl SceneRenderer for FailsLectureMidRender {
        async fn render(&self, request: &RenderRequest) -> std::result::Result<SceneArtifact, String> {
            self.store
                .set_lecture_status(request.lecture_id, LectureStatus::Failed)
                .await
                .unwrap();
            Ok(SceneArtifact {
                video_url: format!(
                    "mem://scenes/{}/scene_{}_v{}.mp4",
                    request.lecture_id, request.index, request.version
                ),
                audio_url: format!(
                    "mem://scenes/{}/scene_{}_v{}.mp3",
                    request.lecture_id, request.index, request.version
                ),
                duration_secs: 5.0,
            })
        }
    }

    struct FakeAssembler;

    #[async_trait]
    impl Assembler for FakeAssembler {
        async fn assemble(&self, lecture: &Lecture, scenes: &[Scene]) -> Result<LectureArtifact> {
            verify_scene_sequence(scenes).map_err(PipelineError::Assembly)?;
            Ok(LectureArtifact {
                video_url: format!("mem://lectures/{}/final.mp4", lecture.id),
                subtitles_url: format!("mem://lectures/{}/subtitles.vtt", lecture.id),
                thumbnail_url: format!("mem://lectures/{}/thumbnail.png", lecture.id),
            })
        }
    }

    fn plan_json(descriptions: &[&str]) -> String {
        let scenes: Vec<String> = descriptions
            .iter()
            .map(|d| format!(r#"{{"description":"{}","voiceover":"narration for {}"}}"#, d, d))
            .collect();
        format!(r#"{{"title":"Test Lecture","scenes":[{}]}}"#, scenes.join(","))
    }

    fn harness(plan: String) -> (Orchestrator, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let model: Arc<dyn LectureModel> = Arc::new(ScriptedModel { plan_json: plan });
        let sandbox: Arc<dyn CodeSandbox> = Arc::new(MarkerSandbox);
        let config = PipelineConfig {
            max_agent_attempts: 2,
            max_scene_attempts: 2,
            scene_workers: 2,
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
        let orchestrator = Orchestrator::new(
            store.clone(),
            planner,
            agent,
            Arc::new(FakeRenderer),
            Arc::new(FakeAssembler),
            config,
        );
        (orchestrator, store)
    }

    async fn new_lecture(store: &MemoryStore, topic: &str) -> Lecture {
        store
            .create_lecture(NewLecture {
                user_id: "u1".to_string(),
                topic: topic.to_string(),
                resources: None,
                voice_id: None,
                language: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn single_scene_lecture_reaches_complete() {
        let (orchestrator, store) = harness(plan_json(&["a circle grows"]));
        let lecture = new_lecture(&store, "circles").await;

        orchestrator.run(lecture.id).await.unwrap();

        let lecture = store.get_lecture(lecture.id).await.unwrap().unwrap();
        assert_eq!(lecture.status, LectureStatus::Complete);
        assert_eq!(lecture.title.as_deref(), Some("Test Lecture"));
        assert!(lecture.video_url.is_some());
        assert!(lecture.subtitles_url.is_some());
        assert!(lecture.thumbnail_url.is_some());

        let scenes = store.list_scenes(lecture.id).await.unwrap();
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].version, 1);
        assert!(scenes[0].has_current_artifact());
        assert!(scenes[0].code.is_some());
    }

    #[tokio::test]
    async fn scene_indices_are_dense_after_planning() {
        let (orchestrator, store) = harness(plan_json(&["intro", "middle", "outro"]));
        let lecture = new_lecture(&store, "topic").await;

        orchestrator.run(lecture.id).await.unwrap();

        let scenes = store.list_scenes(lecture.id).await.unwrap();
        let indices: Vec<i32> = scenes.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn exhausted_scene_fails_lecture_but_siblings_keep_artifacts() {
        let (orchestrator, store) = harness(plan_json(&["intro", "FAIL forever", "outro"]));
        let lecture = new_lecture(&store, "topic").await;

        let err = orchestrator.run(lecture.id).await.unwrap_err();
        assert!(matches!(err, PipelineError::SceneGeneration { index: 1, .. }));

        let lecture = store.get_lecture(lecture.id).await.unwrap().unwrap();
        assert_eq!(lecture.status, LectureStatus::Failed);
        // no partial publish
        assert!(lecture.video_url.is_none());

        let scenes = store.list_scenes(lecture.id).await.unwrap();
        assert!(scenes[0].has_current_artifact());
        assert!(scenes[2].has_current_artifact());

        let failed = &scenes[1];
        assert_eq!(failed.status, SceneStatus::Failed);
        // retried once: version bumped for the second whole-pipeline attempt
        assert_eq!(failed.version, 2);
        let last_error = failed.last_error.as_deref().unwrap();
        assert!(last_error.starts_with("generation:"));
    }

    #[tokio::test]
    async fn render_failure_consumes_scene_retry_budget() {
        let (orchestrator, store) = harness(plan_json(&["NORENDER scene"]));
        let lecture = new_lecture(&store, "topic").await;

        let err = orchestrator.run(lecture.id).await.unwrap_err();
        assert!(matches!(err, PipelineError::Render { index: 0, .. }));

        let scenes = store.list_scenes(lecture.id).await.unwrap();
        assert_eq!(scenes[0].version, 2);
        assert!(scenes[0].last_error.as_deref().unwrap().starts_with("render:"));
        let lecture = store.get_lecture(lecture.id).await.unwrap().unwrap();
        assert_eq!(lecture.status, LectureStatus::Failed);
    }

    #[tokio::test]
    async fn blank_topic_fails_at_planning() {
        let (orchestrator, store) = harness(plan_json(&["unused"]));
        let lecture = new_lecture(&store, "   ").await;

        let err = orchestrator.run(lecture.id).await.unwrap_err();
        assert!(matches!(err, PipelineError::Planning(_)));
        let lecture = store.get_lecture(lecture.id).await.unwrap().unwrap();
        assert_eq!(lecture.status, LectureStatus::Failed);
    }

    #[tokio::test]
    async fn regeneration_bumps_version_and_recompletes() {
        let (orchestrator, store) = harness(plan_json(&["a circle grows"]));
        let lecture = new_lecture(&store, "circles").await;
        orchestrator.run(lecture.id).await.unwrap();

        let before = store.get_scene(lecture.id, 0).await.unwrap().unwrap();
        let old_video = before.video_url.clone().unwrap();
        assert!(old_video.contains("_v1"));

        orchestrator
            .regenerate_scene(lecture.id, 0, Some("make the circle red".to_string()))
            .await
            .unwrap();

        let after = store.get_scene(lecture.id, 0).await.unwrap().unwrap();
        assert_eq!(after.version, 2);
        assert_eq!(after.user_prompt.as_deref(), Some("make the circle red"));
        let new_video = after.video_url.unwrap();
        assert!(new_video.contains("_v2"));
        assert_ne!(new_video, old_video);

        let lecture = store.get_lecture(lecture.id).await.unwrap().unwrap();
        assert_eq!(lecture.status, LectureStatus::Complete);
    }

    #[tokio::test]
    async fn results_arriving_after_the_lecture_failed_are_discarded() {
        let store = Arc::new(MemoryStore::default());
        let model: Arc<dyn LectureModel> = Arc::new(ScriptedModel {
            plan_json: plan_json(&["a circle grows"]),
        });
        let sandbox: Arc<dyn CodeSandbox> = Arc::new(MarkerSandbox);
        let config = PipelineConfig {
            max_agent_attempts: 2,
            max_scene_attempts: 2,
            scene_workers: 2,
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
        let orchestrator = Orchestrator::new(
            store.clone(),
            planner,
            agent,
            Arc::new(FailsLectureMidRender {
                store: store.clone(),
            }),
            Arc::new(FakeAssembler),
            config,
        );
        let lecture = new_lecture(&store, "circles").await;

        let err = orchestrator.run(lecture.id).await.unwrap_err();
        // no current artifact survived, so assembly refuses the sequence
        assert!(matches!(err, PipelineError::Assembly(_)));

        let scene = store.get_scene(lecture.id, 0).await.unwrap().unwrap();
        assert!(scene.video_url.is_none());
        assert!(!scene.has_current_artifact());
        let lecture = store.get_lecture(lecture.id).await.unwrap().unwrap();
        assert_eq!(lecture.status, LectureStatus::Failed);
        assert!(lecture.video_url.is_none());
    }

    #[tokio::test]
    async fn regenerating_a_missing_scene_is_an_error() {
        let (orchestrator, store) = harness(plan_json(&["only scene"]));
        let lecture = new_lecture(&store, "topic").await;
        orchestrator.run(lecture.id).await.unwrap();

        let err = orchestrator
            .regenerate_scene(lecture.id, 7, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Database(_)));
    }
}
