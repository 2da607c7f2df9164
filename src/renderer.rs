// src/renderer.rs - Validated code + voiceover -> rendered scene artifact
//! Stateless worker: synthesizes narration, executes the validated code in
//! the sandbox, pads the animation to cover the narration, muxes the two and
//! uploads the result. Never touches the record store - the orchestrator
//! persists the returned locators.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::elevenlabs_client::{ElevenLabsClient, DEFAULT_VOICE_ID};
use crate::media;
use crate::models::SceneArtifact;
use crate::sandbox::CodeSandbox;
use crate::storage::{scene_artifact_path, ArtifactStore, StorageBucket};

/// Seam for narration synthesis.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        language: Option<&str>,
    ) -> Result<Vec<u8>, String>;
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        language: Option<&str>,
    ) -> Result<Vec<u8>, String> {
        self.text_to_speech(text, voice_id, language).await
    }
}

/// Everything the renderer needs for one scene at one version.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub lecture_id: Uuid,
    pub index: i32,
    pub version: i32,
    pub code: String,
    pub voiceover: String,
    pub voice_id: Option<String>,
    pub language: Option<String>,
}

/// Seam for scene rendering, so the orchestrator can be exercised without
/// ffmpeg or network access.
#[async_trait]
pub trait SceneRenderer: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<SceneArtifact, String>;
}

/// Renders scenes locally: sandboxed manim + ffmpeg + blob upload.
pub struct LocalSceneRenderer {
    tts: Arc<dyn SpeechSynthesizer>,
    sandbox: Arc<dyn CodeSandbox>,
    store: Arc<dyn ArtifactStore>,
    render_timeout: Duration,
}

impl LocalSceneRenderer {
    pub fn new(
        tts: Arc<dyn SpeechSynthesizer>,
        sandbox: Arc<dyn CodeSandbox>,
        store: Arc<dyn ArtifactStore>,
        render_timeout: Duration,
    ) -> Self {
        Self {
            tts,
            sandbox,
            store,
            render_timeout,
        }
    }

    async fn render_inner(
        &self,
        request: &RenderRequest,
        workdir: &PathBuf,
    ) -> Result<SceneArtifact, String> {
        let voice = request.voice_id.as_deref().unwrap_or(DEFAULT_VOICE_ID);

        // Narration first: its duration drives the padding policy.
        let audio_bytes = tokio::time::timeout(
            self.render_timeout,
            self.tts
                .synthesize(&request.voiceover, voice, request.language.as_deref()),
        )
        .await
        .map_err(|_| "narration synthesis timed out".to_string())??;

        let audio_path = workdir.join("narration.mp3");
        tokio::fs::write(&audio_path, &audio_bytes)
            .await
            .map_err(|e| format!("failed to write narration: {}", e))?;
        let narration_secs = media::probe_duration(&audio_path).await?;

        // Execute the validated code in isolation.
        let raw_video = tokio::time::timeout(
            self.render_timeout,
            self.sandbox.render(&request.code, workdir),
        )
        .await
        .map_err(|_| "animation render timed out".to_string())?
        .map_err(|e| e.to_string())?;

        // Animation must at least cover the narration.
        let padded = workdir.join("padded.mp4");
        media::pad_video_to_duration(&raw_video, &padded, narration_secs).await?;

        let muxed = workdir.join("scene_final.mp4");
        media::mux_audio(&padded, &audio_path, &muxed).await?;
        let duration_secs = media::probe_duration(&muxed).await?;

        let video_bytes = tokio::fs::read(&muxed)
            .await
            .map_err(|e| format!("failed to read rendered scene: {}", e))?;

        let video_url = self
            .store
            .upload(
                StorageBucket::Scenes,
                &scene_artifact_path(request.lecture_id, request.index, request.version, "mp4"),
                video_bytes,
                "video/mp4",
            )
            .await?;
        let audio_url = self
            .store
            .upload(
                StorageBucket::Scenes,
                &scene_artifact_path(request.lecture_id, request.index, request.version, "mp3"),
                audio_bytes,
                "audio/mpeg",
            )
            .await?;

        Ok(SceneArtifact {
            video_url,
            audio_url,
            duration_secs,
        })
    }
}

#[async_trait]
impl SceneRenderer for LocalSceneRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<SceneArtifact, String> {
        let workdir = std::env::temp_dir().join(format!(
            "lumeo-render-{}-{}-v{}",
            request.lecture_id, request.index, request.version
        ));
        tokio::fs::create_dir_all(&workdir)
            .await
            .map_err(|e| format!("failed to create render dir: {}", e))?;

        let result = self.render_inner(request, &workdir).await;

        let _ = tokio::fs::remove_dir_all(&workdir).await;
        result
    }
}
