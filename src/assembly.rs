// src/assembly.rs - Ordered concatenation and final publish
//! Runs only after every scene holds a current-version artifact. A gap in
//! the index sequence at this point is a consistency bug, not a per-scene
//! failure, and fails the lecture outright.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::media;
use crate::models::{Lecture, Scene};
use crate::storage::{lecture_artifact_path, ArtifactStore, StorageBucket};
use crate::subtitles::{build_vtt, SubtitleCue};

/// Locators of the final published lecture artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LectureArtifact {
    pub video_url: String,
    pub subtitles_url: String,
    pub thumbnail_url: String,
}

/// Seam for the assembly stage.
#[async_trait]
pub trait Assembler: Send + Sync {
    async fn assemble(&self, lecture: &Lecture, scenes: &[Scene]) -> Result<LectureArtifact>;
}

/// Checks that scenes arrive dense, ordered 0..N-1, each with a
/// current-version video. Pure so it is testable on its own.
pub fn verify_scene_sequence(scenes: &[Scene]) -> std::result::Result<(), String> {
    if scenes.is_empty() {
        return Err("no scenes to assemble".to_string());
    }
    for (i, scene) in scenes.iter().enumerate() {
        if scene.index != i as i32 {
            return Err(format!(
                "scene index sequence is not dense: expected {} found {}",
                i, scene.index
            ));
        }
        if !scene.has_current_artifact() {
            return Err(format!("scene {} has no current video artifact", scene.index));
        }
    }
    Ok(())
}

/// Downloads scene videos, concatenates them in index order, derives VTT
/// subtitles from per-scene durations, grabs a thumbnail from the first
/// scene and uploads everything under deterministic per-lecture keys.
/// Re-running on the same inputs overwrites the same keys.
pub struct LectureAssembler {
    store: Arc<dyn ArtifactStore>,
}

impl LectureAssembler {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    async fn assemble_inner(
        &self,
        lecture: &Lecture,
        scenes: &[Scene],
        workdir: &PathBuf,
    ) -> Result<LectureArtifact> {
        // Download in index order.
        let mut local_videos: Vec<PathBuf> = Vec::with_capacity(scenes.len());
        for scene in scenes {
            let url = scene
                .video_url
                .as_ref()
                .ok_or_else(|| PipelineError::Assembly(format!("scene {} lost its video", scene.index)))?;
            let bytes = self
                .store
                .download(url)
                .await
                .map_err(PipelineError::Storage)?;
            let path = workdir.join(format!("scene_{}.mp4", scene.index));
            tokio::fs::write(&path, bytes).await?;
            local_videos.push(path);
        }

        // Subtitle timing comes from the rendered files themselves, so a
        // re-run over identical inputs produces identical cues.
        let mut cues = Vec::with_capacity(scenes.len());
        for (scene, path) in scenes.iter().zip(&local_videos) {
            let duration = media::probe_duration(path)
                .await
                .map_err(PipelineError::Ffmpeg)?;
            cues.push(SubtitleCue {
                text: scene.voiceover.clone(),
                duration_secs: duration,
            });
        }
        let vtt = build_vtt(&cues);

        let merged = workdir.join("lecture_final.mp4");
        media::concat_videos(&local_videos, &merged)
            .await
            .map_err(PipelineError::Ffmpeg)?;

        let thumbnail = workdir.join("thumbnail.png");
        media::extract_first_frame(&local_videos[0], &thumbnail)
            .await
            .map_err(PipelineError::Ffmpeg)?;

        let video_bytes = tokio::fs::read(&merged).await?;
        let thumb_bytes = tokio::fs::read(&thumbnail).await?;

        let video_url = self
            .store
            .upload(
                StorageBucket::Lectures,
                &lecture_artifact_path(lecture.id, "final.mp4"),
                video_bytes,
                "video/mp4",
            )
            .await
            .map_err(PipelineError::Storage)?;
        let subtitles_url = self
            .store
            .upload(
                StorageBucket::Lectures,
                &lecture_artifact_path(lecture.id, "subtitles.vtt"),
                vtt.into_bytes(),
                "text/vtt",
            )
            .await
            .map_err(PipelineError::Storage)?;
        let thumbnail_url = self
            .store
            .upload(
                StorageBucket::Lectures,
                &lecture_artifact_path(lecture.id, "thumbnail.png"),
                thumb_bytes,
                "image/png",
            )
            .await
            .map_err(PipelineError::Storage)?;

        Ok(LectureArtifact {
            video_url,
            subtitles_url,
            thumbnail_url,
        })
    }
}

#[async_trait]
impl Assembler for LectureAssembler {
    async fn assemble(&self, lecture: &Lecture, scenes: &[Scene]) -> Result<LectureArtifact> {
        verify_scene_sequence(scenes).map_err(PipelineError::Assembly)?;

        tracing::info!("Assembling {} scenes for lecture {}", scenes.len(), lecture.id);

        let workdir = std::env::temp_dir().join(format!("lumeo-assemble-{}", lecture.id));
        tokio::fs::create_dir_all(&workdir).await?;

        let result = self.assemble_inner(lecture, scenes, &workdir).await;

        let _ = tokio::fs::remove_dir_all(&workdir).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SceneStatus;
    use chrono::Utc;
    use uuid::Uuid;

    fn scene(index: i32, video: Option<&str>) -> Scene {
        Scene {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            lecture_id: Uuid::new_v4(),
            index,
            version: 1,
            status: if video.is_some() {
                SceneStatus::Completed
            } else {
                SceneStatus::Processing
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
            description: "d".to_string(),
            voiceover: "v".to_string(),
            user_prompt: None,
            code: Some("code".to_string()),
            audio_url: None,
            video_url: video.map(|s| s.to_string()),
            last_error: None,
        }
    }

    #[test]
    fn dense_complete_sequence_passes() {
        let scenes = vec![scene(0, Some("a")), scene(1, Some("b")), scene(2, Some("c"))];
        assert!(verify_scene_sequence(&scenes).is_ok());
    }

    #[test]
    fn gapped_indices_are_rejected() {
        let scenes = vec![scene(0, Some("a")), scene(2, Some("c"))];
        let err = verify_scene_sequence(&scenes).unwrap_err();
        assert!(err.contains("not dense"));
    }

    #[test]
    fn missing_artifact_is_rejected() {
        let scenes = vec![scene(0, Some("a")), scene(1, None)];
        let err = verify_scene_sequence(&scenes).unwrap_err();
        assert!(err.contains("no current video artifact"));
    }

    #[test]
    fn empty_sequence_is_rejected() {
        assert!(verify_scene_sequence(&[]).is_err());
    }
}
