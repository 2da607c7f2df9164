// lib.rs - Main library file that exports all modules
pub mod agent;
pub mod assembly;
pub mod config;
pub mod db;
pub mod elevenlabs_client;
pub mod error;
pub mod handlers;
pub mod media;
pub mod models;
pub mod openai_client;
pub mod pipeline;
pub mod renderer;
pub mod sandbox;
pub mod storage;
pub mod store;
pub mod subtitles;

use std::sync::Arc;

/// Shared service state: the persistence seam and the pipeline orchestrator.
pub struct AppState {
    pub store: Arc<dyn store::PipelineStore>,
    pub orchestrator: Arc<pipeline::Orchestrator>,
}
