// src/agent/mod.rs
//! AI collaborators: lecture planning and the scene code generation loop.
//! Model output is untrusted and non-deterministic; both agents bound their
//! retries explicitly and surface failure as a value, never by looping.

use async_trait::async_trait;

use crate::openai_client::OpenAiClient;

pub mod planner;
pub mod scene_agent;

pub use planner::{LecturePlan, LecturePlanner, SceneSpec};
pub use scene_agent::{AgentOutcome, SceneCodeAgent, SceneDraft};

/// Seam to the language model so agents can be tested with fakes.
#[async_trait]
pub trait LectureModel: Send + Sync {
    /// JSON-mode completion, used for structured lecture plans.
    async fn complete_json(&self, system: &str, prompt: &str) -> Result<String, String>;
    /// Plain completion, used for scene code drafts.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, String>;
}

#[async_trait]
impl LectureModel for OpenAiClient {
    async fn complete_json(&self, system: &str, prompt: &str) -> Result<String, String> {
        self.generate_json(system, prompt).await
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, String> {
        self.generate_text(system, prompt).await
    }
}

lazy_static::lazy_static! {
    /// Markdown code fence around a model response body.
    static ref CODE_FENCE: regex::Regex =
        regex::Regex::new(r"(?s)^\s*```[a-zA-Z0-9_]*\s*\n?(.*?)\n?```\s*$").unwrap();
}

/// Models wrap answers in markdown fences often enough that both agents
/// strip them before parsing.
pub(crate) fn strip_code_fence(text: &str) -> String {
    match CODE_FENCE.captures(text) {
        Some(caps) => caps[1].to_string(),
        None => text.trim().to_string(),
    }
}
