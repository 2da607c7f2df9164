// src/agent/scene_agent.rs - Generate -> validate -> repair loop for scene code
//! Bounded state machine: Drafting -> Validating -> {Accepted | Revising ->
//! Drafting | Exhausted}. The model does not converge reliably, so Exhausted
//! is an expected outcome and comes back as a value, not an error.

use std::sync::Arc;
use std::time::Duration;

use super::{strip_code_fence, LectureModel};
use crate::sandbox::CodeSandbox;

/// What the agent drafts against: the scene spec plus an optional
/// user-supplied revision prompt.
#[derive(Debug, Clone)]
pub struct SceneDraft {
    pub description: String,
    pub voiceover: String,
    pub user_prompt: Option<String>,
}

/// Terminal result of the loop.
#[derive(Debug, Clone)]
pub enum AgentOutcome {
    /// Code passed a validation dry-run.
    Accepted { code: String, attempts: u32 },
    /// Attempt budget ran out; carries the last failure detail.
    Exhausted { detail: String, attempts: u32 },
}

const SCENE_SYSTEM: &str = "You are a Manim expert who writes scene code for short educational \
animations. You answer with Python code only, no commentary. We're using Manim 0.18.1 - \
ShowCreation is obsolete, use Create instead. Keep animations simple and focused, ensure all \
objects are properly initialized, use basic shapes and transformations, and never use triple \
quotes inside the generated code.";

pub struct SceneCodeAgent {
    model: Arc<dyn LectureModel>,
    sandbox: Arc<dyn CodeSandbox>,
    max_attempts: u32,
    call_timeout: Duration,
}

impl SceneCodeAgent {
    pub fn new(
        model: Arc<dyn LectureModel>,
        sandbox: Arc<dyn CodeSandbox>,
        max_attempts: u32,
        call_timeout: Duration,
    ) -> Self {
        Self {
            model,
            sandbox,
            max_attempts: max_attempts.max(1),
            call_timeout,
        }
    }

    /// Run the loop to a terminal state. Terminates within `max_attempts`
    /// rounds for any input. A generation failure, validation failure or
    /// timeout all consume one attempt and feed the next revision.
    pub async fn generate(&self, draft: &SceneDraft) -> AgentOutcome {
        let mut prior_code: Option<String> = None;
        let mut prior_error: Option<String> = None;

        for attempt in 1..=self.max_attempts {
            tracing::info!("Drafting scene code, attempt {}/{}", attempt, self.max_attempts);

            // Drafting
            let prompt = build_scene_prompt(draft, prior_code.as_deref(), prior_error.as_deref());
            let code = match tokio::time::timeout(
                self.call_timeout,
                self.model.complete(SCENE_SYSTEM, &prompt),
            )
            .await
            {
                Ok(Ok(raw)) => strip_code_fence(&raw),
                Ok(Err(e)) => {
                    tracing::warn!("Scene code generation failed: {}", e);
                    prior_error = Some(format!("generation failed: {}", e));
                    continue;
                }
                Err(_) => {
                    tracing::warn!("Scene code generation timed out");
                    prior_error = Some("generation timed out".to_string());
                    continue;
                }
            };

            // Validating: dry-run the draft in isolation
            match tokio::time::timeout(self.call_timeout, self.sandbox.validate(&code)).await {
                Ok(Ok(())) => {
                    tracing::info!("Scene code accepted on attempt {}", attempt);
                    return AgentOutcome::Accepted { code, attempts: attempt };
                }
                Ok(Err(e)) => {
                    tracing::warn!("Scene code validation failed: {}", e);
                    prior_error = Some(e.to_string());
                    prior_code = Some(code);
                }
                Err(_) => {
                    tracing::warn!("Scene code validation timed out");
                    prior_error = Some("validation timed out".to_string());
                    prior_code = Some(code);
                }
            }
            // Revising: loop back to Drafting with the captured error
        }

        AgentOutcome::Exhausted {
            detail: prior_error.unwrap_or_else(|| "no attempt produced code".to_string()),
            attempts: self.max_attempts,
        }
    }
}

fn build_scene_prompt(
    draft: &SceneDraft,
    prior_code: Option<&str>,
    prior_error: Option<&str>,
) -> String {
    let mut prompt = format!(
        "Create a Manim scene that effectively visualizes this concept. The scene should be \
engaging, clear, and match the voiceover timing.\n\n\
Scene description: {}\nVoiceover text: {}\n",
        draft.description, draft.voiceover
    );

    if let Some(user_prompt) = &draft.user_prompt {
        prompt.push_str(&format!("\nThe user asked for this revision: {}\n", user_prompt));
    }

    if let (Some(code), Some(error)) = (prior_code, prior_error) {
        prompt.push_str(&format!(
            "\nYour previous attempt failed. Fix the problem and return the full corrected code.\n\
Previous code:\n{}\n\nError:\n{}\n",
            code, error
        ));
    } else if let Some(error) = prior_error {
        prompt.push_str(&format!("\nYour previous attempt failed: {}\n", error));
    }

    prompt
}
