// src/agent/planner.rs - Topic -> ordered scene specifications
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::{strip_code_fence, LectureModel};
use crate::error::{PipelineError, Result};

/// Planner output for one scene, prior to code generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSpec {
    pub index: i32,
    pub description: String,
    pub voiceover: String,
}

/// Complete plan: natural-language title plus dense, 0-based scene specs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LecturePlan {
    pub title: String,
    pub scenes: Vec<SceneSpec>,
}

/// Shape the model is asked to return in JSON mode.
#[derive(Debug, Deserialize)]
struct PlanPayload {
    title: String,
    scenes: Vec<ScenePayload>,
}

#[derive(Debug, Deserialize)]
struct ScenePayload {
    description: String,
    voiceover: String,
}

const PLANNER_SYSTEM: &str = "You are an expert educator who plans short animated lectures. \
You always answer with a single JSON object and nothing else.";

pub struct LecturePlanner {
    model: Arc<dyn LectureModel>,
    call_timeout: Duration,
}

impl LecturePlanner {
    pub fn new(model: Arc<dyn LectureModel>, call_timeout: Duration) -> Self {
        Self {
            model,
            call_timeout,
        }
    }

    /// Decompose a topic into an ordered sequence of scene specs.
    ///
    /// Guarantees on success: the plan is non-empty and indices are dense
    /// starting at 0. Signals `PipelineError::Planning` when the topic is
    /// blank or the model yields no coherent decomposition; that failure is
    /// fatal for the lecture.
    pub async fn plan(
        &self,
        topic: &str,
        resources: Option<&str>,
        language: Option<&str>,
    ) -> Result<LecturePlan> {
        if topic.trim().is_empty() {
            return Err(PipelineError::Planning("topic is empty".to_string()));
        }

        tracing::info!("Planning lecture for topic: {}", topic);

        let prompt = build_plan_prompt(topic, resources, language);

        let raw = tokio::time::timeout(self.call_timeout, self.model.complete_json(PLANNER_SYSTEM, &prompt))
            .await
            .map_err(|_| PipelineError::Planning("planning request timed out".to_string()))?
            .map_err(PipelineError::Planning)?;

        let plan = parse_plan(&raw)?;
        tracing::info!(
            "Generated lecture plan '{}' with {} scenes",
            plan.title,
            plan.scenes.len()
        );
        Ok(plan)
    }
}

fn build_plan_prompt(topic: &str, resources: Option<&str>, language: Option<&str>) -> String {
    format!(
        r#"Plan a comprehensive, engaging lecture on a topic. The lecture should progress
from basic concepts to more advanced details and total around 2-3 minutes.

Topic: {topic}
Additional resources/context: {resources}
Narration language: {language}

Create approximately 5-7 scenes that:
1. Start with an engaging introduction
2. Progress logically from basic to advanced concepts
3. Include clear visualizations that support learning
4. End with a strong conclusion or practical application

For each scene:
1. Write clear, conversational voiceover text (15-30 seconds when spoken)
2. Describe in plain prose what the animation should show: which elements
   appear, how they are animated, and how the visuals support the voiceover.
   Do not put any code in the description.

Keep visualizations simple and focused, reveal information gradually, and make
complex concepts tangible through metaphors and examples.

Answer with a JSON object of the form:
{{"title": "...", "scenes": [{{"description": "...", "voiceover": "..."}}, ...]}}"#,
        topic = topic,
        resources = resources.unwrap_or("none"),
        language = language.unwrap_or("English"),
    )
}

fn parse_plan(raw: &str) -> Result<LecturePlan> {
    let body = strip_code_fence(raw);
    let payload: PlanPayload = serde_json::from_str(&body)
        .map_err(|e| PipelineError::Planning(format!("unparseable plan: {}", e)))?;

    if payload.scenes.is_empty() {
        return Err(PipelineError::Planning(
            "plan contains no scenes".to_string(),
        ));
    }

    // Indices are assigned here, not taken from the model, so they are
    // dense and 0-based by construction.
    let scenes = payload
        .scenes
        .into_iter()
        .enumerate()
        .map(|(i, s)| SceneSpec {
            index: i as i32,
            description: s.description,
            voiceover: s.voiceover,
        })
        .collect();

    Ok(LecturePlan {
        title: payload.title,
        scenes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedModel(String);

    #[async_trait]
    impl LectureModel for FixedModel {
        async fn complete_json(
            &self,
            _system: &str,
            _prompt: &str,
        ) -> std::result::Result<String, String> {
            Ok(self.0.clone())
        }
        async fn complete(
            &self,
            _system: &str,
            _prompt: &str,
        ) -> std::result::Result<String, String> {
            Ok(self.0.clone())
        }
    }

    fn planner(response: &str) -> LecturePlanner {
        LecturePlanner::new(
            Arc::new(FixedModel(response.to_string())),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn blank_topic_is_a_planning_failure() {
        let p = planner("{}");
        let err = p.plan("   ", None, None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Planning(_)));
    }

    #[tokio::test]
    async fn plan_indices_are_dense_and_zero_based() {
        let p = planner(
            r#"{"title":"Sorting","scenes":[
                {"description":"intro","voiceover":"welcome"},
                {"description":"bubble sort","voiceover":"first"},
                {"description":"outro","voiceover":"bye"}]}"#,
        );
        let plan = p.plan("sorting", None, None).await.unwrap();
        assert_eq!(plan.title, "Sorting");
        let indices: Vec<i32> = plan.scenes.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn fenced_json_is_accepted() {
        let p = planner(
            "```json\n{\"title\":\"T\",\"scenes\":[{\"description\":\"d\",\"voiceover\":\"v\"}]}\n```",
        );
        let plan = p.plan("t", None, None).await.unwrap();
        assert_eq!(plan.scenes.len(), 1);
    }

    #[tokio::test]
    async fn empty_plan_is_a_planning_failure() {
        let p = planner(r#"{"title":"T","scenes":[]}"#);
        let err = p.plan("t", None, None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Planning(_)));
    }

    #[tokio::test]
    async fn garbage_is_a_planning_failure() {
        let p = planner("I cannot make sense of this topic.");
        let err = p.plan("t", None, None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Planning(_)));
    }
}
