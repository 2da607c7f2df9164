// src/config.rs - Pipeline policy knobs, overridable from environment
use std::time::Duration;

/// Retry budgets, worker-pool size and external-call timeouts.
/// These are policy values, not invariants - tests run with small ones.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Max Drafting->Validating rounds inside the scene code agent.
    pub max_agent_attempts: u32,
    /// Max whole-pipeline attempts per scene (agent loop + render).
    pub max_scene_attempts: u32,
    /// Bounded worker pool: scenes of one lecture in flight at once.
    pub scene_workers: usize,
    /// Timeout for a single AI generation or validation call.
    pub generation_timeout: Duration,
    /// Timeout for a single TTS or animation render call.
    pub render_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_agent_attempts: 3,
            max_scene_attempts: 2,
            scene_workers: 3,
            generation_timeout: Duration::from_secs(120),
            render_timeout: Duration::from_secs(300),
        }
    }
}

impl PipelineConfig {
    /// Build config from `LUMEO_*` environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_agent_attempts: env_u32("LUMEO_MAX_AGENT_ATTEMPTS")
                .unwrap_or(defaults.max_agent_attempts),
            max_scene_attempts: env_u32("LUMEO_MAX_SCENE_ATTEMPTS")
                .unwrap_or(defaults.max_scene_attempts),
            scene_workers: env_u32("LUMEO_SCENE_WORKERS")
                .map(|n| n.max(1) as usize)
                .unwrap_or(defaults.scene_workers),
            generation_timeout: env_u32("LUMEO_GENERATION_TIMEOUT_SECS")
                .map(|s| Duration::from_secs(s as u64))
                .unwrap_or(defaults.generation_timeout),
            render_timeout: env_u32("LUMEO_RENDER_TIMEOUT_SECS")
                .map(|s| Duration::from_secs(s as u64))
                .unwrap_or(defaults.render_timeout),
        }
    }
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
