// src/pipeline/mod.rs
pub mod orchestrator;

pub use orchestrator::{spawn_lecture_generation, Orchestrator};
