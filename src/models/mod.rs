// src/models/mod.rs
pub mod lecture;
pub mod scene;

pub use lecture::{Lecture, LectureStatus, NewLecture};
pub use scene::{Scene, SceneArtifact, SceneStatus};
