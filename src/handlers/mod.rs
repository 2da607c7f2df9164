// src/handlers/mod.rs
pub mod lectures;
