//! Quill core - domain types, error taxonomy, configuration, and content
//! rendering for the research-paper chat engine.
//!
//! Everything in this crate is deterministic and free of I/O. The async
//! pipeline (scheduling, provider calls, orchestration) lives in the
//! `quill-scheduler` and `quill-agent` crates and builds on the types here.

pub mod config;
pub mod content;
pub mod domain;
pub mod errors;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use content::{render, sanitize, ContentNode, SanitizePolicy};
pub use domain::conversation::{ChatTurn, GenerationResult, Speaker, TranscriptEntry};
pub use domain::paper::{Paper, PaperDetail, PaperId, SearchResponse};
pub use errors::{ChatError, ProviderError, SchedulerError};
