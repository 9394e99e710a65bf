//! Agent runtime - intent classification and response orchestration.
//!
//! This crate is the "brain" of quill: it takes one user message plus the
//! session so far and produces a sanitized, structured reply:
//!
//! 1. **Intent classification** (`classifier`) - an ordered list of pure,
//!    zero-cost rules catches the unambiguous cases; everything else falls
//!    through to a closed-set model call on the lite scheduler.
//! 2. **Response generation** (`generators`) - one strategy per intent,
//!    reading and writing the `ConversationContext` paper cache and calling
//!    the generation provider through the heavy scheduler.
//! 3. **Citation extraction** (`citations`) - machine-parseable
//!    `identifier="..."` markers in generated text are intersected with the
//!    generation input set.
//! 4. **Render + sanitize** (`runtime`) - structured content nodes become
//!    HTML exactly once, through the per-intent allow-list policy.
//!
//! # Caller obligation
//!
//! The `ConversationContext` is read and written non-atomically by the
//! generators. Messages belonging to the same session must be processed
//! serially by the caller; no internal lock is taken.

pub mod citations;
pub mod classifier;
pub mod context;
pub mod generators;
pub mod prompts;
pub mod providers;
pub mod runtime;

pub use classifier::{extract_paper_number, Intent, IntentClassifier};
pub use context::ConversationContext;
pub use generators::{DraftReply, ResponseGenerator};
pub use providers::{GenerationClient, NoopTranscriptSink, PaperSource, TranscriptSink};
pub use runtime::{AgentRuntime, SchedulerSet};
