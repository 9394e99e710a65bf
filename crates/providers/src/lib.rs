//! HTTP-backed implementations of the agent's provider traits: a Gemini
//! generation client and a CORE-style scholarly search client.

pub mod generation;
pub mod papers;

pub use generation::GeminiClient;
pub use papers::CoreApiClient;
