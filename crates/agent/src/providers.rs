use async_trait::async_trait;
use quill_core::domain::conversation::TranscriptEntry;
use quill_core::domain::paper::{PaperDetail, PaperId, SearchResponse};
use quill_core::errors::ProviderError;

/// Generation provider seam. Implementations map their wire errors onto
/// `ProviderError` so the backoff executor can tell transient from fatal.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Paper search / detail / full-text collaborator seam. An empty search
/// result is a valid response, not an error.
#[async_trait]
pub trait PaperSource: Send + Sync {
    async fn search(&self, query: &str) -> Result<SearchResponse, ProviderError>;
    async fn fetch_detail(&self, id: &PaperId) -> Result<PaperDetail, ProviderError>;
    /// Plain text with HTML tags stripped.
    async fn fetch_full_text(&self, url: &str) -> Result<String, ProviderError>;
}

/// Persistence collaborator. Delivery is best-effort: the runtime logs and
/// continues when a record fails.
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    async fn record(&self, entry: &TranscriptEntry) -> Result<(), ProviderError>;
}

/// Drops transcripts. Stands in when no persistence collaborator is wired.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTranscriptSink;

#[async_trait]
impl TranscriptSink for NoopTranscriptSink {
    async fn record(&self, _entry: &TranscriptEntry) -> Result<(), ProviderError> {
        Ok(())
    }
}
