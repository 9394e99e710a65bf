use thiserror::Error;

/// Failure surfaced by an external collaborator call (generation, search,
/// detail, full text). The transient flag is what the backoff executor
/// consumes: only rate-limit and connection-reset signals are retried.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider rate limit hit: {0}")]
    RateLimited(String),
    #[error("connection reset while calling provider: {0}")]
    ConnectionReset(String),
    #[error("provider rejected the request (status {status}): {message}")]
    Status { status: u16, message: String },
    #[error("provider call failed: {0}")]
    Other(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::ConnectionReset(_))
    }
}

/// Failure of a scheduled operation. Quota exhaustion is fatal for the
/// current request and is never retried; provider errors arrive here only
/// after the backoff budget is spent (or immediately when non-transient).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("daily quota exhausted ({used}/{limit})")]
    QuotaExhausted { used: u32, limit: u32 },
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Domain-level failure of one handled message.
///
/// Variants with a `user_message` translation are answered with a polite
/// reply instead of surfacing as an error; the rest propagate to the caller
/// as an error notice with no partial cache mutation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("no papers found for query `{query}`")]
    NoResultsFound { query: String },
    #[error("no papers in the conversation context")]
    NoContext,
    #[error("paper reference {requested} is out of range (1..={available})")]
    ReferenceOutOfRange { requested: usize, available: usize },
    #[error("comparison needs at least two cached papers, found {available}")]
    InsufficientComparisonSet { available: usize },
    #[error("section `{section}` not found in the paper text")]
    SectionNotFound { section: String },
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl ChatError {
    /// Polite wording for failures the user can act on. `None` means the
    /// error must surface as a raw error notice instead of a reply.
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::NoResultsFound { query } => Some(format!(
                "I couldn't find any papers for \"{query}\". Try rephrasing or broadening the topic."
            )),
            Self::NoContext => Some(
                "I don't have any papers in context yet. Ask me to search for a topic first."
                    .to_string(),
            ),
            Self::ReferenceOutOfRange { requested, available } => Some(format!(
                "Paper {requested} doesn't exist in the current results (I have {available}). \
                 Pick a number from the last search."
            )),
            Self::InsufficientComparisonSet { available } => Some(format!(
                "I need at least two papers to compare, but only {available} is in context. \
                 Search for more first."
            )),
            Self::SectionNotFound { .. }
            | Self::Scheduler(_)
            | Self::Provider(_) => None,
        }
    }
}
