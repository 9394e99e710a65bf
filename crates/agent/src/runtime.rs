use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use quill_core::config::SchedulerSettings;
use quill_core::content::{render, sanitize, ContentNode, SanitizePolicy};
use quill_core::domain::conversation::{ChatTurn, GenerationResult, TranscriptEntry};
use quill_core::errors::ChatError;
use quill_scheduler::{BackoffConfig, DailyQuota, Scheduler, SchedulerConfig};

use crate::classifier::IntentClassifier;
use crate::context::ConversationContext;
use crate::generators::{DraftReply, ResponseGenerator};
use crate::providers::{GenerationClient, NoopTranscriptSink, PaperSource, TranscriptSink};

/// The two schedulers and the quota they share. Classification and query
/// optimization go through `lite`; response generation goes through
/// `heavy`. Both draw down the same daily quota.
pub struct SchedulerSet {
    pub lite: Arc<Scheduler>,
    pub heavy: Arc<Scheduler>,
    pub quota: Arc<DailyQuota>,
}

impl SchedulerSet {
    pub fn from_config(settings: &SchedulerSettings) -> Self {
        let quota = Arc::new(DailyQuota::new(settings.daily_limit));
        let backoff = BackoffConfig::new(
            settings.retries,
            Duration::from_millis(settings.initial_delay_ms),
        );
        let lite = Arc::new(Scheduler::new(
            "lite",
            SchedulerConfig::from_bucket(&settings.lite, backoff),
            Arc::clone(&quota),
        ));
        let heavy = Arc::new(Scheduler::new(
            "heavy",
            SchedulerConfig::from_bucket(&settings.heavy, backoff),
            Arc::clone(&quota),
        ));
        Self { lite, heavy, quota }
    }
}

/// End-to-end message pipeline: classify, generate, render, sanitize,
/// record. One instance serves one conversation at a time; the caller is
/// responsible for processing messages serially.
pub struct AgentRuntime<G, P, S = NoopTranscriptSink> {
    classifier: IntentClassifier<G>,
    generator: ResponseGenerator<G, P>,
    sink: Arc<S>,
}

impl<G, P> AgentRuntime<G, P, NoopTranscriptSink>
where
    G: GenerationClient,
    P: PaperSource,
{
    pub fn new(generation: Arc<G>, papers: Arc<P>, schedulers: &SchedulerSet) -> Self {
        Self::with_sink(generation, papers, schedulers, Arc::new(NoopTranscriptSink))
    }
}

impl<G, P, S> AgentRuntime<G, P, S>
where
    G: GenerationClient,
    P: PaperSource,
    S: TranscriptSink,
{
    pub fn with_sink(
        generation: Arc<G>,
        papers: Arc<P>,
        schedulers: &SchedulerSet,
        sink: Arc<S>,
    ) -> Self {
        let classifier = IntentClassifier::new(Arc::clone(&generation), Arc::clone(&schedulers.lite));
        let generator = ResponseGenerator::new(
            generation,
            papers,
            Arc::clone(&schedulers.lite),
            Arc::clone(&schedulers.heavy),
        );
        Self { classifier, generator, sink }
    }

    pub async fn handle_message(
        &self,
        message: &str,
        history: &[ChatTurn],
        ctx: &mut ConversationContext,
    ) -> Result<GenerationResult, ChatError> {
        let intent = self.classifier.classify(message, history, ctx.len()).await?;
        tracing::info!(
            event_name = "agent.intent.classified",
            intent = intent.label(),
            cached_papers = ctx.len(),
            "intent resolved"
        );

        let draft = match self.generator.respond(intent, message, history, ctx).await {
            Ok(draft) => draft,
            Err(error) => match error.user_message() {
                // Expected conversational dead ends become polite replies.
                Some(text) => {
                    tracing::info!(
                        event_name = "agent.reply.fallback",
                        intent = intent.label(),
                        error = %error,
                        "translated expected failure into a user-facing reply"
                    );
                    DraftReply {
                        nodes: vec![ContentNode::Paragraph(text.clone())],
                        text,
                        cited: Vec::new(),
                        policy: SanitizePolicy::minimal(),
                    }
                }
                None => return Err(error),
            },
        };

        let html = sanitize(&render(&draft.nodes), &draft.policy);
        let result =
            GenerationResult { text: draft.text, html, cited_papers: draft.cited };

        let entry = TranscriptEntry {
            user_message: message.to_string(),
            bot_message: result.clone(),
            timestamp: Utc::now(),
        };
        if let Err(error) = self.sink.record(&entry).await {
            // Transcript persistence never blocks a reply.
            tracing::warn!(
                event_name = "agent.transcript.failed",
                error = %error,
                "transcript record failed"
            );
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use quill_core::config::{AppConfig, SchedulerSettings};
    use quill_core::domain::conversation::TranscriptEntry;
    use quill_core::domain::paper::{Paper, PaperDetail, PaperId, SearchResponse};
    use quill_core::errors::{ChatError, ProviderError};

    use super::{AgentRuntime, SchedulerSet};
    use crate::context::ConversationContext;
    use crate::providers::{GenerationClient, PaperSource, TranscriptSink};

    struct ScriptedGeneration {
        replies: Mutex<VecDeque<String>>,
    }

    impl ScriptedGeneration {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            })
        }
    }

    #[async_trait]
    impl GenerationClient for ScriptedGeneration {
        async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
            let reply = self.replies.lock().expect("lock").pop_front();
            Ok(reply.unwrap_or_else(|| "search".to_string()))
        }
    }

    struct StaticPapers {
        results: Vec<Paper>,
    }

    #[async_trait]
    impl PaperSource for StaticPapers {
        async fn search(&self, _query: &str) -> Result<SearchResponse, ProviderError> {
            Ok(SearchResponse { results: self.results.clone(), total_hits: None })
        }

        async fn fetch_detail(&self, id: &PaperId) -> Result<PaperDetail, ProviderError> {
            Err(ProviderError::Status { status: 404, message: id.0.clone() })
        }

        async fn fetch_full_text(&self, _url: &str) -> Result<String, ProviderError> {
            Err(ProviderError::Other("no full text".to_string()))
        }
    }

    struct RecordingSink {
        entries: Mutex<Vec<TranscriptEntry>>,
    }

    #[async_trait]
    impl TranscriptSink for RecordingSink {
        async fn record(&self, entry: &TranscriptEntry) -> Result<(), ProviderError> {
            self.entries.lock().expect("lock").push(entry.clone());
            Ok(())
        }
    }

    fn settings() -> SchedulerSettings {
        let mut settings = AppConfig::default().scheduler;
        settings.lite.capacity = 100;
        settings.heavy.capacity = 100;
        settings.retries = 0;
        settings
    }

    #[tokio::test]
    async fn search_turn_produces_sanitized_html_and_a_transcript_entry() {
        let generation = ScriptedGeneration::new(&[
            "search",
            "neural retrieval",
            r#"<p>See <span identifier="p1">this one</span>.<script>alert(1)</script></p>"#,
        ]);
        let papers = Arc::new(StaticPapers {
            results: vec![Paper::new("p1", "Neural Retrieval", "https://x/p1")],
        });
        let sink = Arc::new(RecordingSink { entries: Mutex::new(Vec::new()) });
        let schedulers = SchedulerSet::from_config(&settings());
        let runtime = AgentRuntime::with_sink(generation, papers, &schedulers, Arc::clone(&sink));

        let mut ctx = ConversationContext::new();
        let result = runtime
            .handle_message("anything on neural retrieval?", &[], &mut ctx)
            .await
            .expect("reply");

        assert!(result.html.contains("identifier=\"p1\""));
        assert!(!result.html.contains("<script"));
        assert_eq!(result.cited_papers.len(), 1);
        assert_eq!(sink.entries.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn expected_failures_become_polite_replies() {
        // "follow-up" classifies via the model; the empty cache then fails
        // the generator with NoContext, which has a user translation.
        let generation = ScriptedGeneration::new(&["follow_up"]);
        let papers = Arc::new(StaticPapers { results: Vec::new() });
        let schedulers = SchedulerSet::from_config(&settings());
        let runtime = AgentRuntime::new(generation, papers, &schedulers);

        let mut ctx = ConversationContext::new();
        let result = runtime
            .handle_message("tell me more about it", &[], &mut ctx)
            .await
            .expect("polite reply");
        let expected = ChatError::NoContext.user_message().expect("has translation");
        assert_eq!(result.text, expected);
        assert!(result.cited_papers.is_empty());
    }

    #[tokio::test]
    async fn both_schedulers_draw_down_one_quota() {
        let generation = ScriptedGeneration::new(&[
            "search",
            "optimized query",
            "<p>done</p>",
        ]);
        let papers = Arc::new(StaticPapers {
            results: vec![Paper::new("p1", "One", "https://x/p1")],
        });
        let schedulers = SchedulerSet::from_config(&settings());
        let runtime = AgentRuntime::new(generation, papers, &schedulers);

        let mut ctx = ConversationContext::new();
        runtime.handle_message("find papers", &[], &mut ctx).await.expect("reply");

        // classification (lite) + query optimization (lite) + narrative (heavy)
        assert_eq!(schedulers.quota.used().await, 3);
    }
}
