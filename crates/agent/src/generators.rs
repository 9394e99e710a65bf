use std::sync::Arc;
use std::sync::OnceLock;

use quill_core::content::{ContentNode, SanitizePolicy};
use quill_core::domain::conversation::ChatTurn;
use quill_core::domain::paper::Paper;
use quill_core::errors::ChatError;
use quill_scheduler::Scheduler;
use regex::Regex;

use crate::citations;
use crate::classifier::{parse_paper_number, recognized_section, Intent, SECTION_NAMES};
use crate::context::ConversationContext;
use crate::prompts;
use crate::providers::{GenerationClient, PaperSource};

/// Longest section excerpt forwarded to the generation provider.
const MAX_SECTION_CHARS: usize = 4000;

/// Un-rendered reply from one generator: the plain text, the structured
/// content tree, the cited subset, and the allow-list policy the runtime
/// must apply when rendering.
#[derive(Clone, Debug)]
pub struct DraftReply {
    pub text: String,
    pub nodes: Vec<ContentNode>,
    pub cited: Vec<Paper>,
    pub policy: SanitizePolicy,
}

impl DraftReply {
    /// Provider-produced markup: sanitized under the rich policy.
    fn from_markup(text: String, cited: Vec<Paper>) -> Self {
        Self { nodes: vec![ContentNode::Raw(text.clone())], text, cited, policy: SanitizePolicy::rich() }
    }

    /// Plain notice (errors, disambiguation): minimal policy, escaped text.
    fn notice(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            nodes: vec![ContentNode::Paragraph(text.clone())],
            text,
            cited: Vec::new(),
            policy: SanitizePolicy::minimal(),
        }
    }
}

/// One response strategy per intent. Strategies call the generation
/// provider through the heavy scheduler (query optimization goes through
/// lite) and read/write the conversation context.
pub struct ResponseGenerator<G, P> {
    generation: Arc<G>,
    papers: Arc<P>,
    lite: Arc<Scheduler>,
    heavy: Arc<Scheduler>,
}

impl<G, P> ResponseGenerator<G, P>
where
    G: GenerationClient,
    P: PaperSource,
{
    pub fn new(generation: Arc<G>, papers: Arc<P>, lite: Arc<Scheduler>, heavy: Arc<Scheduler>) -> Self {
        Self { generation, papers, lite, heavy }
    }

    pub async fn respond(
        &self,
        intent: Intent,
        message: &str,
        history: &[ChatTurn],
        ctx: &mut ConversationContext,
    ) -> Result<DraftReply, ChatError> {
        match intent {
            Intent::Search => self.search(message, history, ctx).await,
            Intent::SpecificPaper => self.specific_paper(message).await,
            Intent::Explain => self.explain(message, history, ctx).await,
            Intent::FollowUp => self.follow_up(message, history, ctx).await,
            Intent::PaperNumberReference => self.paper_number(message, ctx).await,
            Intent::FullPaper => self.full_paper(ctx).await,
            Intent::ClarificationNeeded => self.clarification(message, history).await,
            Intent::OutOfScope => self.out_of_scope(message).await,
            Intent::Comparison => self.comparison(message, ctx).await,
            Intent::SpecificSections => self.sections(message, ctx).await,
            Intent::Implementation => self.implementation(message, ctx).await,
        }
    }

    async fn search(
        &self,
        message: &str,
        history: &[ChatTurn],
        ctx: &mut ConversationContext,
    ) -> Result<DraftReply, ChatError> {
        let query_prompt = prompts::optimized_query(message);
        let query = self.lite.schedule(|| self.generation.complete(&query_prompt)).await?;
        let query = query.trim().to_string();

        let response = self.papers.search(&query).await?;
        if response.results.is_empty() {
            // The cache keeps the previous result set on a failed search.
            return Err(ChatError::NoResultsFound { query });
        }
        tracing::info!(
            event_name = "agent.search.completed",
            query = %query,
            result_count = response.results.len(),
            "search results cached"
        );
        ctx.replace_papers(response.results);

        let prompt = prompts::narrative(message, ctx.papers(), history);
        let text = self.generate_markup(&prompt).await?;
        let cited = citations::extract_cited(&text, ctx.papers());
        Ok(DraftReply::from_markup(text, cited))
    }

    async fn specific_paper(&self, message: &str) -> Result<DraftReply, ChatError> {
        let response = self.papers.search(message).await?;
        let Some(paper) = response.results.into_iter().next() else {
            return Ok(DraftReply::notice(
                "I couldn't find a paper with that title. Try refining the title or adding \
                 an author name.",
            ));
        };

        let abstract_text =
            paper.abstract_text.clone().unwrap_or_else(|| "No abstract available.".to_string());
        let text = format!("Here is \"{}\".\n\n{abstract_text}", paper.title);
        let nodes = vec![
            ContentNode::Heading { level: 3, text: paper.title.clone() },
            ContentNode::Paragraph(abstract_text),
            ContentNode::Link { href: paper.download_url.clone(), label: "Open PDF".to_string() },
        ];
        Ok(DraftReply { text, nodes, cited: vec![summary_of(&paper)], policy: SanitizePolicy::rich() })
    }

    async fn paper_number(
        &self,
        message: &str,
        ctx: &mut ConversationContext,
    ) -> Result<DraftReply, ChatError> {
        let available = ctx.len();
        let requested = parse_paper_number(message).unwrap_or(0);
        let index = requested
            .checked_sub(1)
            .filter(|index| *index < available)
            .ok_or(ChatError::ReferenceOutOfRange { requested, available })?;
        ctx.focus(index)?;

        let cached = ctx.papers()[index].clone();
        match self.papers.fetch_detail(&cached.id).await {
            Ok(detail) => {
                ctx.enrich(&cached.id, &detail);
                let mut nodes = vec![ContentNode::Heading { level: 3, text: detail.title.clone() }];
                let mut byline = Vec::new();
                if !detail.authors.is_empty() {
                    byline.push(detail.authors.join(", "));
                }
                if let Some(date) = &detail.published_date {
                    byline.push(format!("published {date}"));
                }
                if !byline.is_empty() {
                    nodes.push(ContentNode::Paragraph(byline.join(" - ")));
                }
                let abstract_text = detail
                    .abstract_text
                    .clone()
                    .or_else(|| cached.abstract_text.clone())
                    .unwrap_or_else(|| "No abstract available.".to_string());
                nodes.push(ContentNode::Paragraph(abstract_text.clone()));
                nodes.push(ContentNode::Link {
                    href: cached.download_url.clone(),
                    label: "Open PDF".to_string(),
                });

                let text = format!("Now looking at paper {requested}: \"{}\".\n\n{abstract_text}", detail.title);
                let focused = ctx.papers()[index].clone();
                Ok(DraftReply { text, nodes, cited: vec![summary_of(&focused)], policy: SanitizePolicy::rich() })
            }
            Err(error) => {
                // Degraded but non-fatal: answer from the cached summary.
                tracing::warn!(
                    event_name = "agent.detail.degraded",
                    paper_id = %cached.id,
                    error = %error,
                    "detail fetch failed, falling back to cached summary"
                );
                let abstract_text = cached
                    .abstract_text
                    .clone()
                    .unwrap_or_else(|| "No abstract available.".to_string());
                let text = format!("Now looking at paper {requested}: \"{}\".\n\n{abstract_text}", cached.title);
                let nodes = vec![
                    ContentNode::Heading { level: 3, text: cached.title.clone() },
                    ContentNode::Paragraph(abstract_text),
                    ContentNode::Link {
                        href: cached.download_url.clone(),
                        label: "Open PDF".to_string(),
                    },
                ];
                Ok(DraftReply { text, nodes, cited: vec![summary_of(&cached)], policy: SanitizePolicy::rich() })
            }
        }
    }

    async fn full_paper(&self, ctx: &mut ConversationContext) -> Result<DraftReply, ChatError> {
        if ctx.is_empty() {
            return Err(ChatError::NoContext);
        }
        match ctx.focused_paper() {
            Some(paper) => {
                let text = format!("Opening the full paper: \"{}\".", paper.title);
                let nodes = vec![
                    ContentNode::Heading { level: 3, text: paper.title.clone() },
                    ContentNode::Link {
                        href: paper.download_url.clone(),
                        label: "Open full paper (PDF)".to_string(),
                    },
                ];
                Ok(DraftReply {
                    text,
                    nodes,
                    cited: vec![summary_of(paper)],
                    policy: SanitizePolicy::rich(),
                })
            }
            None => {
                // No focus yet: ask instead of guessing.
                let listing: Vec<String> = ctx
                    .papers()
                    .iter()
                    .enumerate()
                    .map(|(index, paper)| format!("{}. {}", index + 1, paper.title))
                    .collect();
                let text = format!(
                    "Which paper would you like to open?\n{}",
                    listing.join("\n")
                );
                let nodes = vec![
                    ContentNode::Paragraph("Which paper would you like to open?".to_string()),
                    ContentNode::List(listing),
                ];
                Ok(DraftReply { text, nodes, cited: Vec::new(), policy: SanitizePolicy::minimal() })
            }
        }
    }

    async fn explain(
        &self,
        message: &str,
        history: &[ChatTurn],
        ctx: &ConversationContext,
    ) -> Result<DraftReply, ChatError> {
        let prompt = prompts::explain(message, ctx.papers(), history);
        let text = self.generate_markup(&prompt).await?;
        let cited = citations::extract_cited(&text, ctx.papers());
        Ok(DraftReply::from_markup(text, cited))
    }

    async fn follow_up(
        &self,
        message: &str,
        history: &[ChatTurn],
        ctx: &ConversationContext,
    ) -> Result<DraftReply, ChatError> {
        if ctx.is_empty() {
            // Checked before any provider call is made.
            return Err(ChatError::NoContext);
        }
        let prompt = prompts::follow_up(message, ctx.papers(), history);
        let text = self.generate_markup(&prompt).await?;
        let cited = citations::extract_cited(&text, ctx.papers());
        Ok(DraftReply::from_markup(text, cited))
    }

    async fn comparison(
        &self,
        message: &str,
        ctx: &ConversationContext,
    ) -> Result<DraftReply, ChatError> {
        if ctx.len() < 2 {
            return Err(ChatError::InsufficientComparisonSet { available: ctx.len() });
        }
        let prompt = prompts::comparison(message, ctx.papers());
        let text = self.generate_markup(&prompt).await?;
        let cited = citations::extract_cited(&text, ctx.papers());
        Ok(DraftReply::from_markup(text, cited))
    }

    async fn sections(
        &self,
        message: &str,
        ctx: &mut ConversationContext,
    ) -> Result<DraftReply, ChatError> {
        if ctx.is_empty() {
            return Err(ChatError::NoContext);
        }
        let Some(focused) = ctx.focused_paper().cloned() else {
            return Err(ChatError::NoContext);
        };
        let section = recognized_section(message);

        if section.is_some() && focused.full_text.is_none() {
            self.hydrate_full_text(ctx, &focused).await;
        }
        let focused = ctx.focused_paper().cloned().unwrap_or(focused);

        let excerpt = section.and_then(|name| {
            focused.full_text.as_deref().and_then(|body| extract_section(body, name))
        });
        let (section_name, source_text) = match (section, excerpt) {
            (Some(name), Some(body)) => (name, body),
            (section, _) => {
                // SectionNotFound is a fallback path, not a user-facing error.
                let wanted = section.unwrap_or("abstract");
                tracing::debug!(
                    event_name = "agent.section.fallback",
                    paper_id = %focused.id,
                    section = wanted,
                    "section not found, answering from the abstract"
                );
                let abstract_text = focused
                    .abstract_text
                    .clone()
                    .unwrap_or_else(|| "No abstract available.".to_string());
                ("abstract", abstract_text)
            }
        };

        let prompt = prompts::section(message, &focused.title, section_name, &source_text);
        let text = self.generate_markup(&prompt).await?;
        Ok(DraftReply {
            text: text.clone(),
            nodes: vec![ContentNode::Raw(text)],
            cited: vec![summary_of(&focused)],
            policy: SanitizePolicy::rich(),
        })
    }

    async fn implementation(
        &self,
        message: &str,
        ctx: &ConversationContext,
    ) -> Result<DraftReply, ChatError> {
        let prompt = prompts::implementation(message, ctx.papers());
        let text = self.generate_markup(&prompt).await?;
        let cited = citations::extract_cited(&text, ctx.papers());
        Ok(DraftReply::from_markup(text, cited))
    }

    async fn clarification(
        &self,
        message: &str,
        history: &[ChatTurn],
    ) -> Result<DraftReply, ChatError> {
        let prompt = prompts::clarification(message, history);
        let text = self.heavy.schedule(|| self.generation.complete(&prompt)).await?;
        Ok(DraftReply::notice(text.trim().to_string()))
    }

    async fn out_of_scope(&self, message: &str) -> Result<DraftReply, ChatError> {
        let prompt = prompts::out_of_scope(message);
        let text = self.heavy.schedule(|| self.generation.complete(&prompt)).await?;
        Ok(DraftReply::notice(text.trim().to_string()))
    }

    async fn generate_markup(&self, prompt: &str) -> Result<String, ChatError> {
        let raw = self.heavy.schedule(|| self.generation.complete(prompt)).await?;
        Ok(strip_code_fences(&raw))
    }

    /// Best-effort full-text hydration for the focused paper. Failures are
    /// logged, never surfaced; the caller falls back to the abstract.
    async fn hydrate_full_text(&self, ctx: &mut ConversationContext, focused: &Paper) {
        let detail = match self.papers.fetch_detail(&focused.id).await {
            Ok(detail) => detail,
            Err(error) => {
                tracing::warn!(
                    event_name = "agent.fulltext.detail_failed",
                    paper_id = %focused.id,
                    error = %error,
                    "detail fetch for full text failed"
                );
                return;
            }
        };
        ctx.enrich(&focused.id, &detail);
        let Some(url) = detail.full_text_url else {
            return;
        };
        match self.papers.fetch_full_text(&url).await {
            Ok(body) => ctx.attach_full_text(&focused.id, body),
            Err(error) => {
                tracing::warn!(
                    event_name = "agent.fulltext.fetch_failed",
                    paper_id = %focused.id,
                    error = %error,
                    "full text fetch failed"
                );
            }
        }
    }
}

/// Cached entry without its full text, for embedding in results.
fn summary_of(paper: &Paper) -> Paper {
    Paper { full_text: None, ..paper.clone() }
}

/// Providers often wrap HTML answers in markdown fences; drop them.
fn strip_code_fences(text: &str) -> String {
    text.replace("```html", "").replace("```", "").trim().to_string()
}

/// Best-effort extraction of a named section from tag-stripped full text:
/// from the section heading up to the next recognized heading, capped at
/// `MAX_SECTION_CHARS`.
fn extract_section(full_text: &str, section: &str) -> Option<String> {
    static CACHE: OnceLock<std::sync::Mutex<std::collections::HashMap<String, Regex>>> =
        OnceLock::new();
    let cache = CACHE.get_or_init(Default::default);

    let pattern = {
        let mut guard = cache.lock().ok()?;
        if let Some(existing) = guard.get(section) {
            existing.clone()
        } else {
            let others = SECTION_NAMES
                .iter()
                .filter(|name| **name != section)
                .copied()
                .collect::<Vec<_>>()
                .join("|");
            let source = format!(
                r"(?is)(?:^|\n)\s*(?:\d+[\.\)]?\s*)?{section}\b[:.]?\s*(.+?)(?:\n\s*(?:\d+[\.\)]?\s*)?(?:{others})\b|\z)"
            );
            let compiled = Regex::new(&source).ok()?;
            guard.insert(section.to_string(), compiled.clone());
            compiled
        }
    };

    let body = pattern.captures(full_text)?.get(1)?.as_str().trim().to_string();
    if body.is_empty() {
        return None;
    }
    Some(body.chars().take(MAX_SECTION_CHARS).collect())
}
