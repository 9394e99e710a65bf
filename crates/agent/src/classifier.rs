use std::sync::Arc;
use std::sync::OnceLock;

use quill_core::domain::conversation::ChatTurn;
use quill_core::errors::SchedulerError;
use quill_scheduler::Scheduler;
use regex::Regex;

use crate::prompts;
use crate::providers::GenerationClient;

/// Discrete routing tag for one user message. Exactly one per message;
/// labels outside the known set default to `Search`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Intent {
    Search,
    SpecificPaper,
    Explain,
    FollowUp,
    PaperNumberReference,
    FullPaper,
    ClarificationNeeded,
    OutOfScope,
    Comparison,
    SpecificSections,
    Implementation,
}

impl Intent {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::SpecificPaper => "specific_paper",
            Self::Explain => "explain",
            Self::FollowUp => "follow_up",
            Self::PaperNumberReference => "paper_number_reference",
            Self::FullPaper => "full_paper",
            Self::ClarificationNeeded => "clarification_needed",
            Self::OutOfScope => "out_of_scope",
            Self::Comparison => "comparison",
            Self::SpecificSections => "specific_sections",
            Self::Implementation => "implementation",
        }
    }

    /// Case-insensitive mapping from a model label. Anything unrecognized
    /// becomes `Search`, so a misbehaving model degrades to the broadest
    /// strategy instead of an error.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "search" => Self::Search,
            "specific_paper" => Self::SpecificPaper,
            "explain" => Self::Explain,
            "follow_up" | "follow-up" => Self::FollowUp,
            "paper_number_reference" => Self::PaperNumberReference,
            "full_paper" => Self::FullPaper,
            "clarification_needed" | "clarification" => Self::ClarificationNeeded,
            "out_of_scope" => Self::OutOfScope,
            "comparison" => Self::Comparison,
            "specific_sections" => Self::SpecificSections,
            "implementation" => Self::Implementation,
            _ => Self::Search,
        }
    }
}

/// Section names the classifier and the section generator both recognize.
pub const SECTION_NAMES: &[&str] =
    &["methodology", "results", "conclusion", "introduction", "discussion", "abstract"];

struct KeywordRule {
    intent: Intent,
    cues: &'static [&'static str],
}

/// Deterministic rules, evaluated in order after the numeric back-reference
/// check; the first hit wins and skips the model call entirely.
const KEYWORD_RULES: &[KeywordRule] = &[
    KeywordRule {
        intent: Intent::FullPaper,
        cues: &["full paper", "open paper", "download", "view paper", "pdf"],
    },
    KeywordRule {
        intent: Intent::Comparison,
        cues: &["compare", "versus", " vs ", "difference", "differences"],
    },
    KeywordRule { intent: Intent::SpecificSections, cues: SECTION_NAMES },
    KeywordRule {
        intent: Intent::Implementation,
        cues: &["implementation", "algorithm", "how to implement", "code"],
    },
];

/// Pure rule stage: numeric back-reference first, then the keyword table.
/// Returns `None` when only the model can decide.
pub fn match_rules(message: &str, cached_count: usize) -> Option<Intent> {
    if extract_paper_number(message, cached_count).is_some() {
        return Some(Intent::PaperNumberReference);
    }
    let normalized = message.to_lowercase();
    KEYWORD_RULES
        .iter()
        .find(|rule| rule.cues.iter().any(|cue| normalized.contains(cue)))
        .map(|rule| rule.intent)
}

/// Zero-based index for a numeric back-reference ("paper 2", "more about
/// 3", or a bare integer). `None` when no number is present or the number
/// does not address the current cache.
pub fn extract_paper_number(message: &str, cached_count: usize) -> Option<usize> {
    let number = parse_paper_number(message)?;
    (number >= 1 && number <= cached_count).then(|| number - 1)
}

/// The 1-based number mentioned in the message, without range-checking it.
pub fn parse_paper_number(message: &str) -> Option<usize> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(?:paper|number|no\.?|#|about)\s*#?\s*(\d+)\b").expect("static pattern")
    });

    if let Some(captures) = pattern.captures(message) {
        return captures[1].parse().ok();
    }
    let bare = message.trim();
    if !bare.is_empty() && bare.chars().all(|c| c.is_ascii_digit()) {
        return bare.parse().ok();
    }
    None
}

/// The first recognized section name mentioned in the message.
pub fn recognized_section(message: &str) -> Option<&'static str> {
    let normalized = message.to_lowercase();
    SECTION_NAMES.iter().find(|name| normalized.contains(**name)).copied()
}

/// Rules-then-model intent classifier. The model path runs through the lite
/// scheduler, so classification competes for quota like any other call.
pub struct IntentClassifier<G> {
    generation: Arc<G>,
    lite: Arc<Scheduler>,
}

impl<G: GenerationClient> IntentClassifier<G> {
    pub fn new(generation: Arc<G>, lite: Arc<Scheduler>) -> Self {
        Self { generation, lite }
    }

    pub async fn classify(
        &self,
        message: &str,
        history: &[ChatTurn],
        cached_count: usize,
    ) -> Result<Intent, SchedulerError> {
        if let Some(intent) = match_rules(message, cached_count) {
            tracing::debug!(
                event_name = "agent.intent.rule_hit",
                intent = intent.label(),
                "deterministic rule matched, skipping model call"
            );
            return Ok(intent);
        }

        let prompt = prompts::classification(message, history);
        let label = self.lite.schedule(|| self.generation.complete(&prompt)).await?;
        Ok(Intent::from_label(&label))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use quill_core::errors::ProviderError;
    use quill_scheduler::{BackoffConfig, DailyQuota, Scheduler, SchedulerConfig};

    use super::{extract_paper_number, match_rules, parse_paper_number, Intent, IntentClassifier};
    use crate::providers::GenerationClient;

    #[test]
    fn unknown_labels_default_to_search() {
        assert_eq!(Intent::from_label("EXPLAIN"), Intent::Explain);
        assert_eq!(Intent::from_label("follow-up"), Intent::FollowUp);
        assert_eq!(Intent::from_label("banana"), Intent::Search);
        assert_eq!(Intent::from_label(""), Intent::Search);
    }

    #[test]
    fn paper_number_extraction_respects_cache_size() {
        assert_eq!(extract_paper_number("paper 2", 3), Some(1));
        assert_eq!(extract_paper_number("tell me more about 3", 3), Some(2));
        assert_eq!(extract_paper_number("2", 3), Some(1));
        // Out of range on a one-item cache.
        assert_eq!(extract_paper_number("paper 2", 1), None);
        assert_eq!(extract_paper_number("paper 0", 3), None);
        assert_eq!(extract_paper_number("no numbers here", 3), None);
    }

    #[test]
    fn parse_keeps_one_based_number() {
        assert_eq!(parse_paper_number("paper #4"), Some(4));
        assert_eq!(parse_paper_number("  7  "), Some(7));
        assert_eq!(parse_paper_number("2017 was a good year"), None);
    }

    #[test]
    fn rule_table_matches_common_phrasings() {
        struct Case {
            text: &'static str,
            cached: usize,
            expected: Option<Intent>,
        }

        let cases = vec![
            Case { text: "paper 2", cached: 3, expected: Some(Intent::PaperNumberReference) },
            Case { text: "paper 2", cached: 1, expected: None },
            Case { text: "show me the full paper", cached: 0, expected: Some(Intent::FullPaper) },
            Case { text: "can I download it", cached: 0, expected: Some(Intent::FullPaper) },
            Case { text: "open the pdf", cached: 0, expected: Some(Intent::FullPaper) },
            Case { text: "compare these approaches", cached: 2, expected: Some(Intent::Comparison) },
            Case { text: "what is the difference", cached: 2, expected: Some(Intent::Comparison) },
            Case { text: "BERT versus GPT", cached: 2, expected: Some(Intent::Comparison) },
            Case {
                text: "walk me through the methodology",
                cached: 1,
                expected: Some(Intent::SpecificSections),
            },
            Case {
                text: "what does the conclusion say",
                cached: 1,
                expected: Some(Intent::SpecificSections),
            },
            Case {
                text: "how to implement this",
                cached: 1,
                expected: Some(Intent::Implementation),
            },
            Case { text: "show me the algorithm", cached: 1, expected: Some(Intent::Implementation) },
            Case { text: "find papers on diffusion models", cached: 0, expected: None },
            Case { text: "thanks!", cached: 0, expected: None },
            // Numeric back-reference outranks every keyword rule.
            Case {
                text: "download paper 2",
                cached: 3,
                expected: Some(Intent::PaperNumberReference),
            },
        ];

        for (index, case) in cases.iter().enumerate() {
            assert_eq!(
                match_rules(case.text, case.cached),
                case.expected,
                "case {index}: {}",
                case.text
            );
        }
    }

    struct ScriptedGeneration(&'static str);

    #[async_trait]
    impl GenerationClient for ScriptedGeneration {
        async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
            Ok(self.0.to_string())
        }
    }

    fn lite_scheduler() -> Arc<Scheduler> {
        let config = SchedulerConfig {
            capacity: 100,
            refill_interval: Duration::from_secs(60),
            max_in_flight: 1,
            backoff: BackoffConfig::new(0, Duration::from_millis(1)),
        };
        Arc::new(Scheduler::new("lite", config, Arc::new(DailyQuota::new(1000))))
    }

    #[tokio::test]
    async fn model_fallback_maps_label_case_insensitively() {
        let classifier = IntentClassifier::new(Arc::new(ScriptedGeneration(" Explain ")), lite_scheduler());
        let intent = classifier.classify("hm?", &[], 0).await.expect("classified");
        assert_eq!(intent, Intent::Explain);
    }

    #[tokio::test]
    async fn model_fallback_defaults_unknown_to_search() {
        let classifier = IntentClassifier::new(Arc::new(ScriptedGeneration("gibberish")), lite_scheduler());
        let intent = classifier.classify("hm?", &[], 0).await.expect("classified");
        assert_eq!(intent, Intent::Search);
    }
}
