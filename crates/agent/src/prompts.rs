//! Prompt templates, one per model-facing call. Plain format strings; the
//! model is a text collaborator, all structure it must emit is spelled out
//! here (HTML vocabulary, citation markers, the closed label set).

use quill_core::domain::conversation::ChatTurn;
use quill_core::domain::paper::Paper;

const CITATION_RULE: &str = "When you reference a specific paper, wrap the mention in \
    <span identifier=\"PAPER_ID\">...</span> using the paper's id. \
    Only cite papers from the provided list.";

const HTML_RULE: &str = "Format the response as HTML using only these tags: \
    div, h2, h3, h4, ul, ol, li, span, p, a, em, strong, code.";

pub fn classification(message: &str, history: &[ChatTurn]) -> String {
    format!(
        "Classify the user's intent into exactly one of the following categories: \
         search, specific_paper, explain, follow_up, paper_number_reference, full_paper, \
         clarification_needed, out_of_scope, comparison, specific_sections, implementation. \
         Return only the category name.\n\n\
         Conversation history:\n{}\n\n\
         User input: {message}\n\
         Intent:",
        transcript(history)
    )
}

pub fn optimized_query(message: &str) -> String {
    format!(
        "Generate an optimized academic search query based on the user's question. \
         Return only the search query.\n\n\
         User input: {message}\n\
         Search query:"
    )
}

pub fn narrative(message: &str, papers: &[Paper], history: &[ChatTurn]) -> String {
    format!(
        "Answer the user's question using the provided papers. {HTML_RULE} {CITATION_RULE}\n\n\
         Conversation history:\n{}\n\n\
         User input: {message}\n\
         Papers: {}\n\
         Response:",
        transcript(history),
        papers_digest(papers)
    )
}

pub fn explain(message: &str, papers: &[Paper], history: &[ChatTurn]) -> String {
    format!(
        "Explain the concept the user is asking about, grounded in the provided papers when \
         they are relevant. {HTML_RULE} {CITATION_RULE}\n\n\
         Conversation history:\n{}\n\n\
         User input: {message}\n\
         Papers: {}\n\
         Response:",
        transcript(history),
        papers_digest(papers)
    )
}

pub fn follow_up(message: &str, papers: &[Paper], history: &[ChatTurn]) -> String {
    format!(
        "Answer the follow-up question using the papers already under discussion. \
         {HTML_RULE} {CITATION_RULE}\n\n\
         Conversation history:\n{}\n\n\
         User input: {message}\n\
         Papers: {}\n\
         Response:",
        transcript(history),
        papers_digest(papers)
    )
}

pub fn comparison(message: &str, papers: &[Paper]) -> String {
    format!(
        "Compare the provided papers: aims, methods, findings, and limitations. Structure the \
         comparison clearly. {HTML_RULE} {CITATION_RULE}\n\n\
         User input: {message}\n\
         Papers: {}\n\
         Response:",
        papers_digest(papers)
    )
}

pub fn section(message: &str, paper_title: &str, section_name: &str, section_text: &str) -> String {
    format!(
        "Summarize and explain the {section_name} section of the paper \"{paper_title}\" in \
         response to the user's question. {HTML_RULE}\n\n\
         User input: {message}\n\
         Section text:\n{section_text}\n\
         Response:"
    )
}

pub fn implementation(message: &str, papers: &[Paper]) -> String {
    format!(
        "Describe how one would implement the approach from the provided papers: key \
         algorithms, data structures, and practical pitfalls. {HTML_RULE} {CITATION_RULE}\n\n\
         User input: {message}\n\
         Papers: {}\n\
         Response:",
        papers_digest(papers)
    )
}

pub fn clarification(message: &str, history: &[ChatTurn]) -> String {
    format!(
        "The user's request is ambiguous. Ask one short clarifying question that would let a \
         research assistant proceed. Return plain text only.\n\n\
         Conversation history:\n{}\n\n\
         User input: {message}\n\
         Clarifying question:",
        transcript(history)
    )
}

pub fn out_of_scope(message: &str) -> String {
    format!(
        "The user's request is outside the scope of a research-paper assistant. Politely say \
         so in one or two sentences and suggest what you can help with instead. Return plain \
         text only.\n\n\
         User input: {message}\n\
         Response:"
    )
}

fn transcript(history: &[ChatTurn]) -> String {
    history.iter().map(ChatTurn::transcript_line).collect::<Vec<_>>().join("\n")
}

/// Compact JSON digest of the generation-input papers. Full text is never
/// inlined here; section prompts carry their own excerpt.
fn papers_digest(papers: &[Paper]) -> String {
    let digest: Vec<_> = papers
        .iter()
        .map(|paper| {
            serde_json::json!({
                "id": paper.id.0,
                "title": paper.title,
                "abstract": paper.abstract_text,
            })
        })
        .collect();
    serde_json::Value::Array(digest).to_string()
}
