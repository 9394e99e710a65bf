use quill_core::domain::paper::{Paper, PaperDetail, PaperId};
use quill_core::errors::ChatError;

/// Per-session cache of the last search result set and the paper currently
/// in focus.
///
/// The paper list is replaced wholesale by each successful search; entries
/// are never individually mutated except for enrichment (abstract from a
/// detail fetch, full text from a full-text fetch). `focused_index`, when
/// set, is always a valid index into `cached_papers`.
///
/// Not internally synchronized: the caller processes one session's messages
/// serially.
#[derive(Clone, Debug, Default)]
pub struct ConversationContext {
    cached_papers: Vec<Paper>,
    focused_index: Option<usize>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn papers(&self) -> &[Paper] {
        &self.cached_papers
    }

    pub fn len(&self) -> usize {
        self.cached_papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cached_papers.is_empty()
    }

    /// Install a fresh result set, dropping the previous one and clearing
    /// the focus (the old index would address the wrong list).
    pub fn replace_papers(&mut self, papers: Vec<Paper>) {
        self.cached_papers = papers;
        self.focused_index = None;
    }

    pub fn focus(&mut self, index: usize) -> Result<(), ChatError> {
        if index >= self.cached_papers.len() {
            return Err(ChatError::ReferenceOutOfRange {
                requested: index + 1,
                available: self.cached_papers.len(),
            });
        }
        self.focused_index = Some(index);
        Ok(())
    }

    pub fn focused_index(&self) -> Option<usize> {
        self.focused_index
    }

    pub fn focused_paper(&self) -> Option<&Paper> {
        self.focused_index.and_then(|index| self.cached_papers.get(index))
    }

    /// Merge an on-demand detail fetch into the matching cached entry.
    pub fn enrich(&mut self, id: &PaperId, detail: &PaperDetail) {
        if let Some(paper) = self.cached_papers.iter_mut().find(|paper| &paper.id == id) {
            paper.merge_detail(detail);
        }
    }

    /// Attach fetched full text to the matching cached entry.
    pub fn attach_full_text(&mut self, id: &PaperId, text: String) {
        if let Some(paper) = self.cached_papers.iter_mut().find(|paper| &paper.id == id) {
            paper.full_text = Some(text);
        }
    }
}
