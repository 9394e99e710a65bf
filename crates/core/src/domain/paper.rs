use serde::{Deserialize, Serialize};

/// Identifier assigned by the search provider. Quill never mints ids of its
/// own; every `PaperId` originates from a search response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaperId(pub String);

impl std::fmt::Display for PaperId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cached summary of a search hit.
///
/// Created when a search completes, stored in provider-ranking order, and
/// replaced wholesale by the next successful search. The only in-place
/// mutation is enrichment: filling `abstract_text` from a detail fetch or
/// `full_text` from a full-text fetch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
    pub id: PaperId,
    pub title: String,
    pub download_url: String,
    pub abstract_text: Option<String>,
    pub full_text: Option<String>,
}

impl Paper {
    pub fn new(id: impl Into<String>, title: impl Into<String>, download_url: impl Into<String>) -> Self {
        Self {
            id: PaperId(id.into()),
            title: title.into(),
            download_url: download_url.into(),
            abstract_text: None,
            full_text: None,
        }
    }

    /// Fill missing summary fields from an on-demand detail fetch. Existing
    /// values win; enrichment never overwrites.
    pub fn merge_detail(&mut self, detail: &PaperDetail) {
        if self.abstract_text.is_none() {
            self.abstract_text = detail.abstract_text.clone();
        }
    }
}

/// Richer record fetched on demand from the detail collaborator. Not cached
/// beyond the single response unless explicitly merged into a cached `Paper`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperDetail {
    pub id: PaperId,
    pub title: String,
    pub abstract_text: Option<String>,
    pub authors: Vec<String>,
    pub published_date: Option<String>,
    pub full_text_url: Option<String>,
}

/// Response contract of the search collaborator. An empty `results` list is
/// a valid, non-error response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<Paper>,
    pub total_hits: Option<u64>,
}
