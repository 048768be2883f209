//! Paper metadata record.
//!
//! [`Paper`] values are produced by the arXiv metadata client and consumed
//! here by reference resolution and the pipelines. Folio never fetches or
//! parses paper metadata itself.

use serde::{Deserialize, Serialize};

/// Immutable metadata for a single arXiv paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paper {
    /// arXiv identifier, e.g. `2401.12345v2`.
    pub id: String,
    /// Paper title.
    pub title: String,
    /// Direct PDF URL, when the feed provided one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    /// Author names in listing order.
    #[serde(default)]
    pub authors: Vec<String>,
    /// Subject categories, primary first.
    #[serde(default)]
    pub categories: Vec<String>,
}

impl Paper {
    /// Create a paper with just an id and title.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            pdf_url: None,
            authors: Vec::new(),
            categories: Vec::new(),
        }
    }

    /// Builder: set the PDF URL.
    #[must_use]
    pub fn with_pdf_url(mut self, url: impl Into<String>) -> Self {
        self.pdf_url = Some(url.into());
        self
    }
}
