//! What a turn hands back to the presentation layer.

use parley_core::types::{Citation, Message, Role};

/// A successful turn: the reply text plus the citations for this turn only.
///
/// The reply is also appended to the transcript; the citations are not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    pub reply: String,
    pub citations: Vec<Citation>,
}

impl TurnReply {
    pub fn has_citations(&self) -> bool {
        !self.citations.is_empty()
    }

    /// Citation panel markdown, or `None` when there is nothing to show.
    pub fn citation_panel(&self) -> Option<String> {
        self.has_citations()
            .then(|| format_citations(&self.citations))
    }
}

/// Render citations as a 1-indexed markdown list.
pub fn format_citations(citations: &[Citation]) -> String {
    citations
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "**{}. {} - page {}:**\n{}",
                i + 1,
                c.document_name,
                c.page_number,
                c.excerpt
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Text blocks of the transcript in order, as `(role, text)` pairs.
///
/// Image messages carry no text and so do not show up on re-render.
pub fn visible_transcript(history: &[Message]) -> Vec<(Role, &str)> {
    history
        .iter()
        .flat_map(|m| m.texts().map(move |t| (m.role, t)))
        .collect()
}
