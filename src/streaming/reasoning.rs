//! Reasoning-trace heuristic
//!
//! Best-effort classification of chat deltas as "reasoning". Three rules are
//! evaluated per delta, in this order, and every rule that fires contributes:
//!
//! 1. the backend tagged the delta explicitly (`message.reasoning`, or
//!    `message.thinking` on newer servers);
//! 2. the content contains `thinking:`; the text after it up to the next
//!    line break is taken;
//! 3. the content contains one of [`DISCOURSE_MARKERS`]; the whole content
//!    is taken.
//!
//! Classification never removes text from the answer. False positives and
//! negatives are expected; the trigger strings must stay exactly as they are
//! for compatibility with existing consumers. Rules 1 and 2 can both fire on
//! the same text and there is no dedup between them.

use std::sync::LazyLock;

use regex::Regex;

/// Phrases that mark a whole delta as reasoning.
pub const DISCOURSE_MARKERS: [&str; 3] = ["Let me think", "I need to", "First,"];

/// Inline marker; matched case-sensitively before extraction.
pub const INLINE_MARKER: &str = "thinking:";

static INLINE_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)thinking:([^\r\n]*)").ok());

/// Which rule produced a contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningSource {
    Explicit,
    InlineMarker,
    Discourse,
}

/// Text a rule adds to the reasoning buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasoningContribution {
    pub source: ReasoningSource,
    pub text: String,
}

impl ReasoningContribution {
    /// Separator appended after the text in the buffer.
    pub fn separator(&self) -> &'static str {
        match self.source {
            ReasoningSource::Explicit => "",
            ReasoningSource::InlineMarker => "\n",
            ReasoningSource::Discourse => " ",
        }
    }
}

/// Text after `thinking:` up to the next line break, trimmed.
pub fn extract_inline(content: &str) -> Option<String> {
    if !content.contains(INLINE_MARKER) {
        return None;
    }
    let captures = INLINE_PATTERN.as_ref()?.captures(content)?;
    let captured = captures.get(1)?.as_str().trim();
    if captured.is_empty() {
        None
    } else {
        Some(captured.to_string())
    }
}

pub fn has_discourse_marker(content: &str) -> bool {
    DISCOURSE_MARKERS.iter().any(|m| content.contains(m))
}

/// Run all rules against one delta.
pub fn classify(explicit: Option<&str>, content: Option<&str>) -> Vec<ReasoningContribution> {
    let mut out = Vec::new();

    if let Some(text) = explicit.filter(|t| !t.is_empty()) {
        out.push(ReasoningContribution {
            source: ReasoningSource::Explicit,
            text: text.to_string(),
        });
    }

    if let Some(content) = content.filter(|c| !c.is_empty()) {
        if let Some(text) = extract_inline(content) {
            out.push(ReasoningContribution {
                source: ReasoningSource::InlineMarker,
                text,
            });
        }
        if has_discourse_marker(content) {
            out.push(ReasoningContribution {
                source: ReasoningSource::Discourse,
                text: content.to_string(),
            });
        }
    }

    out
}

/// Running reasoning text for one chat turn.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReasoningBuffer {
    text: String,
}

impl ReasoningBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a delta and append what it contributes. Returns the text
    /// added, or `None` when nothing fired.
    pub fn observe(&mut self, explicit: Option<&str>, content: Option<&str>) -> Option<String> {
        let contributions = classify(explicit, content);
        if contributions.is_empty() {
            return None;
        }
        let mut added = String::new();
        for c in &contributions {
            added.push_str(&c.text);
            added.push_str(c.separator());
        }
        self.text.push_str(&added);
        Some(added)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}
