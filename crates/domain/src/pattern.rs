//! Learned prompt patterns and verification scores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::PatternId;

/// Scores at or above this value become learned patterns.
pub const PATTERN_SCORE_THRESHOLD: u8 = 90;
/// Characters of the enriched prompt kept as a pattern snippet.
pub const SNIPPET_CHARS: usize = 500;
/// Characters of a snippet shown when injecting patterns into a prompt.
pub const EXCERPT_CHARS: usize = 200;

/// Verification score in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct VerificationScore(u8);

impl VerificationScore {
    pub const MAX: u8 = 100;

    pub fn new(value: u8) -> Result<Self, DomainError> {
        if value > Self::MAX {
            return Err(DomainError::validation(format!(
                "Verification score must be between 0 and 100, got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn qualifies_as_pattern(&self) -> bool {
        self.0 >= PATTERN_SCORE_THRESHOLD
    }
}

impl TryFrom<u8> for VerificationScore {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VerificationScore> for u8 {
    fn from(score: VerificationScore) -> Self {
        score.0
    }
}

/// First `max_chars` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// A prompt fragment that produced a highly rated generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessfulPattern {
    pub id: PatternId,
    pub category: String,
    pub snippet: String,
    pub score: VerificationScore,
    pub usage_count: u32,
    pub created_at: DateTime<Utc>,
}

impl SuccessfulPattern {
    pub fn new(
        category: impl Into<String>,
        enriched_prompt: &str,
        score: VerificationScore,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PatternId::new(),
            category: category.into(),
            snippet: Self::snippet_of(enriched_prompt).to_string(),
            score,
            usage_count: 1,
            created_at: now,
        }
    }

    pub fn snippet_of(enriched_prompt: &str) -> &str {
        truncate_chars(enriched_prompt, SNIPPET_CHARS)
    }

    pub fn excerpt(&self) -> &str {
        truncate_chars(&self.snippet, EXCERPT_CHARS)
    }

    /// Patterns that are both rarely reused and below `min_score` get pruned.
    pub fn is_prunable(&self, min_usage_count: u32, min_score: u8) -> bool {
        self.usage_count < min_usage_count && self.score.value() < min_score
    }
}

/// One verification outcome for a material category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub category: String,
    pub score: VerificationScore,
    pub recorded_at: DateTime<Utc>,
}

/// Average historical score of a material category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: String,
    pub average_score: f64,
    pub samples: u32,
}
