//! Pattern memory: prompt fragments from highly rated generations are kept
//! per material category and fed back into later prompts.

use std::collections::HashSet;
use std::sync::Arc;

use vitrine_domain::{
    CategoryScore, SuccessfulPattern, VerificationRecord, VerificationScore,
};

use crate::infrastructure::ports::{ClockPort, PatternRepo, VerificationRepo};
use crate::use_cases::error::GenerationError;

pub const LEARNED_PATTERNS_HEADER: &str = "--- LEARNED SUCCESSFUL PATTERNS ---";
pub const LEARNED_PATTERNS_FOOTER: &str = "--- END LEARNED PATTERNS ---";

pub struct PatternMemory {
    patterns: Arc<dyn PatternRepo>,
    verifications: Arc<dyn VerificationRepo>,
    clock: Arc<dyn ClockPort>,
}

impl PatternMemory {
    pub fn new(
        patterns: Arc<dyn PatternRepo>,
        verifications: Arc<dyn VerificationRepo>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            patterns,
            verifications,
            clock,
        }
    }

    /// Store the prompt as a pattern when the score qualifies.
    ///
    /// Returns the resulting usage count, or `None` when the score is below
    /// the threshold and nothing was written.
    pub async fn record(
        &self,
        category: &str,
        enriched_prompt: &str,
        score: u8,
    ) -> Result<Option<u32>, GenerationError> {
        let score = VerificationScore::new(score)?;
        if !score.qualifies_as_pattern() {
            return Ok(None);
        }
        if category.trim().is_empty() {
            return Err(GenerationError::validation("category must not be empty"));
        }
        if enriched_prompt.trim().is_empty() {
            tracing::debug!(category = %category, "No prompt to learn from, skipping pattern");
            return Ok(None);
        }

        let pattern = SuccessfulPattern::new(category, enriched_prompt, score, self.clock.now());
        let usage_count = self.patterns.upsert(&pattern).await?;
        tracing::debug!(
            category = %category,
            score = score.value(),
            usage_count,
            "Recorded successful pattern"
        );
        Ok(Some(usage_count))
    }

    pub async fn best_for(
        &self,
        category: &str,
        limit: usize,
    ) -> Result<Vec<SuccessfulPattern>, GenerationError> {
        Ok(self.patterns.top_for_category(category, limit).await?)
    }

    /// Append the best pattern of each distinct category to `base_prompt`.
    pub async fn inject(
        &self,
        categories: &[String],
        base_prompt: &str,
    ) -> Result<String, GenerationError> {
        let mut seen = HashSet::new();
        let mut learned = Vec::new();
        for category in categories {
            if !seen.insert(category.as_str()) {
                continue;
            }
            if let Some(best) = self.best_for(category, 1).await?.into_iter().next() {
                learned.push(best);
            }
        }

        if learned.is_empty() {
            return Ok(base_prompt.to_string());
        }

        let mut prompt = String::from(base_prompt);
        prompt.push_str("\n\n");
        prompt.push_str(LEARNED_PATTERNS_HEADER);
        for pattern in &learned {
            prompt.push_str(&format!(
                "\n[{}] score {}/100, used {} times: {}",
                pattern.category,
                pattern.score.value(),
                pattern.usage_count,
                pattern.excerpt()
            ));
        }
        prompt.push('\n');
        prompt.push_str(LEARNED_PATTERNS_FOOTER);
        Ok(prompt)
    }

    /// Categories whose average verification score is below `min_score`.
    pub async fn problematic_categories(
        &self,
        min_score: f64,
    ) -> Result<Vec<CategoryScore>, GenerationError> {
        let averages = self.verifications.category_averages().await?;
        Ok(averages
            .into_iter()
            .filter(|c| c.average_score < min_score)
            .collect())
    }

    pub async fn cleanup(
        &self,
        min_usage_count: u32,
        min_score: u8,
    ) -> Result<u64, GenerationError> {
        let deleted = self
            .patterns
            .delete_prunable(min_usage_count, min_score)
            .await?;
        if deleted > 0 {
            tracing::info!(deleted, min_usage_count, min_score, "Pruned stale patterns");
        }
        Ok(deleted)
    }

    /// Write verification history for the category and feed the pattern
    /// store with the prompt that produced it.
    pub async fn record_verification(
        &self,
        category: &str,
        enriched_prompt: &str,
        score: u8,
    ) -> Result<Option<u32>, GenerationError> {
        let verified = VerificationScore::new(score)?;
        let record = VerificationRecord {
            category: category.to_string(),
            score: verified,
            recorded_at: self.clock.now(),
        };
        self.verifications.record(&record).await?;
        self.record(category, enriched_prompt, score).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::persistence::InMemoryStore;
    use crate::infrastructure::ports::{MockPatternRepo, MockVerificationRepo};
    use chrono::Utc;

    fn memory_over(store: Arc<InMemoryStore>) -> PatternMemory {
        PatternMemory::new(store.clone(), store, Arc::new(FixedClock(Utc::now())))
    }

    #[tokio::test]
    async fn score_below_threshold_never_writes() {
        let mut patterns = MockPatternRepo::new();
        patterns.expect_upsert().never();
        let memory = PatternMemory::new(
            Arc::new(patterns),
            Arc::new(MockVerificationRepo::new()),
            Arc::new(FixedClock(Utc::now())),
        );

        assert_eq!(memory.record("textile", "prompt", 89).await.unwrap(), None);
    }

    #[tokio::test]
    async fn blank_prompt_is_not_learned() {
        let mut patterns = MockPatternRepo::new();
        patterns.expect_upsert().never();
        let memory = PatternMemory::new(
            Arc::new(patterns),
            Arc::new(MockVerificationRepo::new()),
            Arc::new(FixedClock(Utc::now())),
        );

        assert_eq!(memory.record("textile", "  ", 95).await.unwrap(), None);
    }

    #[tokio::test]
    async fn identical_prompt_bumps_usage_instead_of_duplicating() {
        let store = Arc::new(InMemoryStore::new());
        let memory = memory_over(store);

        assert_eq!(memory.record("textile", "linen weave", 90).await.unwrap(), Some(1));
        assert_eq!(memory.record("textile", "linen weave", 90).await.unwrap(), Some(2));

        let best = memory.best_for("textile", 10).await.unwrap();
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].usage_count, 2);
    }

    #[tokio::test]
    async fn score_above_hundred_is_rejected() {
        let memory = memory_over(Arc::new(InMemoryStore::new()));
        let err = memory.record("textile", "prompt", 101).await.unwrap_err();
        assert!(matches!(err, GenerationError::Validation(_)));
    }

    #[tokio::test]
    async fn inject_without_patterns_returns_base_prompt() {
        let memory = memory_over(Arc::new(InMemoryStore::new()));
        let prompt = memory
            .inject(&["wood".to_string()], "base prompt")
            .await
            .unwrap();
        assert_eq!(prompt, "base prompt");
    }

    #[tokio::test]
    async fn inject_appends_one_pattern_per_distinct_category() {
        let memory = memory_over(Arc::new(InMemoryStore::new()));
        memory.record("wood", "oak grain close-up", 95).await.unwrap();
        memory.record("wood", "walnut veneer", 92).await.unwrap();
        memory.record("stone", "honed marble", 91).await.unwrap();

        let categories = vec!["wood".to_string(), "stone".to_string(), "wood".to_string()];
        let prompt = memory.inject(&categories, "base").await.unwrap();

        assert!(prompt.starts_with("base\n\n--- LEARNED SUCCESSFUL PATTERNS ---"));
        assert!(prompt.contains("[wood] score 95/100, used 1 times: oak grain close-up"));
        assert!(prompt.contains("[stone] score 91/100"));
        assert!(!prompt.contains("walnut"));
        assert!(prompt.ends_with(LEARNED_PATTERNS_FOOTER));
    }

    #[tokio::test]
    async fn injected_excerpt_is_truncated() {
        let memory = memory_over(Arc::new(InMemoryStore::new()));
        let long_prompt = "x".repeat(600);
        memory.record("wood", &long_prompt, 99).await.unwrap();

        let prompt = memory.inject(&["wood".to_string()], "").await.unwrap();
        let line = prompt.lines().find(|l| l.starts_with("[wood]")).unwrap();
        let excerpt = line.rsplit(": ").next().unwrap();
        assert_eq!(excerpt.chars().count(), 200);
    }

    #[tokio::test]
    async fn problematic_categories_filters_on_average() {
        let memory = memory_over(Arc::new(InMemoryStore::new()));
        memory.record_verification("wood", "p", 60).await.unwrap();
        memory.record_verification("wood", "p", 70).await.unwrap();
        memory.record_verification("stone", "p", 95).await.unwrap();

        let problematic = memory.problematic_categories(80.0).await.unwrap();
        assert_eq!(problematic.len(), 1);
        assert_eq!(problematic[0].category, "wood");
        assert_eq!(problematic[0].samples, 2);
    }

    #[tokio::test]
    async fn record_verification_feeds_patterns_only_when_qualifying() {
        let memory = memory_over(Arc::new(InMemoryStore::new()));
        assert_eq!(memory.record_verification("wood", "low", 50).await.unwrap(), None);
        assert_eq!(memory.record_verification("wood", "high", 97).await.unwrap(), Some(1));
        assert_eq!(memory.best_for("wood", 5).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cleanup_delegates_to_store() {
        let mut patterns = MockPatternRepo::new();
        patterns
            .expect_delete_prunable()
            .withf(|usage, score| *usage == 3 && *score == 95)
            .returning(|_, _| Ok(4));
        let memory = PatternMemory::new(
            Arc::new(patterns),
            Arc::new(MockVerificationRepo::new()),
            Arc::new(FixedClock(Utc::now())),
        );

        assert_eq!(memory.cleanup(3, 95).await.unwrap(), 4);
    }
}
