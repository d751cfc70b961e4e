//! Consistency verification of generated scene images.
//!
//! The backend compares the scene image with its material references and
//! answers with a free-text report ending in a 0-100 score. The score is
//! recorded per material category and feeds pattern memory.

use regex_lite::Regex;
use serde::Serialize;
use std::sync::{Arc, LazyLock};
use vitrine_domain::{SceneId, VerificationScore};

use crate::infrastructure::ports::{
    ConsistencyRequest, FileStore, ProviderError, ProviderPort, ReferenceImage, SceneRepo,
};
use crate::use_cases::error::GenerationError;
use crate::use_cases::image::{material_references, mime_type_for};
use crate::use_cases::patterns::PatternMemory;

pub const CONSISTENCY_INSTRUCTIONS: &str = "Compare the first image, a generated product scene, \
with the reference images that follow. For each referenced material, check that colour, texture, \
pattern and proportions match the reference. List every deviation you find. Finish with a final \
line of the form 'Score: N/100' where 100 means every material is reproduced faithfully.";

static SCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)score\s*[:=]?\s*(\d{1,3})").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationOutcome {
    pub scene_id: SceneId,
    pub score: u8,
    pub report: String,
    pub categories: Vec<String>,
    /// Categories whose pattern store was fed by this verification
    pub patterns_recorded: usize,
}

pub struct VerifyScene {
    scenes: Arc<dyn SceneRepo>,
    files: Arc<dyn FileStore>,
    provider: Arc<dyn ProviderPort>,
    patterns: Arc<PatternMemory>,
}

impl VerifyScene {
    pub fn new(
        scenes: Arc<dyn SceneRepo>,
        files: Arc<dyn FileStore>,
        provider: Arc<dyn ProviderPort>,
        patterns: Arc<PatternMemory>,
    ) -> Self {
        Self {
            scenes,
            files,
            provider,
            patterns,
        }
    }

    pub async fn execute(&self, scene_id: SceneId) -> Result<VerificationOutcome, GenerationError> {
        let scene = self
            .scenes
            .get(scene_id)
            .await?
            .ok_or_else(|| GenerationError::not_found("Scene", scene_id))?;
        let image_path = scene
            .image_path
            .as_deref()
            .ok_or_else(|| GenerationError::validation("scene has no generated image to verify"))?;

        let generated =
            ReferenceImage::new(self.files.read(image_path).await?, mime_type_for(image_path));
        let references = material_references(self.files.as_ref(), &scene.materials).await;

        let report = self
            .provider
            .analyze_image_consistency(ConsistencyRequest {
                instructions: CONSISTENCY_INSTRUCTIONS.to_string(),
                generated,
                references,
            })
            .await?;

        let score = parse_score(&report).ok_or_else(|| {
            ProviderError::extraction(
                "consistency",
                "analyze_image_consistency",
                "report did not contain a score between 0 and 100",
            )
        })?;

        let prompt = scene.enriched_prompt.as_deref().unwrap_or_default();
        let categories = scene.categories();
        let mut patterns_recorded = 0;
        for category in &categories {
            if self
                .patterns
                .record_verification(category, prompt, score)
                .await?
                .is_some()
            {
                patterns_recorded += 1;
            }
        }

        tracing::info!(
            scene_id = %scene_id,
            score,
            categories = categories.len(),
            patterns_recorded,
            "Scene verified"
        );

        Ok(VerificationOutcome {
            scene_id,
            score,
            report,
            categories,
            patterns_recorded,
        })
    }
}

/// Last "score N" mention in the report, if it is a valid 0-100 score.
pub fn parse_score(report: &str) -> Option<u8> {
    let last = SCORE_RE.captures_iter(report).last()?;
    let value: u8 = last.get(1)?.as_str().parse().ok()?;
    VerificationScore::new(value).ok().map(|s| s.value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::persistence::InMemoryStore;
    use crate::infrastructure::ports::{MockProviderPort, ProviderErrorKind};
    use chrono::Utc;
    use vitrine_domain::{Material, Scene};

    struct Harness {
        store: Arc<InMemoryStore>,
        patterns: Arc<PatternMemory>,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let patterns = Arc::new(PatternMemory::new(
            store.clone(),
            store.clone(),
            Arc::new(FixedClock(Utc::now())),
        ));
        Harness { store, patterns }
    }

    fn verifier(h: &Harness, provider: MockProviderPort) -> VerifyScene {
        VerifyScene::new(h.store.clone(), h.store.clone(), Arc::new(provider), h.patterns.clone())
    }

    async fn generated_scene(store: &InMemoryStore) -> Scene {
        let mut scene = Scene::new("Lounge")
            .with_material(Material::new("Chair", "furniture").with_image("m/chair.png"))
            .with_material(Material::new("Throw", "textile"));
        scene.image_path = Some("images/lounge.png".to_string());
        scene.enriched_prompt = Some("oak chair beside a linen throw".to_string());
        SceneRepo::save(store, &scene).await.unwrap();
        FileStore::write(store, "images/lounge.png", b"img").await.unwrap();
        FileStore::write(store, "m/chair.png", b"chair").await.unwrap();
        scene
    }

    fn reporting(report: &'static str) -> MockProviderPort {
        let mut provider = MockProviderPort::new();
        provider
            .expect_analyze_image_consistency()
            .withf(|req| req.references.len() == 1 && req.generated.bytes == b"img")
            .returning(move |_| Ok(report.to_string()));
        provider
    }

    #[test]
    fn parses_last_score_mention() {
        assert_eq!(parse_score("Score: 87/100"), Some(87));
        assert_eq!(parse_score("colour score 40 ... final SCORE = 92"), Some(92));
        assert_eq!(parse_score("score: 150"), None);
        assert_eq!(parse_score("no rating here"), None);
    }

    #[tokio::test]
    async fn high_score_records_history_and_patterns() {
        let h = harness();
        let scene = generated_scene(&h.store).await;

        let outcome = verifier(&h, reporting("Chair matches.\nScore: 94/100"))
            .execute(scene.id)
            .await
            .unwrap();

        assert_eq!(outcome.score, 94);
        assert_eq!(outcome.categories, vec!["furniture", "textile"]);
        assert_eq!(outcome.patterns_recorded, 2);
        let best = h.patterns.best_for("textile", 1).await.unwrap();
        assert_eq!(best[0].snippet, "oak chair beside a linen throw");
    }

    #[tokio::test]
    async fn high_score_without_prompt_stores_no_empty_pattern() {
        let h = harness();
        let mut scene = generated_scene(&h.store).await;
        scene.enriched_prompt = None;
        SceneRepo::save(h.store.as_ref(), &scene).await.unwrap();

        let outcome = verifier(&h, reporting("Score: 96/100"))
            .execute(scene.id)
            .await
            .unwrap();

        assert_eq!(outcome.patterns_recorded, 0);
        assert!(h.patterns.best_for("furniture", 1).await.unwrap().is_empty());
        let injected = h
            .patterns
            .inject(&outcome.categories, "base prompt")
            .await
            .unwrap();
        assert_eq!(injected, "base prompt");
    }

    #[tokio::test]
    async fn low_score_only_feeds_history() {
        let h = harness();
        let scene = generated_scene(&h.store).await;

        let outcome = verifier(&h, reporting("Colours drift.\nScore: 55/100"))
            .execute(scene.id)
            .await
            .unwrap();

        assert_eq!(outcome.patterns_recorded, 0);
        let problematic = h.patterns.problematic_categories(70.0).await.unwrap();
        assert_eq!(problematic.len(), 2);
    }

    #[tokio::test]
    async fn report_without_score_is_extraction_error() {
        let h = harness();
        let scene = generated_scene(&h.store).await;

        let err = verifier(&h, reporting("Looks fine."))
            .execute(scene.id)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GenerationError::Provider(ref e) if e.kind == ProviderErrorKind::Extraction
        ));
    }

    #[tokio::test]
    async fn scene_without_image_is_rejected() {
        let h = harness();
        let scene = Scene::new("Blank");
        SceneRepo::save(h.store.as_ref(), &scene).await.unwrap();

        let err = verifier(&h, MockProviderPort::new())
            .execute(scene.id)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Validation(_)));
    }
}
