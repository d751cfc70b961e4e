//! Scene image generation.
//!
//! Builds the image prompt from style, user text, materials, motif display
//! mode and learned patterns, attaches material references and stores the
//! generated (optionally composited) image under the scene's artifact path.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vitrine_domain::{ArtifactStatus, Material, NormalizedSlot, Scene, SceneId, VisualStyle};

use crate::infrastructure::ports::{
    FileStore, ImageGenerationRequest, ProviderPort, ReferenceImage, SceneRepo,
    MAX_REFERENCE_IMAGES,
};
use crate::use_cases::compositing::{Compositor, MotifClassifier};
use crate::use_cases::error::GenerationError;
use crate::use_cases::patterns::PatternMemory;
use crate::use_cases::prompt::PromptComposer;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageRequest {
    #[serde(default)]
    pub style: VisualStyle,
    #[serde(default)]
    pub user_prompt: Option<String>,
    /// Send the current scene image as the source to refine
    #[serde(default)]
    pub refine: bool,
    #[serde(default)]
    pub composite_motifs: bool,
    #[serde(default)]
    pub layout: Option<Vec<NormalizedSlot>>,
    #[serde(default)]
    pub edge_blend: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneImage {
    pub scene_id: SceneId,
    pub image_path: String,
    pub mime_type: String,
    pub prompt: String,
    pub cost: f64,
    pub placed_motifs: usize,
}

pub struct GenerateSceneImage {
    scenes: Arc<dyn SceneRepo>,
    files: Arc<dyn FileStore>,
    provider: Arc<dyn ProviderPort>,
    patterns: Arc<PatternMemory>,
    classifier: Arc<MotifClassifier>,
    compositor: Arc<Compositor>,
}

impl GenerateSceneImage {
    pub fn new(
        scenes: Arc<dyn SceneRepo>,
        files: Arc<dyn FileStore>,
        provider: Arc<dyn ProviderPort>,
        patterns: Arc<PatternMemory>,
        classifier: Arc<MotifClassifier>,
        compositor: Arc<Compositor>,
    ) -> Self {
        Self {
            scenes,
            files,
            provider,
            patterns,
            classifier,
            compositor,
        }
    }

    pub async fn execute(
        &self,
        scene_id: SceneId,
        request: ImageRequest,
    ) -> Result<SceneImage, GenerationError> {
        let scene = self
            .scenes
            .get(scene_id)
            .await?
            .ok_or_else(|| GenerationError::not_found("Scene", scene_id))?;

        self.scenes
            .update_image_state(scene_id, ArtifactStatus::Generating, None)
            .await?;

        match self.generate(&scene, &request).await {
            Ok(image) => Ok(image),
            Err(e) => {
                tracing::error!(scene_id = %scene_id, error = %e, "Scene image generation failed");
                if let Err(store_err) = self
                    .scenes
                    .update_image_state(scene_id, ArtifactStatus::Failed, None)
                    .await
                {
                    tracing::error!(
                        scene_id = %scene_id,
                        error = %store_err,
                        "Failed to persist scene image failure"
                    );
                }
                Err(e)
            }
        }
    }

    async fn generate(
        &self,
        scene: &Scene,
        request: &ImageRequest,
    ) -> Result<SceneImage, GenerationError> {
        let motif_paths = scene.motif_paths();
        let display_mode = if motif_paths.is_empty() {
            None
        } else {
            Some(self.classifier.classify_any(&motif_paths).await)
        };

        let composed = PromptComposer::compose_image_prompt(
            request.style,
            request.user_prompt.as_deref(),
            &scene.materials,
            display_mode,
        );
        let prompt = match self.patterns.inject(&scene.categories(), &composed).await {
            Ok(prompt) => prompt,
            Err(e) => {
                tracing::warn!(scene_id = %scene.id, error = %e, "Pattern injection failed");
                composed
            }
        };

        let source_image = if request.refine {
            let path = scene.image_path.as_deref().ok_or_else(|| {
                GenerationError::validation("scene has no image to refine")
            })?;
            Some(ReferenceImage::new(self.files.read(path).await?, mime_type_for(path)))
        } else {
            None
        };

        let generated = self
            .provider
            .generate_image(ImageGenerationRequest {
                prompt: prompt.clone(),
                source_image,
                references: material_references(self.files.as_ref(), &scene.materials).await,
            })
            .await?;

        let (bytes, mime_type, placed_motifs) =
            if request.composite_motifs && !motif_paths.is_empty() {
                let output = self
                    .compositor
                    .composite(
                        &generated.bytes,
                        &motif_paths,
                        request.layout.as_deref(),
                        request.edge_blend,
                    )
                    .await?;
                (output.image, output.mime_type, output.placed)
            } else {
                (generated.bytes, generated.mime_type, 0)
            };

        let image_path = Scene::image_artifact_path(scene.id, extension_for(&mime_type));
        self.files.write(&image_path, &bytes).await?;
        self.scenes.set_enriched_prompt(scene.id, &prompt).await?;
        self.scenes
            .update_image_state(scene.id, ArtifactStatus::Done, Some(image_path.clone()))
            .await?;

        tracing::info!(
            scene_id = %scene.id,
            image_path = %image_path,
            cost = generated.cost,
            placed_motifs,
            "Scene image generated"
        );

        Ok(SceneImage {
            scene_id: scene.id,
            image_path,
            mime_type,
            prompt,
            cost: generated.cost,
            placed_motifs,
        })
    }
}

/// Reference images for materials that carry one, capped at the backend
/// limit. Motif materials are flagged for verbatim reproduction. Unreadable
/// images are skipped.
pub(crate) async fn material_references(
    files: &dyn FileStore,
    materials: &[Material],
) -> Vec<ReferenceImage> {
    let mut references = Vec::new();
    for material in materials {
        if references.len() >= MAX_REFERENCE_IMAGES {
            break;
        }
        let Some(path) = material.image_path.as_deref() else {
            continue;
        };
        match files.read(path).await {
            Ok(bytes) => {
                let mut reference =
                    ReferenceImage::new(bytes, mime_type_for(path)).with_label(&material.name);
                if material.is_motif {
                    reference = reference.verbatim();
                }
                references.push(reference);
            }
            Err(e) => {
                tracing::warn!(
                    material = %material.name,
                    path = %path,
                    error = %e,
                    "Skipping unreadable material reference"
                );
            }
        }
    }
    references
}

/// MIME type guessed from a file extension, PNG when unknown.
pub fn mime_type_for(path: &str) -> &'static str {
    let extension = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        _ => "image/png",
    }
}

pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::dryrun::DryrunProvider;
    use crate::infrastructure::persistence::InMemoryStore;
    use crate::infrastructure::ports::{GeneratedImage, MockProviderPort, ProviderError};
    use crate::use_cases::compositing::fixtures::png;
    use crate::use_cases::patterns::LEARNED_PATTERNS_HEADER;
    use chrono::Utc;

    fn use_case(store: Arc<InMemoryStore>, provider: Arc<dyn ProviderPort>) -> GenerateSceneImage {
        let patterns = Arc::new(PatternMemory::new(
            store.clone(),
            store.clone(),
            Arc::new(FixedClock(Utc::now())),
        ));
        GenerateSceneImage::new(
            store.clone(),
            store.clone(),
            provider,
            patterns,
            Arc::new(MotifClassifier::new(store.clone())),
            Arc::new(Compositor::new(store)),
        )
    }

    async fn scene_with_materials(store: &InMemoryStore) -> Scene {
        FileStore::write(store, "materials/rug.png", &png(20, 20, [200, 10, 10, 255]))
            .await
            .unwrap();
        FileStore::write(store, "motifs/logo.png", &png(30, 20, [10, 10, 200, 255]))
            .await
            .unwrap();
        let scene = Scene::new("Showroom")
            .with_material(Material::new("Rug", "textile").with_image("materials/rug.png"))
            .with_material(
                Material::new("Logo", "print")
                    .with_image("motifs/logo.png")
                    .as_motif(),
            )
            .with_material(Material::new("Lamp", "lighting").with_image("materials/missing.png"));
        SceneRepo::save(store, &scene).await.unwrap();
        scene
    }

    #[test]
    fn mime_and_extension_mapping() {
        assert_eq!(mime_type_for("a/b.JPG"), "image/jpeg");
        assert_eq!(mime_type_for("a/b"), "image/png");
        assert_eq!(extension_for("image/webp"), "webp");
        assert_eq!(extension_for("application/octet-stream"), "png");
    }

    #[tokio::test]
    async fn sends_flagged_references_and_stores_result() {
        let store = Arc::new(InMemoryStore::new());
        let scene = scene_with_materials(&store).await;

        let mut provider = MockProviderPort::new();
        provider
            .expect_generate_image()
            .withf(|req| {
                req.source_image.is_none()
                    && req.references.len() == 2
                    && !req.references[0].verbatim
                    && req.references[0].label.as_deref() == Some("Rug")
                    && req.references[1].verbatim
                    && req.prompt.contains("Motif display")
            })
            .times(1)
            .returning(|_| {
                Ok(GeneratedImage {
                    bytes: b"jpeg-bytes".to_vec(),
                    mime_type: "image/jpeg".to_string(),
                    cost: 0.039,
                })
            });

        let result = use_case(store.clone(), Arc::new(provider))
            .execute(scene.id, ImageRequest::default())
            .await
            .unwrap();

        assert_eq!(result.image_path, format!("images/scene_{}.jpg", scene.id));
        assert_eq!(result.placed_motifs, 0);
        let stored = SceneRepo::get(store.as_ref(), scene.id).await.unwrap().unwrap();
        assert_eq!(stored.image_status, ArtifactStatus::Done);
        assert_eq!(stored.image_path.as_deref(), Some(result.image_path.as_str()));
        assert_eq!(stored.enriched_prompt.as_deref(), Some(result.prompt.as_str()));
        assert_eq!(
            FileStore::read(store.as_ref(), &result.image_path).await.unwrap(),
            b"jpeg-bytes"
        );
    }

    #[tokio::test]
    async fn learned_patterns_are_injected() {
        let store = Arc::new(InMemoryStore::new());
        let scene = scene_with_materials(&store).await;
        let uc = use_case(store.clone(), Arc::new(DryrunProvider::new()));
        uc.patterns.record("textile", "soft window light on wool", 96).await.unwrap();

        let result = uc.execute(scene.id, ImageRequest::default()).await.unwrap();

        assert!(result.prompt.contains(LEARNED_PATTERNS_HEADER));
        assert!(result.prompt.contains("soft window light on wool"));
    }

    #[tokio::test]
    async fn composites_motifs_onto_generated_image() {
        let store = Arc::new(InMemoryStore::new());
        let scene = scene_with_materials(&store).await;
        let request = ImageRequest {
            composite_motifs: true,
            ..ImageRequest::default()
        };

        let result = use_case(store, Arc::new(DryrunProvider::new()))
            .execute(scene.id, request)
            .await
            .unwrap();

        assert_eq!(result.placed_motifs, 1);
        assert_eq!(result.mime_type, "image/png");
    }

    #[tokio::test]
    async fn refine_without_image_fails_scene() {
        let store = Arc::new(InMemoryStore::new());
        let scene = scene_with_materials(&store).await;
        let request = ImageRequest {
            refine: true,
            ..ImageRequest::default()
        };

        let err = use_case(store.clone(), Arc::new(MockProviderPort::new()))
            .execute(scene.id, request)
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Validation(_)));
        let stored = SceneRepo::get(store.as_ref(), scene.id).await.unwrap().unwrap();
        assert_eq!(stored.image_status, ArtifactStatus::Failed);
    }

    #[tokio::test]
    async fn provider_failure_marks_scene_failed() {
        let store = Arc::new(InMemoryStore::new());
        let scene = scene_with_materials(&store).await;
        let mut provider = MockProviderPort::new();
        provider.expect_generate_image().returning(|_| {
            Err(ProviderError::safety_blocked(
                "mock",
                "generate_image",
                "Generation blocked by safety filter",
            ))
        });

        let err = use_case(store.clone(), Arc::new(provider))
            .execute(scene.id, ImageRequest::default())
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Provider(ref e) if e.status == 451));
        let stored = SceneRepo::get(store.as_ref(), scene.id).await.unwrap().unwrap();
        assert_eq!(stored.image_status, ArtifactStatus::Failed);
    }

    #[tokio::test]
    async fn unknown_scene_is_not_found() {
        let err = use_case(Arc::new(InMemoryStore::new()), Arc::new(MockProviderPort::new()))
            .execute(SceneId::new(), ImageRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::NotFound { .. }));
    }
}
