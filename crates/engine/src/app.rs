//! Application state and composition.

use std::sync::Arc;

use crate::infrastructure::{
    clock::SystemClock,
    persistence::InMemoryStore,
    ports::{
        ClockPort, FileStore, JobRepo, PatternRepo, ProviderPort, SceneRepo, SettingsRepo,
        VerificationRepo,
    },
    provider_gateway::ProviderGateway,
};
use crate::use_cases::{
    Compositor, GenerateSceneImage, MotifClassifier, PatternMemory, PollSchedule, PromptComposer,
    VerifyScene, VideoJobs,
};

/// Main application state.
///
/// Holds all repositories and use cases.
/// Passed to HTTP handlers via Axum state.
pub struct App {
    pub repositories: Repositories,
    pub use_cases: UseCases,
    /// Runtime provider selection, consulted for settings reads
    pub gateway: Arc<ProviderGateway>,
}

/// Container for all port implementations.
pub struct Repositories {
    pub scene: Arc<dyn SceneRepo>,
    pub job: Arc<dyn JobRepo>,
    pub pattern: Arc<dyn PatternRepo>,
    pub verification: Arc<dyn VerificationRepo>,
    pub settings: Arc<dyn SettingsRepo>,
    pub files: Arc<dyn FileStore>,
}

/// Container for all use cases.
pub struct UseCases {
    pub video: VideoJobs,
    pub image: GenerateSceneImage,
    pub verify: VerifyScene,
    pub patterns: Arc<PatternMemory>,
    pub compositor: Arc<Compositor>,
    pub classifier: Arc<MotifClassifier>,
}

impl App {
    /// Wire every use case over the given ports.
    ///
    /// `provider` is what the use cases call; in production it is the
    /// gateway wrapped in the retry layer.
    pub fn new(
        repositories: Repositories,
        gateway: Arc<ProviderGateway>,
        provider: Arc<dyn ProviderPort>,
        clock: Arc<dyn ClockPort>,
        schedule: PollSchedule,
    ) -> Self {
        let composer = Arc::new(PromptComposer::new(provider.clone()));
        let patterns = Arc::new(PatternMemory::new(
            repositories.pattern.clone(),
            repositories.verification.clone(),
            clock.clone(),
        ));
        let compositor = Arc::new(Compositor::new(repositories.files.clone()));
        let classifier = Arc::new(MotifClassifier::new(repositories.files.clone()));

        let video = VideoJobs::new(
            repositories.scene.clone(),
            repositories.job.clone(),
            repositories.files.clone(),
            provider.clone(),
            composer,
            clock,
            schedule,
        );
        let image = GenerateSceneImage::new(
            repositories.scene.clone(),
            repositories.files.clone(),
            provider.clone(),
            patterns.clone(),
            classifier.clone(),
            compositor.clone(),
        );
        let verify = VerifyScene::new(
            repositories.scene.clone(),
            repositories.files.clone(),
            provider,
            patterns.clone(),
        );

        Self {
            repositories,
            use_cases: UseCases {
                video,
                image,
                verify,
                patterns,
                compositor,
                classifier,
            },
            gateway,
        }
    }

    /// Fully in-memory application over the given provider. Nothing touches
    /// disk; used by tests and ephemeral runs.
    pub fn in_memory(provider: Arc<dyn ProviderPort>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(ProviderGateway::new(store.clone(), Default::default()));
        let repositories = Repositories {
            scene: store.clone(),
            job: store.clone(),
            pattern: store.clone(),
            verification: store.clone(),
            settings: store.clone(),
            files: store,
        };
        Self::new(
            repositories,
            gateway,
            provider,
            Arc::new(SystemClock::new()),
            PollSchedule::default(),
        )
    }
}
