extern crate self as vitrine_domain;

pub mod error;
pub mod ids;
pub mod job;
pub mod layout;
pub mod motif;
pub mod pattern;
pub mod scene;

pub use error::DomainError;

pub use ids::{JobId, MaterialId, PatternId, SceneId};

pub use job::{
    estimate_video_cost, GenerationJob, JobKind, JobStatus, VideoJobPhase, VIDEO_COST_PER_SECOND,
};

pub use layout::{default_layout, fit_within, NormalizedSlot, PixelSlot, DEFAULT_LAYOUT};

pub use motif::MotifDisplayMode;

pub use pattern::{
    truncate_chars, CategoryScore, SuccessfulPattern, VerificationRecord, VerificationScore,
    EXCERPT_CHARS, PATTERN_SCORE_THRESHOLD, SNIPPET_CHARS,
};

pub use scene::{ArtifactStatus, Material, MaterialProperty, Scene, VisualStyle};
