//! Use cases - generation workflows.
//!
//! Each module orchestrates ports to fulfil one part of the scene pipeline:
//! prompt building, pattern memory, video jobs, compositing, image
//! generation and verification.

pub mod compositing;
pub mod error;
pub mod image;
pub mod patterns;
pub mod prompt;
pub mod verification;
pub mod video;

pub use compositing::{CompositeOutput, Compositor, MotifClassifier};
pub use error::GenerationError;
pub use image::{GenerateSceneImage, ImageRequest, SceneImage};
pub use patterns::PatternMemory;
pub use prompt::PromptComposer;
pub use verification::{VerificationOutcome, VerifyScene};
pub use video::{PollSchedule, VideoAck, VideoJobs, VideoRequest};
