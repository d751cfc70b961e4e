//! Port traits for infrastructure boundaries.
//!
//! Ports exist for:
//! - The generative backend (could swap Gemini -> other)
//! - Persistence (could swap SQLite -> Postgres)
//! - File storage (could swap local disk -> object storage)
//! - Clock (for testing)

mod error;
mod external;
mod repos;
mod testing;

// =============================================================================
// Repository Ports
// =============================================================================
pub use repos::{FileStore, JobRepo, PatternRepo, SceneRepo, SettingsRepo, VerificationRepo};

// =============================================================================
// External Service Ports
// =============================================================================
pub use external::{
    ConsistencyRequest, GeneratedImage, ImageGenerationRequest, OperationHandle, ProviderPort,
    ReferenceImage, VideoGenerationRequest, VideoOperation, MAX_REFERENCE_IMAGES,
};

// =============================================================================
// Test-Only Mocks (only available during test builds)
// =============================================================================
#[cfg(test)]
pub use repos::{
    MockFileStore, MockJobRepo, MockPatternRepo, MockSceneRepo, MockSettingsRepo,
    MockVerificationRepo,
};

#[cfg(test)]
pub use external::MockProviderPort;

#[cfg(test)]
pub use testing::MockClockPort;

// =============================================================================
// Testing Ports
// =============================================================================
pub use testing::ClockPort;

// =============================================================================
// Error Types
// =============================================================================
pub use error::{
    classify_status, ProviderError, ProviderErrorKind, RepoError, StorageError,
    STATUS_BAD_GATEWAY, STATUS_RATE_LIMITED, STATUS_SAFETY_BLOCKED, STATUS_TIMEOUT,
};
