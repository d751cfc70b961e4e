//! Asynchronous generation jobs.
//!
//! A [`GenerationJob`] tracks one video-generation attempt for a scene from
//! the moment it is accepted until the backend operation resolves. The
//! persisted status keeps the four values stored by the job store; the finer
//! polling phase is derived through [`GenerationJob::phase`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{JobId, SceneId};

/// Display-only price per second of generated video.
pub const VIDEO_COST_PER_SECOND: f64 = 0.75;

/// Estimated cost of a video of the given length.
pub fn estimate_video_cost(duration_seconds: u32) -> f64 {
    f64::from(duration_seconds) * VIDEO_COST_PER_SECOND
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Video,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Video => write!(f, "video"),
        }
    }
}

impl FromStr for JobKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "video" => Ok(JobKind::Video),
            other => Err(DomainError::parse(format!("Unknown job kind: {other}"))),
        }
    }
}

/// Persisted job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Check if this is a terminal state (no further transitions expected)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DomainError::parse(format!("Unknown job status: {other}"))),
        }
    }
}

/// Lifecycle phase of a video job as seen by the polling state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoJobPhase {
    /// Accepted, not yet submitted
    Pending,
    /// Job record created, submission in flight
    Processing,
    /// Backend operation handle obtained, polling
    Generating,
    Completed,
    Failed,
}

/// One asynchronous generation attempt for a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: JobId,
    pub scene_id: SceneId,
    pub kind: JobKind,
    pub status: JobStatus,
    /// Opaque backend token, passed back verbatim when polling
    pub operation_handle: Option<String>,
    pub cost_estimate: f64,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl GenerationJob {
    /// Create a pending video job with its display-only cost estimate.
    pub fn video(scene_id: SceneId, duration_seconds: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            scene_id,
            kind: JobKind::Video,
            status: JobStatus::Pending,
            operation_handle: None,
            cost_estimate: estimate_video_cost(duration_seconds),
            error_message: None,
            started_at: now,
            completed_at: None,
        }
    }

    pub fn phase(&self) -> VideoJobPhase {
        match self.status {
            JobStatus::Pending => VideoJobPhase::Pending,
            JobStatus::Processing if self.operation_handle.is_some() => VideoJobPhase::Generating,
            JobStatus::Processing => VideoJobPhase::Processing,
            JobStatus::Completed => VideoJobPhase::Completed,
            JobStatus::Failed => VideoJobPhase::Failed,
        }
    }

    pub fn start_processing(&mut self) -> Result<(), DomainError> {
        if self.status != JobStatus::Pending {
            return Err(self.transition_error(JobStatus::Processing));
        }
        self.status = JobStatus::Processing;
        Ok(())
    }

    pub fn attach_operation(&mut self, handle: impl Into<String>) -> Result<(), DomainError> {
        if self.status != JobStatus::Processing {
            return Err(DomainError::invalid_state_transition(format!(
                "cannot attach an operation to a {} job",
                self.status
            )));
        }
        self.operation_handle = Some(handle.into());
        Ok(())
    }

    pub fn complete(&mut self, actual_cost: f64, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != JobStatus::Processing {
            return Err(self.transition_error(JobStatus::Completed));
        }
        self.status = JobStatus::Completed;
        self.cost_estimate = actual_cost;
        self.error_message = None;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn fail(
        &mut self,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(self.transition_error(JobStatus::Failed));
        }
        self.status = JobStatus::Failed;
        self.error_message = Some(message.into());
        self.completed_at = Some(now);
        Ok(())
    }

    fn transition_error(&self, to: JobStatus) -> DomainError {
        DomainError::invalid_state_transition(format!("job {}: {} -> {}", self.id, self.status, to))
    }
}
