//! Image-to-video jobs.
//!
//! `accept` validates the request, records a processing job and returns at
//! once. Prompt optimization, submission, polling and download run in a
//! detached task whose only observable effects are job and scene updates.

mod polling;

pub use polling::PollSchedule;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::time::Instant;
use vitrine_domain::{
    ArtifactStatus, GenerationJob, JobId, JobKind, JobStatus, Scene, SceneId, VideoJobPhase,
    VisualStyle,
};

use crate::infrastructure::ports::{
    ClockPort, FileStore, JobRepo, OperationHandle, ProviderError, ProviderPort, ReferenceImage,
    SceneRepo, VideoGenerationRequest, VideoOperation, STATUS_TIMEOUT,
};
use crate::use_cases::error::GenerationError;
use crate::use_cases::image::mime_type_for;
use crate::use_cases::prompt::PromptComposer;

pub const MIN_DURATION_SECONDS: u32 = 4;
pub const MAX_DURATION_SECONDS: u32 = 8;
pub const VIDEO_ASPECT_RATIO: &str = "16:9";

#[derive(Debug, Clone, Deserialize)]
pub struct VideoRequest {
    #[serde(default)]
    pub style: VisualStyle,
    #[serde(default)]
    pub user_prompt: Option<String>,
    pub duration_seconds: u32,
}

/// Immediate answer to an accepted video request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoAck {
    pub job_id: JobId,
    pub scene_id: SceneId,
    pub status: JobStatus,
    pub phase: VideoJobPhase,
    pub cost_estimate: f64,
}

#[derive(Clone)]
pub struct VideoJobs {
    scenes: Arc<dyn SceneRepo>,
    jobs: Arc<dyn JobRepo>,
    files: Arc<dyn FileStore>,
    provider: Arc<dyn ProviderPort>,
    composer: Arc<PromptComposer>,
    clock: Arc<dyn ClockPort>,
    schedule: PollSchedule,
}

impl VideoJobs {
    pub fn new(
        scenes: Arc<dyn SceneRepo>,
        jobs: Arc<dyn JobRepo>,
        files: Arc<dyn FileStore>,
        provider: Arc<dyn ProviderPort>,
        composer: Arc<PromptComposer>,
        clock: Arc<dyn ClockPort>,
        schedule: PollSchedule,
    ) -> Self {
        Self {
            scenes,
            jobs,
            files,
            provider,
            composer,
            clock,
            schedule,
        }
    }

    pub async fn accept(
        &self,
        scene_id: SceneId,
        request: VideoRequest,
    ) -> Result<VideoAck, GenerationError> {
        if !(MIN_DURATION_SECONDS..=MAX_DURATION_SECONDS).contains(&request.duration_seconds) {
            return Err(GenerationError::validation(format!(
                "duration_seconds must be between {MIN_DURATION_SECONDS} and {MAX_DURATION_SECONDS}, got {}",
                request.duration_seconds
            )));
        }

        let scene = self
            .scenes
            .get(scene_id)
            .await?
            .ok_or_else(|| GenerationError::not_found("Scene", scene_id))?;

        let mut job = GenerationJob::video(scene_id, request.duration_seconds, self.clock.now());
        job.start_processing()?;
        self.jobs.create(&job).await?;
        self.scenes
            .update_video_state(scene_id, ArtifactStatus::Generating, None)
            .await?;

        tracing::info!(
            scene_id = %scene_id,
            job_id = %job.id,
            style = %request.style,
            duration_seconds = request.duration_seconds,
            cost_estimate = job.cost_estimate,
            "Accepted video job"
        );

        let ack = VideoAck {
            job_id: job.id,
            scene_id,
            status: job.status,
            phase: job.phase(),
            cost_estimate: job.cost_estimate,
        };

        let worker = self.clone();
        tokio::spawn(async move {
            worker.run(job, scene, request).await;
        });

        Ok(ack)
    }

    /// Latest video job of the scene, if any was ever accepted.
    pub async fn query_status(
        &self,
        scene_id: SceneId,
    ) -> Result<Option<GenerationJob>, GenerationError> {
        Ok(self
            .jobs
            .find_latest_for_scene(scene_id, JobKind::Video)
            .await?)
    }

    async fn run(&self, mut job: GenerationJob, scene: Scene, request: VideoRequest) {
        if let Err(e) = self.generate(&mut job, &scene, &request).await {
            tracing::error!(
                scene_id = %scene.id,
                job_id = %job.id,
                error = %e,
                "Video generation failed"
            );
            self.mark_failed(&mut job, &failure_message(&e)).await;
        }
    }

    async fn generate(
        &self,
        job: &mut GenerationJob,
        scene: &Scene,
        request: &VideoRequest,
    ) -> Result<(), GenerationError> {
        let prompt = self.build_prompt(scene, request).await;

        let image_path = scene.image_path.as_deref().ok_or_else(|| {
            GenerationError::validation("scene has no generated image to animate")
        })?;
        let image_bytes = self.files.read(image_path).await?;

        let handle = self
            .provider
            .generate_video_from_image(VideoGenerationRequest {
                prompt,
                image: ReferenceImage::new(image_bytes, mime_type_for(image_path)),
                duration_seconds: request.duration_seconds,
                aspect_ratio: VIDEO_ASPECT_RATIO.to_string(),
            })
            .await?;

        job.attach_operation(handle.as_str())?;
        self.jobs.update(job).await?;
        tracing::info!(
            job_id = %job.id,
            operation = %handle,
            "Video operation submitted"
        );

        let operation = self.poll_until_done(job.id, &handle).await?;
        if let Some(error) = operation.error.clone() {
            return Err(GenerationError::Provider(ProviderError::from_backend(
                "video",
                "poll_operation",
                None,
                error,
            )));
        }

        let bytes = self.provider.download_video(&operation).await?;
        let video_path = Scene::video_artifact_path(scene.id);
        self.files.write(&video_path, &bytes).await?;

        // The stored job must stay failable if persisting completion fails.
        let mut completed = job.clone();
        completed.complete(job.cost_estimate, self.clock.now())?;
        self.jobs.update(&completed).await?;
        *job = completed;
        self.scenes
            .update_video_state(scene.id, ArtifactStatus::Done, Some(video_path.clone()))
            .await?;

        tracing::info!(
            scene_id = %scene.id,
            job_id = %job.id,
            video_path = %video_path,
            bytes = bytes.len(),
            "Video generation completed"
        );
        Ok(())
    }

    /// Compose and optimize the prompt. Enrichment failures fall back to the
    /// composed prompt.
    async fn build_prompt(&self, scene: &Scene, request: &VideoRequest) -> String {
        let composed = PromptComposer::compose_video_prompt(
            request.style,
            request.user_prompt.as_deref(),
            &scene.materials,
        );
        match self.composer.optimize_video_prompt(&composed).await {
            Ok(optimized) if !optimized.trim().is_empty() => optimized,
            Ok(_) => composed,
            Err(e) => {
                tracing::warn!(
                    scene_id = %scene.id,
                    error = %e,
                    "Prompt optimization failed, using composed prompt"
                );
                composed
            }
        }
    }

    async fn poll_until_done(
        &self,
        job_id: JobId,
        handle: &OperationHandle,
    ) -> Result<VideoOperation, GenerationError> {
        let started = Instant::now();
        let mut polls: u32 = 0;

        loop {
            polls += 1;
            let delay = self.schedule.delay_for(polls);
            tokio::time::sleep(delay).await;

            match self.provider.poll_operation(handle).await {
                Ok(operation) if operation.done => {
                    tracing::debug!(job_id = %job_id, polls, "Video operation finished");
                    return Ok(operation);
                }
                Ok(_) => {
                    tracing::debug!(
                        job_id = %job_id,
                        attempt = polls,
                        delay_ms = delay.as_millis() as u64,
                        "Video operation still running"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        job_id = %job_id,
                        attempt = polls,
                        error = %e,
                        "Polling video operation failed, will retry"
                    );
                }
            }

            if started.elapsed() > self.schedule.timeout {
                return Err(GenerationError::Provider(ProviderError::from_backend(
                    "video",
                    "poll_operation",
                    Some(STATUS_TIMEOUT),
                    format!("Video generation timed out after {polls} polls"),
                )));
            }
        }
    }

    async fn mark_failed(&self, job: &mut GenerationJob, message: &str) {
        match job.fail(message, self.clock.now()) {
            Ok(()) => {
                if let Err(e) = self.jobs.update(job).await {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to persist job failure");
                }
            }
            Err(e) => {
                tracing::warn!(job_id = %job.id, error = %e, "Job already terminal");
            }
        }

        if let Err(e) = self
            .scenes
            .update_video_state(job.scene_id, ArtifactStatus::Failed, None)
            .await
        {
            tracing::error!(
                scene_id = %job.scene_id,
                error = %e,
                "Failed to persist scene video failure"
            );
        }
    }
}

/// Message stored on a failed job. Provider errors keep the backend message
/// without the wrapper prefix.
fn failure_message(error: &GenerationError) -> String {
    match error {
        GenerationError::Provider(e) => e.message.clone(),
        other => other.to_string(),
    }
}
