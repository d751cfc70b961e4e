//! HTTP routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use vitrine_domain::{
    CategoryScore, GenerationJob, Material, MotifDisplayMode, NormalizedSlot, Scene, SceneId,
    SuccessfulPattern,
};

use crate::app::App;
use crate::infrastructure::app_settings::ProviderSettings;
use crate::infrastructure::ports::RepoError;
use crate::use_cases::{
    GenerationError, ImageRequest, SceneImage, VerificationOutcome, VideoAck, VideoRequest,
};

const DEFAULT_PATTERN_LIMIT: usize = 5;
const DEFAULT_PROBLEMATIC_SCORE: f64 = 70.0;

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<App>> {
    Router::new()
        .route("/", get(health))
        .route("/api/health", get(health))
        .route("/api/scenes", post(create_scene))
        .route("/api/scenes/{id}", get(get_scene))
        .route("/api/scenes/{id}/video", post(accept_video))
        .route("/api/scenes/{id}/video/status", get(video_status))
        .route("/api/scenes/{id}/image", post(generate_image))
        .route("/api/scenes/{id}/verify", post(verify_scene))
        .route("/api/composite", post(composite))
        .route("/api/motifs/classify", post(classify_motifs))
        .route("/api/verifications", post(record_verification))
        .route("/api/patterns/problematic", get(problematic_categories))
        .route("/api/patterns/cleanup", post(cleanup_patterns))
        .route("/api/patterns/{category}", get(best_patterns))
        .route(
            "/api/settings/provider",
            get(get_provider_settings).put(update_provider_settings),
        )
}

async fn health() -> &'static str {
    "OK"
}

// =============================================================================
// Scenes
// =============================================================================

#[derive(Debug, Deserialize)]
struct CreateSceneRequest {
    name: String,
    #[serde(default)]
    materials: Vec<Material>,
}

async fn create_scene(
    State(app): State<Arc<App>>,
    Json(request): Json<CreateSceneRequest>,
) -> Result<(StatusCode, Json<Scene>), ApiError> {
    if request.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".into()));
    }
    let mut scene = Scene::new(request.name.trim());
    scene.materials = request.materials;
    app.repositories.scene.save(&scene).await?;
    tracing::info!(scene_id = %scene.id, materials = scene.materials.len(), "Created scene");
    Ok((StatusCode::CREATED, Json(scene)))
}

async fn get_scene(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Scene>, ApiError> {
    let scene = app
        .repositories
        .scene
        .get(SceneId::from_uuid(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Scene not found: {id}")))?;
    Ok(Json(scene))
}

// =============================================================================
// Generation
// =============================================================================

async fn accept_video(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
    Json(request): Json<VideoRequest>,
) -> Result<(StatusCode, Json<VideoAck>), ApiError> {
    let ack = app
        .use_cases
        .video
        .accept(SceneId::from_uuid(id), request)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(ack)))
}

async fn video_status(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<GenerationJob>, ApiError> {
    let job = app
        .use_cases
        .video
        .query_status(SceneId::from_uuid(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No video job for scene {id}")))?;
    Ok(Json(job))
}

async fn generate_image(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
    Json(request): Json<ImageRequest>,
) -> Result<Json<SceneImage>, ApiError> {
    let image = app
        .use_cases
        .image
        .execute(SceneId::from_uuid(id), request)
        .await?;
    Ok(Json(image))
}

async fn verify_scene(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
) -> Result<Json<VerificationOutcome>, ApiError> {
    let outcome = app.use_cases.verify.execute(SceneId::from_uuid(id)).await?;
    Ok(Json(outcome))
}

// =============================================================================
// Compositing
// =============================================================================

#[derive(Debug, Deserialize)]
struct CompositeRequest {
    background_path: String,
    #[serde(default)]
    motif_paths: Vec<String>,
    #[serde(default)]
    layout: Option<Vec<NormalizedSlot>>,
    #[serde(default)]
    edge_blend: bool,
    #[serde(default)]
    output_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct CompositeResponse {
    output_path: String,
    mime_type: String,
    placed: usize,
}

async fn composite(
    State(app): State<Arc<App>>,
    Json(request): Json<CompositeRequest>,
) -> Result<Json<CompositeResponse>, ApiError> {
    let background = app
        .repositories
        .files
        .read(&request.background_path)
        .await
        .map_err(GenerationError::from)?;
    let output = app
        .use_cases
        .compositor
        .composite(
            &background,
            &request.motif_paths,
            request.layout.as_deref(),
            request.edge_blend,
        )
        .await?;

    let output_path = request
        .output_path
        .unwrap_or_else(|| format!("composites/composite_{}.png", Uuid::new_v4()));
    app.repositories
        .files
        .write(&output_path, &output.image)
        .await
        .map_err(GenerationError::from)?;

    Ok(Json(CompositeResponse {
        output_path,
        mime_type: output.mime_type,
        placed: output.placed,
    }))
}

#[derive(Debug, Deserialize)]
struct ClassifyRequest {
    motif_paths: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ClassifyResponse {
    mode: MotifDisplayMode,
}

async fn classify_motifs(
    State(app): State<Arc<App>>,
    Json(request): Json<ClassifyRequest>,
) -> Json<ClassifyResponse> {
    let mode = app
        .use_cases
        .classifier
        .classify_any(&request.motif_paths)
        .await;
    Json(ClassifyResponse { mode })
}

// =============================================================================
// Patterns
// =============================================================================

#[derive(Debug, Deserialize)]
struct RecordVerificationRequest {
    category: String,
    prompt: String,
    score: u8,
}

#[derive(Debug, Serialize)]
struct RecordVerificationResponse {
    /// Usage count of the stored pattern, absent when the score was too low
    pattern_usage: Option<u32>,
}

async fn record_verification(
    State(app): State<Arc<App>>,
    Json(request): Json<RecordVerificationRequest>,
) -> Result<Json<RecordVerificationResponse>, ApiError> {
    let pattern_usage = app
        .use_cases
        .patterns
        .record_verification(&request.category, &request.prompt, request.score)
        .await?;
    Ok(Json(RecordVerificationResponse { pattern_usage }))
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

async fn best_patterns(
    State(app): State<Arc<App>>,
    Path(category): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<SuccessfulPattern>>, ApiError> {
    let patterns = app
        .use_cases
        .patterns
        .best_for(&category, query.limit.unwrap_or(DEFAULT_PATTERN_LIMIT))
        .await?;
    Ok(Json(patterns))
}

#[derive(Debug, Deserialize)]
struct ProblematicQuery {
    min_score: Option<f64>,
}

async fn problematic_categories(
    State(app): State<Arc<App>>,
    Query(query): Query<ProblematicQuery>,
) -> Result<Json<Vec<CategoryScore>>, ApiError> {
    let categories = app
        .use_cases
        .patterns
        .problematic_categories(query.min_score.unwrap_or(DEFAULT_PROBLEMATIC_SCORE))
        .await?;
    Ok(Json(categories))
}

#[derive(Debug, Deserialize)]
struct CleanupRequest {
    min_usage_count: u32,
    min_score: u8,
}

#[derive(Debug, Serialize)]
struct CleanupResponse {
    deleted: u64,
}

async fn cleanup_patterns(
    State(app): State<Arc<App>>,
    Json(request): Json<CleanupRequest>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let deleted = app
        .use_cases
        .patterns
        .cleanup(request.min_usage_count, request.min_score)
        .await?;
    Ok(Json(CleanupResponse { deleted }))
}

// =============================================================================
// Settings
// =============================================================================

async fn get_provider_settings(State(app): State<Arc<App>>) -> Json<ProviderSettings> {
    Json(app.gateway.current_settings().await.redacted())
}

/// Replace the provider settings. An omitted or redacted API key keeps the
/// key currently in effect.
async fn update_provider_settings(
    State(app): State<Arc<App>>,
    Json(mut settings): Json<ProviderSettings>,
) -> Result<Json<ProviderSettings>, ApiError> {
    let current = app.gateway.current_settings().await;
    let keep_current_key = match settings.api_key.as_deref().map(str::trim) {
        None | Some("") => true,
        Some(key) => key.starts_with("****"),
    };
    if keep_current_key {
        settings.api_key = current.api_key;
    }

    app.repositories
        .settings
        .save_provider_settings(&settings)
        .await?;
    tracing::info!(provider = %settings.provider, "Provider settings updated");
    Ok(Json(settings.redacted()))
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// Provider failure surfaced with its classified status
    Provider { status: u16, message: String },
    Internal(String),
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            ApiError::Provider { status, message } => {
                let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
                (status, message).into_response()
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<GenerationError> for ApiError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::Validation(msg) => ApiError::BadRequest(msg),
            GenerationError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            GenerationError::Provider(err) => ApiError::Provider {
                status: err.status,
                message: err.to_string(),
            },
            GenerationError::Repo(err) => err.into(),
            GenerationError::File(err) => match err {
                crate::infrastructure::ports::StorageError::NotFound(path) => {
                    ApiError::NotFound(format!("File not found: {path}"))
                }
                crate::infrastructure::ports::StorageError::InvalidPath(path) => {
                    ApiError::BadRequest(format!("Invalid path: {path}"))
                }
                other => ApiError::Internal(other.to_string()),
            },
            GenerationError::Image(msg) => ApiError::BadRequest(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::dryrun::DryrunProvider;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    fn router() -> (Router, Arc<App>) {
        let app = Arc::new(App::in_memory(Arc::new(DryrunProvider::new())));
        (routes().with_state(app.clone()), app)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (router, _) = router();
        let response = router
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn video_duration_out_of_range_is_bad_request() {
        let (router, _) = router();
        let uri = format!("/api/scenes/{}/video", Uuid::new_v4());
        let response = router
            .oneshot(json_request("POST", &uri, serde_json::json!({ "duration_seconds": 12 })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_scene_status_is_not_found() {
        let (router, _) = router();
        let uri = format!("/api/scenes/{}/video/status", Uuid::new_v4());
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_then_generate_image() {
        let (router, _) = router();
        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/scenes",
                serde_json::json!({ "name": "Studio" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let scene = body_json(response).await;
        let id = scene["id"].as_str().unwrap().to_string();

        let response = router
            .oneshot(json_request(
                "POST",
                &format!("/api/scenes/{id}/image"),
                serde_json::json!({ "style": "studio" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let image = body_json(response).await;
        assert_eq!(image["image_path"], format!("images/scene_{id}.png"));
    }

    #[tokio::test]
    async fn recorded_verification_shows_up_in_patterns() {
        let (router, _) = router();
        let response = router
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/verifications",
                serde_json::json!({ "category": "wood", "prompt": "oak", "score": 93 }),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["pattern_usage"], 1);

        let response = router
            .oneshot(Request::builder().uri("/api/patterns/wood").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let patterns = body_json(response).await;
        assert_eq!(patterns.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn settings_update_keeps_key_when_redacted() {
        let (router, app) = router();
        let response = router
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/settings/provider",
                serde_json::json!({ "provider": "gemini", "api_key": "secret-key-1234" }),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["api_key"], "****1234");

        router
            .oneshot(json_request(
                "PUT",
                "/api/settings/provider",
                serde_json::json!({ "provider": "gemini", "api_key": "****1234" }),
            ))
            .await
            .unwrap();
        let stored = app.gateway.current_settings().await;
        assert_eq!(stored.api_key.as_deref(), Some("secret-key-1234"));
    }
}
