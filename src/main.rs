use axum::{
    Router,
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use fhir::RestStore;
use qcsi_core::{
    CoreConfig, FeatureCatalog, ModelRegistry, ResolverRegistry, ScoringError, ScoringService,
};

/// Application state shared across REST API handlers
///
/// Contains the scoring service used by the REST API endpoints, holding the
/// record-store handle, the feature catalog and the registries.
#[derive(Clone)]
struct AppState {
    scoring_service: Arc<ScoringService>,
}

/// Liveness response for the `/health` endpoint.
#[derive(Serialize, ToSchema)]
struct HealthRes {
    ok: bool,
    message: String,
}

/// One feature of a model, as described by the feature table.
#[derive(Serialize, ToSchema)]
struct FeatureRes {
    feature: String,
    code: String,
    type_of_data: String,
    data_alive_time: String,
}

/// Model description served by `GET /{model}`.
#[derive(Serialize, ToSchema)]
struct ModelRes {
    model: String,
    features: Vec<FeatureRes>,
}

#[derive(Deserialize)]
struct ScoreQuery {
    id: Option<String>,
}

#[derive(OpenApi)]
#[openapi(
    paths(health, describe_model, score_patient),
    components(schemas(HealthRes, ModelRes, FeatureRes))
)]
struct ApiDoc;

/// Main entry point for the qCSI scoring service
///
/// Starts the REST server on the configured address (default: 0.0.0.0:3000).
/// Provides HTTP endpoints for model description and patient scoring with
/// OpenAPI/Swagger documentation.
///
/// # Environment Variables
/// - `QCSI_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `QCSI_FHIR_BASE`: FHIR endpoint records are searched on (default: "http://localhost:8080/fhir")
/// - `QCSI_FEATURE_TABLE`: Path of the feature table CSV (default: "feature_table.csv")
/// - `QCSI_HTTP_TIMEOUT_SECS`: Per-request timeout towards the record store (default: 30)
/// - `QCSI_SEARCH_RETRIES`: Extra attempts after a retryable search failure (default: 2)
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If startup or runtime fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("qcsi=info".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("QCSI_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let fhir_base =
        std::env::var("QCSI_FHIR_BASE").unwrap_or_else(|_| "http://localhost:8080/fhir".into());
    let feature_table =
        std::env::var("QCSI_FEATURE_TABLE").unwrap_or_else(|_| "feature_table.csv".into());
    let timeout_secs: u64 = std::env::var("QCSI_HTTP_TIMEOUT_SECS")
        .unwrap_or_else(|_| "30".into())
        .parse()?;
    let retries: u32 = std::env::var("QCSI_SEARCH_RETRIES")
        .unwrap_or_else(|_| "2".into())
        .parse()?;

    let cfg = CoreConfig::new(
        fhir_base,
        feature_table.into(),
        Duration::from_secs(timeout_secs),
        retries,
    )?;

    let store = RestStore::new(
        cfg.record_store_url(),
        cfg.request_timeout(),
        cfg.search_retries(),
    )?;
    let catalog = FeatureCatalog::from_csv_path(cfg.feature_table_path())?;

    tracing::info!("-- Starting qCSI REST API on {}", addr);
    tracing::info!(
        "-- Loaded {} model(s) from {}",
        catalog.model_names().count(),
        cfg.feature_table_path().display()
    );

    let scoring_service = ScoringService::new(
        Arc::new(store),
        catalog,
        ResolverRegistry::standard(),
        ModelRegistry::standard()?,
    );

    let app = Router::new()
        .route("/health", get(health))
        .route("/:model", get(describe_model))
        .route("/:model/score", post(score_patient))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(AppState {
            scoring_service: Arc::new(scoring_service),
        });

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn bad_request(message: &str) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "message": message })),
    )
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Returns the current health status of the qCSI scoring service.
/// This endpoint is used for monitoring and load balancer health checks.
///
/// # Returns
/// * `Json<HealthRes>` - Health status response containing service status
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "qCSI REST API is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/{model}",
    params(
        ("model" = String, Path, description = "Model name from the feature table")
    ),
    responses(
        (status = 200, description = "Features of the model", body = ModelRes),
        (status = 400, description = "Model was not found in system")
    )
)]
/// Describe a scoring model
///
/// Lists the features the model resolves, with their terminology codes, data
/// types and look-back windows as configured in the feature table.
///
/// # Returns
/// * `Ok(Json<ModelRes>)` - The model's features
/// * `Err((StatusCode, Json))` - Bad request for an unknown model
///
/// # Errors
/// Returns `400 Bad Request` if:
/// - the feature table has no rows for the model.
async fn describe_model(
    State(state): State<AppState>,
    AxumPath(model): AxumPath<String>,
) -> Result<Json<ModelRes>, (StatusCode, Json<serde_json::Value>)> {
    let definitions = state
        .scoring_service
        .catalog()
        .get_model(&model)
        .map_err(|_| bad_request("Model was not found in system."))?;

    let features = definitions
        .iter()
        .map(|(feature, definition)| FeatureRes {
            feature: feature.clone(),
            code: definition.code().to_string(),
            type_of_data: definition.type_of_data().to_string(),
            data_alive_time: definition.alive_window().to_string(),
        })
        .collect();

    Ok(Json(ModelRes { model, features }))
}

#[utoipa::path(
    post,
    path = "/{model}/score",
    params(
        ("model" = String, Path, description = "Model name from the feature table"),
        ("id" = Option<String>, Query, description = "Patient identifier in the record store")
    ),
    responses(
        (status = 200, description = "Resolved feature values plus the predicted score"),
        (status = 400, description = "Missing patient ID, unknown model or unminable flow-rate text"),
        (status = 502, description = "Per-feature resolution failures, keyed by feature"),
        (status = 500, description = "Internal server error")
    )
)]
/// Resolve a patient's features and compute the model score
///
/// Searches the record store for every feature of the model, extracts the
/// values, and aggregates them into the severity score. The response maps each
/// feature to its `{date, value}` pair and carries the score under
/// `predict_value`.
///
/// # Returns
/// * `Ok(Json)` - Feature values plus `predict_value`
/// * `Err((StatusCode, Json))` - Bad request, bad gateway or internal error
///
/// # Errors
/// Returns `400 Bad Request` if:
/// - the `id` query parameter is missing or empty,
/// - the model is not in the feature table or the model registry, or
/// - a textual flow rate cannot be mined.
///
/// Returns `502 Bad Gateway` with a `{feature: message}` map if any feature
/// failed to resolve against the record store.
async fn score_patient(
    State(state): State<AppState>,
    AxumPath(model): AxumPath<String>,
    Query(query): Query<ScoreQuery>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let patient_id = match query.id {
        Some(id) if !id.trim().is_empty() => id,
        _ => return Err(bad_request("Please fill in patient's ID.")),
    };

    let report = state
        .scoring_service
        .score_patient(&patient_id, &model, chrono::Utc::now())
        .await
        .map_err(|error| match error {
            ScoringError::UnknownModel(_) => bad_request("Model was not found in system."),
            error @ ScoringError::UnrecognizedFlowRateText(_) => {
                bad_request(&error.to_string())
            }
            other => {
                tracing::error!("Score patient error: {:?}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "message": "Internal error" })),
                )
            }
        })?;

    match report.score {
        Some(score) => {
            let mut body = serde_json::Map::new();
            for (feature, value) in &report.features {
                body.insert(feature.clone(), serde_json::json!(value));
            }
            body.insert("predict_value".into(), serde_json::json!(score));
            Ok(Json(serde_json::Value::Object(body)))
        }
        None => {
            let failures: serde_json::Map<String, serde_json::Value> = report
                .failures
                .iter()
                .map(|(feature, error)| (feature.clone(), serde_json::json!(error.to_string())))
                .collect();
            Err((
                StatusCode::BAD_GATEWAY,
                Json(serde_json::Value::Object(failures)),
            ))
        }
    }
}
