//! Thin axum HTTP shell over `artha::app`'s free functions. Handlers do
//! request/response translation only; every operation lives in `app.rs`.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use artha::agent::CancellationToken;
use artha::app::{self, ChatRequest, Collaborators, MudraDprOverrides};
use artha::config::ResolvedConfig;
use artha::error::ArthaError;
use artha::llm::ChatMessage;
use artha::models::{Id, MerchantRule};
use artha::money::Money;
use artha::mudra::MudraDprInput;

pub type SharedState = Arc<Collaborators>;

pub fn build(config: &ResolvedConfig) -> anyhow::Result<SharedState> {
    Ok(Arc::new(app::build(config)?))
}

pub fn router(state: SharedState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/agent/chat", post(agentic_chat))
        .route("/agent/agentic-chat", post(agentic_chat))
        .route("/agent/confirm-action", post(confirm_action))
        .route("/agent/scan-document", post(scan_document))
        .route("/agent/scan-receipt", post(scan_receipt))
        .route("/calculator/{name}", post(run_calculator))
        .route("/categorize", post(categorize_one))
        .route("/categorize/batch", post(categorize_batch))
        .route("/analytics/health-score/{user_id}", get(health_score))
        .route("/analytics/refresh/{user_id}", post(refresh_analytics))
        .route("/analytics/monthly/{user_id}", get(monthly_trends))
        .route("/merchant-rules", get(list_merchant_rules).post(create_merchant_rule))
        .route("/merchant-rules/{id}", delete(delete_merchant_rule))
        .route("/mudra-dpr/calculate", post(mudra_calculate))
        .route("/mudra-dpr/whatif", post(mudra_whatif))
        .route("/dashboard/{user_id}", get(dashboard))
        .route("/insights/daily/{user_id}", get(daily_insight))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(tower_http::cors::Any).allow_headers(tower_http::cors::Any);
    if origins.iter().any(|o| o == "*") {
        layer.allow_origin(AllowOrigin::any())
    } else {
        let parsed: Vec<axum::http::HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        layer.allow_origin(parsed)
    }
}

/// Maps an `ArthaError`/`anyhow::Error` to a JSON error body. `NotConfigured`
/// and `Validation` are client-addressable (400); everything else is a 500.
struct ApiError(anyhow::Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.downcast_ref::<ArthaError>() {
            Some(ArthaError::NotFound(_)) => StatusCode::NOT_FOUND,
            Some(ArthaError::Validation(_)) => StatusCode::BAD_REQUEST,
            Some(ArthaError::NotConfigured(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Some(ArthaError::PageLimitExceeded { .. }) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self(err)
    }
}

impl From<ArthaError> for ApiError {
    fn from(err: ArthaError) -> Self {
        Self(err.into())
    }
}

#[derive(Debug, Deserialize)]
struct AgenticChatBody {
    query: String,
    user_context: Option<String>,
    #[serde(default)]
    conversation_history: Vec<ChatMessage>,
    user_id: String,
}

async fn agentic_chat(State(state): State<SharedState>, Json(body): Json<AgenticChatBody>) -> Json<Value> {
    let cancel = CancellationToken::new();
    let response = app::agentic_chat(
        &state,
        ChatRequest {
            query: body.query,
            user_context: body.user_context,
            conversation_history: body.conversation_history,
            user_id: Id::from_string(body.user_id),
        },
        &cancel,
    )
    .await;
    Json(serde_json::to_value(response).unwrap_or_else(|_| json!({})))
}

#[derive(Debug, Deserialize)]
struct ConfirmActionBody {
    action_id: String,
}

async fn confirm_action(State(state): State<SharedState>, Json(body): Json<ConfirmActionBody>) -> Json<Value> {
    let result = app::confirm_action(&state, &body.action_id).await;
    Json(serde_json::to_value(result).unwrap_or_else(|_| json!({})))
}

async fn scan_document(State(state): State<SharedState>, mut multipart: Multipart) -> Result<Json<Value>, ApiError> {
    let mut user_id = None;
    let mut pdf_bytes = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| anyhow::anyhow!(e))? {
        match field.name() {
            Some("user_id") => user_id = Some(field.text().await.map_err(|e| anyhow::anyhow!(e))?),
            Some("file") => pdf_bytes = Some(field.bytes().await.map_err(|e| anyhow::anyhow!(e))?),
            _ => {}
        }
    }

    let user_id = Id::from_string(user_id.ok_or_else(|| anyhow::anyhow!("missing field: user_id"))?);
    let pdf_bytes = pdf_bytes.ok_or_else(|| anyhow::anyhow!("missing field: file"))?;

    let tmp = tempfile::NamedTempFile::new().map_err(|e| anyhow::anyhow!(e))?;
    tokio::fs::write(tmp.path(), &pdf_bytes).await.map_err(|e| anyhow::anyhow!(e))?;

    let transactions = app::scan_document(&state, &user_id, tmp.path()).await?;
    Ok(Json(json!({ "transactions": transactions })))
}

async fn scan_receipt(State(state): State<SharedState>, mut multipart: Multipart) -> Result<Json<Value>, ApiError> {
    let mut user_id = None;
    let mut image_bytes = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| anyhow::anyhow!(e))? {
        match field.name() {
            Some("user_id") => user_id = Some(field.text().await.map_err(|e| anyhow::anyhow!(e))?),
            Some("file") => image_bytes = Some(field.bytes().await.map_err(|e| anyhow::anyhow!(e))?),
            _ => {}
        }
    }

    let user_id = Id::from_string(user_id.ok_or_else(|| anyhow::anyhow!("missing field: user_id"))?);
    let image_bytes = image_bytes.ok_or_else(|| anyhow::anyhow!("missing field: file"))?;

    let transaction = app::scan_receipt(&state, &user_id, &image_bytes).await?;
    Ok(Json(json!({ "transaction": transaction })))
}

async fn run_calculator(State(state): State<SharedState>, AxumPath(name): AxumPath<String>, Json(arguments): Json<Value>) -> Json<Value> {
    let tool_name = format!("calculate_{}", name.replace('-', "_"));
    let result = app::run_calculator(&state, &tool_name, &arguments).await;
    Json(serde_json::to_value(result).unwrap_or_else(|_| json!({})))
}

#[derive(Debug, Deserialize)]
struct CategorizeBody {
    user_id: String,
    description: String,
}

async fn categorize_one(State(state): State<SharedState>, Json(body): Json<CategorizeBody>) -> Result<Json<Value>, ApiError> {
    let category = app::categorize_one(&state, &Id::from_string(body.user_id), &body.description).await?;
    Ok(Json(json!({ "category": category })))
}

#[derive(Debug, Deserialize)]
struct CategorizeBatchBody {
    user_id: String,
    descriptions: Vec<String>,
}

async fn categorize_batch(State(state): State<SharedState>, Json(body): Json<CategorizeBatchBody>) -> Result<Json<Value>, ApiError> {
    let categories = app::categorize_many(&state, &Id::from_string(body.user_id), &body.descriptions).await?;
    Ok(Json(json!({ "categories": categories })))
}

async fn health_score(State(state): State<SharedState>, AxumPath(user_id): AxumPath<String>) -> Result<Json<Value>, ApiError> {
    let score = app::health_score(&state, &Id::from_string(user_id)).await?;
    Ok(Json(serde_json::to_value(score).map_err(|e| anyhow::anyhow!(e))?))
}

async fn refresh_analytics(State(state): State<SharedState>, AxumPath(user_id): AxumPath<String>) -> Result<Json<Value>, ApiError> {
    app::refresh_analytics(&state, &Id::from_string(user_id)).await?;
    Ok(Json(json!({ "refreshed": true })))
}

#[derive(Debug, Deserialize)]
struct MonthlyQuery {
    #[serde(default = "default_months")]
    months: usize,
}

fn default_months() -> usize {
    6
}

async fn monthly_trends(
    State(state): State<SharedState>,
    AxumPath(user_id): AxumPath<String>,
    axum::extract::Query(query): axum::extract::Query<MonthlyQuery>,
) -> Result<Json<Value>, ApiError> {
    let report = app::monthly_trends(&state, &Id::from_string(user_id), query.months).await?;
    Ok(Json(serde_json::to_value(report).map_err(|e| anyhow::anyhow!(e))?))
}

#[derive(Debug, Deserialize)]
struct MerchantRuleQuery {
    user_id: String,
}

async fn list_merchant_rules(State(state): State<SharedState>, axum::extract::Query(query): axum::extract::Query<MerchantRuleQuery>) -> Result<Json<Value>, ApiError> {
    let rules = app::list_merchant_rules(&state, &Id::from_string(query.user_id)).await?;
    Ok(Json(json!({ "rules": rules })))
}

async fn create_merchant_rule(State(state): State<SharedState>, Json(rule): Json<MerchantRule>) -> Result<Json<Value>, ApiError> {
    let created = app::create_merchant_rule(&state, rule).await?;
    Ok(Json(serde_json::to_value(created).map_err(|e| anyhow::anyhow!(e))?))
}

async fn delete_merchant_rule(State(state): State<SharedState>, AxumPath(id): AxumPath<String>) -> Result<Json<Value>, ApiError> {
    let deleted = app::delete_merchant_rule(&state, &Id::from_string(id)).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

#[derive(Debug, Deserialize)]
struct MudraCalculateBody {
    user_id: String,
    #[serde(flatten)]
    input: MudraDprInput,
}

async fn mudra_calculate(State(state): State<SharedState>, Json(body): Json<MudraCalculateBody>) -> Result<Json<Value>, ApiError> {
    let output = app::mudra_calculate(&state, &Id::from_string(body.user_id), body.input).await?;
    Ok(Json(serde_json::to_value(output).map_err(|e| anyhow::anyhow!(e))?))
}

#[derive(Debug, Deserialize)]
struct MudraWhatIfBody {
    input: MudraDprInput,
    #[serde(default)]
    overrides: MudraDprOverrides,
}

async fn mudra_whatif(Json(body): Json<MudraWhatIfBody>) -> Json<Value> {
    let output = app::mudra_whatif(&body.input, &body.overrides);
    Json(serde_json::to_value(output).unwrap_or_else(|_| json!({})))
}

async fn dashboard(State(state): State<SharedState>, AxumPath(user_id): AxumPath<String>) -> Result<Json<Value>, ApiError> {
    let board = app::dashboard(&state, &Id::from_string(user_id)).await?;
    Ok(Json(serde_json::to_value(board).map_err(|e| anyhow::anyhow!(e))?))
}

async fn daily_insight(State(state): State<SharedState>, AxumPath(user_id): AxumPath<String>) -> Result<Json<Value>, ApiError> {
    let insight = app::daily_insight(&state, &Id::from_string(user_id)).await?;
    Ok(Json(json!({ "insight": insight })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_config(dir: &std::path::Path) -> ResolvedConfig {
        ResolvedConfig {
            data_dir: dir.to_path_buf(),
            reporting_currency: "INR".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            openai_api_key: None,
            sarvam_api_key: None,
            zoho_client_id: None,
            zoho_client_secret: None,
            zoho_refresh_token: None,
            gov_msme_api_key: None,
        }
    }

    #[tokio::test]
    async fn health_score_returns_json_for_a_fresh_user() {
        let dir = tempfile::tempdir().unwrap();
        let state = build(&test_config(dir.path())).unwrap();
        let app = router(state, &["*".to_string()]);

        let response = app
            .oneshot(Request::builder().uri("/analytics/health-score/u1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn calculator_route_maps_hyphenated_name_to_tool_name() {
        let dir = tempfile::tempdir().unwrap();
        let state = build(&test_config(dir.path())).unwrap();
        let app = router(state, &["*".to_string()]);

        let body = json!({"target_amount": "100000", "expected_rate": 12.0, "duration_months": 60}).to_string();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/calculator/goal-sip")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
