use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::agent;
use crate::config::Config;
use crate::synthesizer::llm::LlmError;
use crate::synthesizer::QuerySynthesizer;

#[derive(Clone)]
struct ApiState {
    config: Config,
    synthesizer: Arc<QuerySynthesizer>,
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    ok: bool,
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(error: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: error.to_string(),
        }
    }

    fn bad_gateway(error: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: error.to_string(),
        }
    }

    /// Completion-backend failures are upstream faults; everything else on
    /// the pipeline is ours.
    fn from_pipeline(error: anyhow::Error) -> Self {
        if error.downcast_ref::<LlmError>().is_some() {
            Self::bad_gateway(format!("{error:#}"))
        } else {
            Self::internal(format!("{error:#}"))
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiErrorBody {
            ok: false,
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    question: String,
}

#[derive(Debug, Serialize)]
struct AskResponse {
    answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    chart: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

pub async fn run_server(config: Config, bind: SocketAddr) -> Result<()> {
    let synthesizer = Arc::new(QuerySynthesizer::from_config(&config.llm)?);
    let state = ApiState {
        config,
        synthesizer,
    };

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("REST API listening on http://{bind}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/v1/ask", post(ask))
        .route("/v1/ask/stream", post(ask_stream))
        .layer(cors)
        .with_state(state)
}

async fn index() -> &'static str {
    "shopsight API - POST a question to /v1/ask"
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ask(
    State(state): State<ApiState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let outcome = agent::ask(&state.synthesizer, &state.config, &request.question)
        .await
        .map_err(ApiError::from_pipeline)?;
    Ok(Json(AskResponse {
        answer: outcome.answer,
        chart: outcome.chart.map(|p| p.to_string_lossy().to_string()),
    }))
}

/// Re-emits the already-computed answer word by word with a fixed delay.
/// This is presentation pacing, not incremental generation.
async fn ask_stream(
    State(state): State<ApiState>,
    Json(request): Json<AskRequest>,
) -> Result<Response, ApiError> {
    let answer = agent::ask_text(&state.synthesizer, &state.config, &request.question)
        .await
        .map_err(ApiError::from_pipeline)?;

    let delay = Duration::from_millis(state.config.server.stream_delay_ms);
    let words: Vec<String> = answer
        .split_whitespace()
        .map(|word| format!("{word} "))
        .collect();
    let stream = tokio_stream::iter(words).then(move |word| async move {
        tokio::time::sleep(delay).await;
        Ok::<_, Infallible>(word)
    });

    let response = Response::builder()
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from_stream(stream))
        .map_err(ApiError::internal)?;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ingest::ingest;
    use crate::store::MetricsStore;
    use axum::body::Body;
    use axum::http::Request;
    use std::fs;
    use std::path::Path;
    use tower::util::ServiceExt;

    fn seed_fixtures(dir: &Path) {
        fs::write(
            dir.join("ad_sales.csv"),
            "date,item_id,ad_sales,impressions,ad_spend,clicks,units_sold\n\
             2024-01-01,1,50.0,100,10.0,4,2\n",
        )
        .unwrap();
        fs::write(
            dir.join("total_sales.csv"),
            "date,item_id,total_sales,total_units_ordered\n\
             2024-01-01,1,100.0,4\n\
             2024-01-02,1,150.0,6\n",
        )
        .unwrap();
        fs::write(
            dir.join("eligibility.csv"),
            "eligibility_datetime_utc,item_id,eligibility,message\n\
             2024-01-01T00:00:00Z,1,TRUE,listed\n",
        )
        .unwrap();
    }

    fn test_app(dir: &Path) -> Router {
        seed_fixtures(dir);
        let mut config = Config::default();
        config.storage.db_path = dir.join("test.db").to_string_lossy().to_string();
        config.storage.chart_path = dir.join("chart.png").to_string_lossy().to_string();
        config.server.stream_delay_ms = 0;
        let mut store = MetricsStore::open(&config.resolved_db_path()).unwrap();
        ingest(&mut store, dir).unwrap();

        build_router(ApiState {
            config,
            synthesizer: Arc::new(QuerySynthesizer::fallback_only()),
        })
    }

    fn ask_request(uri: &str, question: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(format!("{{\"question\": \"{question}\"}}")))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["ok"], true);
    }

    #[tokio::test]
    async fn ask_answers_total_sales() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());
        let response = app
            .oneshot(ask_request("/v1/ask", "What is my total sales?"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let answer = json["answer"].as_str().unwrap();
        assert!(answer.contains("250.0"), "answer: {answer}");
        assert!(json.get("chart").is_none());
    }

    #[tokio::test]
    async fn ask_reports_sql_errors_in_the_answer() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());
        // Break the schema so the RoAS template fails at execution.
        {
            let mut config = Config::default();
            config.storage.db_path = dir.path().join("test.db").to_string_lossy().to_string();
            let store = MetricsStore::open(&config.resolved_db_path()).unwrap();
            store.query("DROP TABLE ad_sales_metrics");
        }
        let response = app
            .oneshot(ask_request("/v1/ask", "calculate the roas"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["answer"].as_str().unwrap().starts_with("Error: "));
    }

    #[tokio::test]
    async fn stream_emits_the_full_answer_as_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());
        let response = app
            .oneshot(ask_request("/v1/ask/stream", "What is my total sales?"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("250.0"), "stream: {text}");
    }

    #[tokio::test]
    async fn index_is_a_welcome_string() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("shopsight"));
    }
}
