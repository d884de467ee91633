use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use legal_kernel_api::{
    AnalysisPackage, AnalyzeRequest, AssessRequest, CaseFilter, CaseLookupResponse,
    CaseStatisticsResponse, ClassifyRequest, ClassifyResponse, InferRequest, InferResponse,
    KnowledgeSummary, LegalKernelApi, RuleListing, SearchRequest, API_CONTRACT_VERSION,
};
use legal_kernel_core::{LegalArea, RiskProfile, SearchResults};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

const SERVICE_CONTRACT_VERSION: &str = "service.v1";
const OPENAPI_YAML: &str = include_str!("../../../openapi/openapi.yaml");

#[derive(Debug, Clone)]
struct ServiceState {
    api: LegalKernelApi,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceEnvelope<T>
where
    T: Serialize,
{
    service_contract_version: &'static str,
    api_contract_version: &'static str,
    data: T,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    service_contract_version: &'static str,
    error: String,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    knowledge_fingerprint: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RulesQuery {
    area: Option<String>,
}

#[derive(Debug, Parser)]
#[command(name = "legal-kernel-service")]
#[command(about = "Local HTTP service for the Legal Kernel")]
struct Args {
    /// YAML kernel config; built-in defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// JSON corpus overriding the configured one.
    #[arg(long)]
    corpus: Option<PathBuf>,
    #[arg(long, default_value = "127.0.0.1:4010")]
    bind: SocketAddr,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = StatusCode::BAD_REQUEST;
        (status, Json(self)).into_response()
    }
}

impl ServiceState {
    fn error(err: &anyhow::Error) -> ServiceError {
        tracing::warn!(error = %err, "request rejected");
        ServiceError {
            service_contract_version: SERVICE_CONTRACT_VERSION,
            error: format!("{err:#}"),
        }
    }
}

fn envelope<T>(data: T) -> ServiceEnvelope<T>
where
    T: Serialize,
{
    ServiceEnvelope {
        service_contract_version: SERVICE_CONTRACT_VERSION,
        api_contract_version: API_CONTRACT_VERSION,
        data,
    }
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/openapi", get(openapi))
        .route("/v1/knowledge", get(knowledge))
        .route("/v1/rules", get(rules_list))
        .route("/v1/infer", post(infer))
        .route("/v1/classify", post(classify))
        .route("/v1/assess", post(assess))
        .route("/v1/search/sections", post(search_sections))
        .route("/v1/search/cases", post(search_cases))
        .route("/v1/search/all", post(search_all))
        .route("/v1/cases/find", post(find_cases))
        .route("/v1/cases/stats", get(case_statistics))
        .route("/v1/analyze", post(analyze))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let api = LegalKernelApi::from_config_path(args.config.as_deref(), args.corpus.as_deref())?;
    let state = ServiceState { api };
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!(bind = %args.bind, "legal kernel service listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health(State(state): State<ServiceState>) -> Json<ServiceEnvelope<HealthResponse>> {
    Json(envelope(HealthResponse {
        status: "ok",
        knowledge_fingerprint: state.api.summary().fingerprint.clone(),
    }))
}

async fn openapi() -> impl IntoResponse {
    (StatusCode::OK, [("content-type", "application/yaml; charset=utf-8")], OPENAPI_YAML)
}

async fn knowledge(State(state): State<ServiceState>) -> Json<ServiceEnvelope<KnowledgeSummary>> {
    Json(envelope(state.api.summary().clone()))
}

async fn rules_list(
    State(state): State<ServiceState>,
    Query(query): Query<RulesQuery>,
) -> Result<Json<ServiceEnvelope<RuleListing>>, ServiceError> {
    let area = match query.area.as_deref().map(str::trim) {
        Some(raw) => Some(LegalArea::parse(raw).ok_or_else(|| {
            ServiceState::error(&anyhow::anyhow!("unknown legal area: {raw}"))
        })?),
        None => None,
    };
    Ok(Json(envelope(state.api.list_rules(area))))
}

async fn infer(
    State(state): State<ServiceState>,
    Json(request): Json<InferRequest>,
) -> Result<Json<ServiceEnvelope<InferResponse>>, ServiceError> {
    let response = state.api.infer(&request).map_err(|err| ServiceState::error(&err))?;
    Ok(Json(envelope(response)))
}

async fn classify(
    State(state): State<ServiceState>,
    Json(request): Json<ClassifyRequest>,
) -> Result<Json<ServiceEnvelope<ClassifyResponse>>, ServiceError> {
    let response = state.api.classify(&request).map_err(|err| ServiceState::error(&err))?;
    Ok(Json(envelope(response)))
}

async fn assess(
    State(state): State<ServiceState>,
    Json(request): Json<AssessRequest>,
) -> Result<Json<ServiceEnvelope<RiskProfile>>, ServiceError> {
    let profile = state.api.assess(&request).map_err(|err| ServiceState::error(&err))?;
    Ok(Json(envelope(profile)))
}

async fn search_sections(
    State(state): State<ServiceState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<ServiceEnvelope<SearchResults>>, ServiceError> {
    let results = state.api.search_sections(&request).map_err(|err| ServiceState::error(&err))?;
    Ok(Json(envelope(results)))
}

async fn search_cases(
    State(state): State<ServiceState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<ServiceEnvelope<SearchResults>>, ServiceError> {
    let results = state.api.search_cases(&request).map_err(|err| ServiceState::error(&err))?;
    Ok(Json(envelope(results)))
}

async fn search_all(
    State(state): State<ServiceState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<ServiceEnvelope<SearchResults>>, ServiceError> {
    let results = state.api.search_all(&request).map_err(|err| ServiceState::error(&err))?;
    Ok(Json(envelope(results)))
}

async fn find_cases(
    State(state): State<ServiceState>,
    Json(filter): Json<CaseFilter>,
) -> Result<Json<ServiceEnvelope<CaseLookupResponse>>, ServiceError> {
    let response = state.api.find_cases(&filter).map_err(|err| ServiceState::error(&err))?;
    Ok(Json(envelope(response)))
}

async fn case_statistics(
    State(state): State<ServiceState>,
) -> Json<ServiceEnvelope<CaseStatisticsResponse>> {
    Json(envelope(state.api.case_statistics()))
}

async fn analyze(
    State(state): State<ServiceState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<ServiceEnvelope<AnalysisPackage>>, ServiceError> {
    let package = state.api.analyze(request).map_err(|err| ServiceState::error(&err))?;
    Ok(Json(envelope(package)))
}
