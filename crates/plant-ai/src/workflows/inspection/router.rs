//! HTTP surface for workflow triggers, workflow-engine notifications
//! and analysis mappings.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::domain::{AnalysisKind, CloeResult, FencillaResult, InspectionId, StageKind, ThermalReadingResult};
use super::engine::WorkflowEngine;
use super::mapping::MappingError;
use super::publisher::MessagePublisher;
use super::repository::{RecordRepository, RepositoryError};
use super::service::{AnalysisDispatch, InspectionWorkflowService, ServiceError};
use super::status::StatusError;
use super::timeseries::TimeseriesSink;

type Service<R, E, P, T> = Arc<InspectionWorkflowService<R, E, P, T>>;

pub fn inspection_router<R, E, P, T>(service: Service<R, E, P, T>) -> Router
where
    R: RecordRepository + 'static,
    E: WorkflowEngine + 'static,
    P: MessagePublisher + 'static,
    T: TimeseriesSink + 'static,
{
    Router::new()
        .route(
            "/workflows/trigger-anonymizer/:inspection_id",
            post(trigger_anonymizer),
        )
        .route(
            "/workflows/trigger-analysis/:inspection_id",
            post(trigger_analysis),
        )
        .route("/workflow-notification/:stage/started", put(stage_started))
        .route("/workflow-notification/:stage/exited", put(stage_exited))
        .route(
            "/workflow-notification/anonymizer/result",
            put(anonymizer_result),
        )
        .route("/workflow-notification/cloe/result", put(cloe_result))
        .route("/workflow-notification/fencilla/result", put(fencilla_result))
        .route(
            "/workflow-notification/thermal-reading/result",
            put(thermal_reading_result),
        )
        .route("/analysis-mappings", post(create_mapping).get(list_mappings))
        .route(
            "/analysis-mappings/:id",
            axum::routing::get(get_mapping).delete(delete_mapping),
        )
        .route(
            "/analysis-mappings/:id/kinds/:analysis_type",
            delete(delete_mapping_kind),
        )
        .with_state(service)
}

fn error_response(err: ServiceError) -> Response {
    let status = match &err {
        ServiceError::Conflict(_) => StatusCode::CONFLICT,
        ServiceError::Repository(RepositoryError::NotFound(_)) => StatusCode::NOT_FOUND,
        ServiceError::Repository(RepositoryError::Conflict(_)) => StatusCode::CONFLICT,
        ServiceError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        ServiceError::Status(StatusError::Conflict { .. }) => StatusCode::CONFLICT,
        ServiceError::Status(StatusError::NotConfigured { .. }) => StatusCode::NOT_FOUND,
        ServiceError::Status(StatusError::Validation(_)) => StatusCode::BAD_REQUEST,
        ServiceError::Mapping(MappingError::DuplicateKind { .. }) => StatusCode::CONFLICT,
        ServiceError::Mapping(MappingError::EmptyField(_)) => StatusCode::BAD_REQUEST,
        ServiceError::Mapping(
            MappingError::MappingNotFound(_) | MappingError::KindNotFound { .. },
        ) => StatusCode::NOT_FOUND,
        ServiceError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        warn!(error = %err, "request failed");
    }
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

fn parse_stage(raw: &str) -> Result<StageKind, Response> {
    StageKind::parse(raw).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("unknown stage {raw}") })),
        )
            .into_response()
    })
}

fn parse_kind(raw: &str) -> Result<AnalysisKind, Response> {
    AnalysisKind::parse(raw).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("unknown analysis type {raw}") })),
        )
            .into_response()
    })
}

async fn trigger_anonymizer<R, E, P, T>(
    State(service): State<Service<R, E, P, T>>,
    Path(inspection_id): Path<String>,
) -> Response
where
    R: RecordRepository,
    E: WorkflowEngine,
    P: MessagePublisher,
    T: TimeseriesSink,
{
    match service
        .trigger_anonymizer(&InspectionId(inspection_id))
        .await
    {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn trigger_analysis<R, E, P, T>(
    State(service): State<Service<R, E, P, T>>,
    Path(inspection_id): Path<String>,
) -> Response
where
    R: RecordRepository,
    E: WorkflowEngine,
    P: MessagePublisher,
    T: TimeseriesSink,
{
    match service.trigger_analysis(&InspectionId(inspection_id)).await {
        Ok(AnalysisDispatch::Triggered(names)) => {
            (StatusCode::OK, Json(json!({ "triggered": names }))).into_response()
        }
        Ok(AnalysisDispatch::AnonymizationTriggered) => (
            StatusCode::OK,
            Json(json!({ "status": "pending, anonymization triggered" })),
        )
            .into_response(),
        Ok(AnalysisDispatch::NonePending) => (
            StatusCode::OK,
            Json(json!({ "status": "no analyses configured or pending" })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartedBody {
    inspection_id: String,
    #[serde(default)]
    #[allow(dead_code)]
    workflow_name: Option<String>,
}

async fn stage_started<R, E, P, T>(
    State(service): State<Service<R, E, P, T>>,
    Path(stage): Path<String>,
    Json(body): Json<StartedBody>,
) -> Response
where
    R: RecordRepository,
    E: WorkflowEngine,
    P: MessagePublisher,
    T: TimeseriesSink,
{
    let stage = match parse_stage(&stage) {
        Ok(stage) => stage,
        Err(response) => return response,
    };
    match service.stage_started(&InspectionId(body.inspection_id), stage) {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExitedBody {
    inspection_id: String,
    workflow_status: String,
    #[serde(default)]
    workflow_failures: Vec<String>,
}

async fn stage_exited<R, E, P, T>(
    State(service): State<Service<R, E, P, T>>,
    Path(stage): Path<String>,
    Json(body): Json<ExitedBody>,
) -> Response
where
    R: RecordRepository,
    E: WorkflowEngine,
    P: MessagePublisher,
    T: TimeseriesSink,
{
    let stage = match parse_stage(&stage) {
        Ok(stage) => stage,
        Err(response) => return response,
    };
    if !body.workflow_failures.is_empty() {
        warn!(
            inspection_id = %body.inspection_id,
            stage = stage.label(),
            failures = ?body.workflow_failures,
            "workflow reported failures"
        );
    }
    match service
        .stage_exited(
            &InspectionId(body.inspection_id),
            stage,
            &body.workflow_status,
        )
        .await
    {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnonymizerResultBody {
    inspection_id: String,
    is_person_in_image: bool,
}

async fn anonymizer_result<R, E, P, T>(
    State(service): State<Service<R, E, P, T>>,
    Json(body): Json<AnonymizerResultBody>,
) -> Response
where
    R: RecordRepository,
    E: WorkflowEngine,
    P: MessagePublisher,
    T: TimeseriesSink,
{
    match service.anonymizer_result(&InspectionId(body.inspection_id), body.is_person_in_image) {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloeResultBody {
    inspection_id: String,
    oil_level: f32,
}

async fn cloe_result<R, E, P, T>(
    State(service): State<Service<R, E, P, T>>,
    Json(body): Json<CloeResultBody>,
) -> Response
where
    R: RecordRepository,
    E: WorkflowEngine,
    P: MessagePublisher,
    T: TimeseriesSink,
{
    let result = CloeResult {
        oil_level: body.oil_level,
    };
    match service.cloe_result(&InspectionId(body.inspection_id), result) {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FencillaResultBody {
    inspection_id: String,
    is_break: bool,
    confidence: f32,
}

async fn fencilla_result<R, E, P, T>(
    State(service): State<Service<R, E, P, T>>,
    Json(body): Json<FencillaResultBody>,
) -> Response
where
    R: RecordRepository,
    E: WorkflowEngine,
    P: MessagePublisher,
    T: TimeseriesSink,
{
    let result = FencillaResult {
        is_break: body.is_break,
        confidence: body.confidence,
    };
    match service.fencilla_result(&InspectionId(body.inspection_id), result) {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThermalReadingResultBody {
    inspection_id: String,
    temperature: f32,
}

async fn thermal_reading_result<R, E, P, T>(
    State(service): State<Service<R, E, P, T>>,
    Json(body): Json<ThermalReadingResultBody>,
) -> Response
where
    R: RecordRepository,
    E: WorkflowEngine,
    P: MessagePublisher,
    T: TimeseriesSink,
{
    let result = ThermalReadingResult {
        temperature: body.temperature,
    };
    match service
        .thermal_reading_result(&InspectionId(body.inspection_id), result)
        .await
    {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateMappingBody {
    tag: String,
    inspection_description: String,
    analysis_type: String,
}

async fn create_mapping<R, E, P, T>(
    State(service): State<Service<R, E, P, T>>,
    Json(body): Json<CreateMappingBody>,
) -> Response
where
    R: RecordRepository,
    E: WorkflowEngine,
    P: MessagePublisher,
    T: TimeseriesSink,
{
    let kind = match parse_kind(&body.analysis_type) {
        Ok(kind) => kind,
        Err(response) => return response,
    };
    match service.add_mapping_kind(&body.tag, &body.inspection_description, kind) {
        Ok(mapping) => (StatusCode::OK, Json(mapping)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn list_mappings<R, E, P, T>(State(service): State<Service<R, E, P, T>>) -> Response
where
    R: RecordRepository,
    E: WorkflowEngine,
    P: MessagePublisher,
    T: TimeseriesSink,
{
    (StatusCode::OK, Json(service.list_mappings())).into_response()
}

async fn get_mapping<R, E, P, T>(
    State(service): State<Service<R, E, P, T>>,
    Path(id): Path<String>,
) -> Response
where
    R: RecordRepository,
    E: WorkflowEngine,
    P: MessagePublisher,
    T: TimeseriesSink,
{
    match service.get_mapping(&id) {
        Ok(mapping) => (StatusCode::OK, Json(mapping)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn delete_mapping<R, E, P, T>(
    State(service): State<Service<R, E, P, T>>,
    Path(id): Path<String>,
) -> Response
where
    R: RecordRepository,
    E: WorkflowEngine,
    P: MessagePublisher,
    T: TimeseriesSink,
{
    match service.remove_mapping(&id) {
        Ok(mapping) => (StatusCode::OK, Json(mapping)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn delete_mapping_kind<R, E, P, T>(
    State(service): State<Service<R, E, P, T>>,
    Path((id, analysis_type)): Path<(String, String)>,
) -> Response
where
    R: RecordRepository,
    E: WorkflowEngine,
    P: MessagePublisher,
    T: TimeseriesSink,
{
    let kind = match parse_kind(&analysis_type) {
        Ok(kind) => kind,
        Err(response) => return response,
    };
    match service.remove_mapping_kind(&id, kind) {
        Ok(mapping) => (StatusCode::OK, Json(mapping)).into_response(),
        Err(err) => error_response(err),
    }
}
