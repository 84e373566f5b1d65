//! Explicit handler registry for inbound messages. The gateway is
//! handed one of these at construction and invokes callbacks directly;
//! there is no ambient event bus.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{error, warn};

use super::messages::{RawInspectionResult, RawInspectionValue};
use super::topics::MessageKind;
use crate::workflows::inspection::engine::WorkflowEngine;
use crate::workflows::inspection::publisher::MessagePublisher;
use crate::workflows::inspection::repository::{RecordRepository, RepositoryError};
use crate::workflows::inspection::service::{InspectionWorkflowService, ServiceError};
use crate::workflows::inspection::timeseries::{TimeseriesPoint, TimeseriesSink};

pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type Handler = Box<dyn Fn(Vec<u8>) -> HandlerFuture + Send + Sync>;

#[derive(Default)]
pub struct GatewayHandlers {
    handlers: HashMap<MessageKind, Handler>,
}

impl GatewayHandlers {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, kind: MessageKind, handler: F)
    where
        F: Fn(Vec<u8>) -> HandlerFuture + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Box::new(handler));
    }

    /// The future handling one message, or `None` when no handler is
    /// registered for the kind.
    pub fn handle(&self, kind: MessageKind, payload: Vec<u8>) -> Option<HandlerFuture> {
        self.handlers.get(&kind).map(|handler| handler(payload))
    }
}

/// Standard wiring: inspection results create records through the
/// service, inspection values go straight to the time-series sink.
pub fn standard_handlers<R, E, P, T>(
    service: Arc<InspectionWorkflowService<R, E, P, T>>,
    timeseries: Arc<T>,
) -> GatewayHandlers
where
    R: RecordRepository + 'static,
    E: WorkflowEngine + 'static,
    P: MessagePublisher + 'static,
    T: TimeseriesSink + 'static,
{
    let mut handlers = GatewayHandlers::new();
    handlers.register(MessageKind::InspectionResult, move |payload| {
        let service = Arc::clone(&service);
        Box::pin(async move {
            let raw: RawInspectionResult = match serde_json::from_slice(&payload) {
                Ok(raw) => raw,
                Err(err) => {
                    error!(error = %err, "malformed inspection_result message dropped");
                    return;
                }
            };
            let missing = raw.missing_fields();
            if !missing.is_empty() {
                for field in missing {
                    error!(field, "inspection_result message missing required field");
                }
                return;
            }
            let Some(new) = raw.validated() else { return };
            let id = new.inspection_id.clone();
            match service.ingest_inspection_result(new).await {
                Ok(_) => {}
                Err(ServiceError::Repository(RepositoryError::Conflict(_))) => {
                    warn!(inspection_id = %id, "duplicate inspection result dropped");
                }
                Err(err) => {
                    error!(inspection_id = %id, error = %err, "inspection result dropped");
                }
            }
        })
    });
    handlers.register(MessageKind::InspectionValue, move |payload| {
        let timeseries = Arc::clone(&timeseries);
        Box::pin(async move {
            let raw: RawInspectionValue = match serde_json::from_slice(&payload) {
                Ok(raw) => raw,
                Err(err) => {
                    error!(error = %err, "malformed inspection_value message dropped");
                    return;
                }
            };
            let missing = raw.missing_fields();
            if !missing.is_empty() {
                for field in missing {
                    error!(field, "inspection_value message missing required field");
                }
                return;
            }
            let Some(value) = raw.validated() else { return };
            let point = TimeseriesPoint::new(
                &value.installation_code,
                &value.tag,
                &value.inspection_description,
                &value.unit,
                value.value,
                value.timestamp,
            );
            if let Err(err) = timeseries.upload(point).await {
                error!(error = %err, "inspection value upload failed");
            }
        })
    });
    handlers
}
