//! Robotic plant-inspection workflow orchestration: records created
//! from inbound inspection results, per-stage status tracking driven
//! by workflow-engine notifications, and the mapping registry deciding
//! which analyses each piece of equipment needs.

pub mod domain;
pub mod engine;
pub mod mapping;
pub mod publisher;
pub mod repository;
pub mod router;
pub mod service;
pub mod status;
pub mod timeseries;

#[cfg(test)]
mod tests;

pub use domain::{
    AnalysisKind, AnonymizationResult, BlobLocation, CloeResult, FencillaResult, InspectionId,
    InspectionRecord, StageKind, ThermalReadingResult, WorkflowStage, WorkflowStatus,
};
pub use engine::{EngineEndpoints, EngineError, HttpWorkflowEngine, WorkflowCall, WorkflowEngine};
pub use mapping::{AnalysisMapping, AnalysisMappingRegistry, MappingError};
pub use publisher::{
    AnalysisResultMessage, MessagePublisher, PublishError, VisualizationAvailableMessage,
};
pub use repository::{RecordRepository, RepositoryError, UpdateError};
pub use router::inspection_router;
pub use service::{
    AnalysisDispatch, InspectionWorkflowService, NewInspection, ServiceError, StorageLayout,
};
pub use status::{ExitStatus, StatusError};
pub use timeseries::{HttpTimeseriesSink, TimeseriesError, TimeseriesPoint, TimeseriesSink};
