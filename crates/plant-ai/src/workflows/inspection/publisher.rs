//! Outbound messages announcing workflow results to downstream
//! consumers. Payloads are flat camelCase JSON per the established
//! wire contracts.

use async_trait::async_trait;
use serde::Serialize;

use super::domain::{BlobLocation, InspectionId};

pub const VISUALIZATION_AVAILABLE_TOPIC: &str = "sara/visualization_available";
pub const ANALYSIS_RESULT_TOPIC: &str = "sara/analysis_result_available";

#[derive(Debug, thiserror::Error)]
#[error("message publish failed: {0}")]
pub struct PublishError(pub String);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationAvailableMessage {
    pub inspection_id: InspectionId,
    pub storage_account: String,
    pub blob_container: String,
    pub blob_name: String,
}

impl VisualizationAvailableMessage {
    pub fn new(inspection_id: InspectionId, location: &BlobLocation) -> Self {
        Self {
            inspection_id,
            storage_account: location.storage_account.clone(),
            blob_container: location.blob_container.clone(),
            blob_name: location.blob_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResultMessage {
    pub inspection_id: InspectionId,
    pub analysis_name: &'static str,
    pub value: String,
    pub unit: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub storage_account: String,
    pub blob_container: String,
    pub blob_name: String,
}

#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish_visualization_available(
        &self,
        message: VisualizationAvailableMessage,
    ) -> Result<(), PublishError>;

    async fn publish_analysis_result(
        &self,
        message: AnalysisResultMessage,
    ) -> Result<(), PublishError>;
}
