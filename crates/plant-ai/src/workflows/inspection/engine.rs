//! Port for triggering external workflow executions. The HTTP
//! implementation posts the stage payload to the per-stage service.

use async_trait::async_trait;
use serde::Serialize;

use super::domain::{AnalysisKind, BlobLocation, InspectionId};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("workflow request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("workflow service rejected trigger with status {status}")]
    Rejected { status: u16 },
}

/// What a workflow execution needs to locate its input and output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowCall {
    pub inspection_id: InspectionId,
    pub source: BlobLocation,
    pub destination: BlobLocation,
    /// Equipment context; only the thermal reading workflow needs it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installation_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inspection_description: Option<String>,
}

#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    async fn trigger_anonymizer(&self, call: WorkflowCall) -> Result<(), EngineError>;

    async fn trigger_analysis(
        &self,
        kind: AnalysisKind,
        call: WorkflowCall,
    ) -> Result<(), EngineError>;
}

/// Base URLs of the external workflow services.
#[derive(Debug, Clone)]
pub struct EngineEndpoints {
    pub anonymizer_url: String,
    pub cloe_url: String,
    pub fencilla_url: String,
    pub thermal_reading_url: String,
}

impl EngineEndpoints {
    fn url_for(&self, kind: AnalysisKind) -> &str {
        match kind {
            AnalysisKind::Cloe => &self.cloe_url,
            AnalysisKind::Fencilla => &self.fencilla_url,
            AnalysisKind::ThermalReading => &self.thermal_reading_url,
        }
    }
}

pub struct HttpWorkflowEngine {
    client: reqwest::Client,
    endpoints: EngineEndpoints,
}

impl HttpWorkflowEngine {
    pub fn new(endpoints: EngineEndpoints) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints,
        }
    }

    async fn post(&self, url: &str, call: &WorkflowCall) -> Result<(), EngineError> {
        let response = self.client.post(url).json(call).send().await?;
        if !response.status().is_success() {
            return Err(EngineError::Rejected {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl WorkflowEngine for HttpWorkflowEngine {
    async fn trigger_anonymizer(&self, call: WorkflowCall) -> Result<(), EngineError> {
        self.post(&self.endpoints.anonymizer_url, &call).await
    }

    async fn trigger_analysis(
        &self,
        kind: AnalysisKind,
        call: WorkflowCall,
    ) -> Result<(), EngineError> {
        self.post(self.endpoints.url_for(kind), &call).await
    }
}
