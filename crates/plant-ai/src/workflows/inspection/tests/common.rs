use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use crate::workflows::inspection::domain::{
    AnalysisKind, BlobLocation, InspectionId, InspectionRecord, WorkflowStage, WorkflowStatus,
};
use crate::workflows::inspection::engine::{EngineError, WorkflowCall, WorkflowEngine};
use crate::workflows::inspection::mapping::AnalysisMappingRegistry;
use crate::workflows::inspection::publisher::{
    AnalysisResultMessage, MessagePublisher, PublishError, VisualizationAvailableMessage,
};
use crate::workflows::inspection::repository::{
    RecordRepository, RepositoryError, UpdateError,
};
use crate::workflows::inspection::service::{InspectionWorkflowService, StorageLayout};
use crate::workflows::inspection::status::StatusError;
use crate::workflows::inspection::timeseries::{TimeseriesError, TimeseriesPoint, TimeseriesSink};

pub(super) struct InMemoryRecords {
    records: Mutex<HashMap<String, InspectionRecord>>,
}

impl InMemoryRecords {
    pub(super) fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }
}

impl RecordRepository for InMemoryRecords {
    fn insert(&self, record: InspectionRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.lock().expect("record mutex poisoned");
        let key = record.inspection_id.0.clone();
        if records.contains_key(&key) {
            return Err(RepositoryError::Conflict(record.inspection_id));
        }
        records.insert(key, record);
        Ok(())
    }

    fn fetch(&self, id: &InspectionId) -> Result<InspectionRecord, RepositoryError> {
        let records = self.records.lock().expect("record mutex poisoned");
        records
            .get(&id.0)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.clone()))
    }

    fn update_with(
        &self,
        id: &InspectionId,
        apply: &mut dyn FnMut(&mut InspectionRecord) -> Result<(), StatusError>,
    ) -> Result<InspectionRecord, UpdateError> {
        let mut records = self.records.lock().expect("record mutex poisoned");
        let record = records
            .get_mut(&id.0)
            .ok_or_else(|| RepositoryError::NotFound(id.clone()))?;
        apply(record)?;
        Ok(record.clone())
    }

    fn find_by_tag_and_description(
        &self,
        tag: &str,
        inspection_description: &str,
    ) -> Result<Vec<InspectionRecord>, RepositoryError> {
        let records = self.records.lock().expect("record mutex poisoned");
        Ok(records
            .values()
            .filter(|r| {
                r.tag.eq_ignore_ascii_case(tag.trim())
                    && r.inspection_description
                        .eq_ignore_ascii_case(inspection_description.trim())
            })
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(super) struct RecordingEngine {
    pub(super) calls: Mutex<Vec<String>>,
    pub(super) failing: Mutex<HashSet<&'static str>>,
}

impl RecordingEngine {
    pub(super) fn fail_on(&self, stage: &'static str) {
        self.failing.lock().expect("engine mutex poisoned").insert(stage);
    }

    pub(super) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("engine mutex poisoned").clone()
    }

    fn record(&self, stage: &'static str) -> Result<(), EngineError> {
        if self.failing.lock().expect("engine mutex poisoned").contains(stage) {
            return Err(EngineError::Rejected { status: 503 });
        }
        self.calls
            .lock()
            .expect("engine mutex poisoned")
            .push(stage.to_string());
        Ok(())
    }
}

#[async_trait]
impl WorkflowEngine for RecordingEngine {
    async fn trigger_anonymizer(&self, _call: WorkflowCall) -> Result<(), EngineError> {
        self.record("Anonymizer")
    }

    async fn trigger_analysis(
        &self,
        kind: AnalysisKind,
        _call: WorkflowCall,
    ) -> Result<(), EngineError> {
        self.record(kind.label())
    }
}

#[derive(Default)]
pub(super) struct RecordingPublisher {
    pub(super) visualizations: Mutex<Vec<VisualizationAvailableMessage>>,
    pub(super) results: Mutex<Vec<AnalysisResultMessage>>,
}

#[async_trait]
impl MessagePublisher for RecordingPublisher {
    async fn publish_visualization_available(
        &self,
        message: VisualizationAvailableMessage,
    ) -> Result<(), PublishError> {
        self.visualizations
            .lock()
            .expect("publisher mutex poisoned")
            .push(message);
        Ok(())
    }

    async fn publish_analysis_result(
        &self,
        message: AnalysisResultMessage,
    ) -> Result<(), PublishError> {
        self.results
            .lock()
            .expect("publisher mutex poisoned")
            .push(message);
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct RecordingTimeseries {
    pub(super) points: Mutex<Vec<TimeseriesPoint>>,
}

#[async_trait]
impl TimeseriesSink for RecordingTimeseries {
    async fn upload(&self, point: TimeseriesPoint) -> Result<(), TimeseriesError> {
        self.points
            .lock()
            .expect("timeseries mutex poisoned")
            .push(point);
        Ok(())
    }
}

pub(super) type TestService =
    InspectionWorkflowService<InMemoryRecords, RecordingEngine, RecordingPublisher, RecordingTimeseries>;

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) records: Arc<InMemoryRecords>,
    pub(super) engine: Arc<RecordingEngine>,
    pub(super) publisher: Arc<RecordingPublisher>,
    pub(super) timeseries: Arc<RecordingTimeseries>,
    pub(super) mappings: Arc<AnalysisMappingRegistry>,
}

pub(super) fn storage() -> StorageLayout {
    StorageLayout {
        raw_account: "plantrawdata".to_string(),
        anonymized_account: "plantanonymized".to_string(),
        visualized_account: "plantvisualized".to_string(),
    }
}

pub(super) fn harness() -> Harness {
    let records = Arc::new(InMemoryRecords::new());
    let engine = Arc::new(RecordingEngine::default());
    let publisher = Arc::new(RecordingPublisher::default());
    let timeseries = Arc::new(RecordingTimeseries::default());
    let mappings = Arc::new(AnalysisMappingRegistry::new());
    let service = Arc::new(InspectionWorkflowService::new(
        Arc::clone(&records),
        Arc::clone(&engine),
        Arc::clone(&publisher),
        Arc::clone(&timeseries),
        Arc::clone(&mappings),
        storage(),
    ));
    Harness {
        service,
        records,
        engine,
        publisher,
        timeseries,
        mappings,
    }
}

pub(super) fn raw_location(name: &str) -> BlobLocation {
    BlobLocation {
        storage_account: "plantrawdata".to_string(),
        blob_container: "inspections".to_string(),
        blob_name: name.to_string(),
    }
}

fn account_copy(location: &BlobLocation, account: &str) -> BlobLocation {
    BlobLocation {
        storage_account: account.to_string(),
        blob_container: location.blob_container.clone(),
        blob_name: location.blob_name.clone(),
    }
}

/// Record with an anonymization stage and the given analysis stages,
/// all NotStarted.
pub(super) fn record(id: &str, kinds: &[AnalysisKind]) -> InspectionRecord {
    let raw = raw_location(&format!("{id}.jpg"));
    let anonymized = account_copy(&raw, "plantanonymized");
    let visualized = account_copy(&raw, "plantvisualized");
    let mut record = InspectionRecord {
        inspection_id: InspectionId(id.to_string()),
        installation_code: "KAA".to_string(),
        tag: "23-PT-92".to_string(),
        inspection_description: "oil level gauge".to_string(),
        created_at: Utc::now(),
        timestamp: None,
        anonymization: WorkflowStage::new(raw, anonymized.clone()),
        cloe: None,
        fencilla: None,
        thermal_reading: None,
    };
    for kind in kinds {
        record.ensure_analysis_stage(*kind, anonymized.clone(), visualized.clone());
    }
    record
}

pub(super) fn with_anonymization_status(
    mut record: InspectionRecord,
    status: WorkflowStatus,
) -> InspectionRecord {
    record.anonymization.status = status;
    record
}
