//! Orchestration service tying the record store, mapping registry,
//! workflow engine, outbound publisher and time-series sink together.
//! All endpoint and gateway handlers go through this type.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::domain::{
    AnalysisKind, BlobLocation, CloeResult, FencillaResult, InspectionId, InspectionRecord,
    StageKind, ThermalReadingResult, WorkflowStage, WorkflowStatus,
};
use super::engine::{EngineError, WorkflowCall, WorkflowEngine};
use super::mapping::{AnalysisMapping, AnalysisMappingRegistry, MappingError};
use super::publisher::{AnalysisResultMessage, MessagePublisher, VisualizationAvailableMessage};
use super::repository::{RecordRepository, RepositoryError, UpdateError};
use super::status::{self, ExitStatus, StatusError};
use super::timeseries::{TimeseriesPoint, TimeseriesSink};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Status(#[from] StatusError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<UpdateError> for ServiceError {
    fn from(err: UpdateError) -> Self {
        match err {
            UpdateError::Repository(e) => Self::Repository(e),
            UpdateError::Status(e) => Self::Status(e),
        }
    }
}

/// Storage accounts each pipeline step reads from and writes to.
/// Container and blob name are carried over from the raw upload.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub raw_account: String,
    pub anonymized_account: String,
    pub visualized_account: String,
}

impl StorageLayout {
    fn relocate(&self, location: &BlobLocation, account: &str) -> BlobLocation {
        BlobLocation {
            storage_account: account.to_string(),
            blob_container: location.blob_container.clone(),
            blob_name: location.blob_name.clone(),
        }
    }
}

/// A new inspection as handed over by the ingestion gateway, already
/// validated field-by-field.
#[derive(Debug, Clone)]
pub struct NewInspection {
    pub inspection_id: InspectionId,
    pub installation_code: String,
    pub tag: String,
    pub inspection_description: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub raw_location: BlobLocation,
}

/// Outcome of an analysis dispatch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisDispatch {
    /// Anonymization had not run yet; it was triggered instead.
    AnonymizationTriggered,
    /// Every configured analysis stage is already past NotStarted.
    NonePending,
    /// Display names of the stages whose trigger calls went out.
    Triggered(Vec<&'static str>),
}

pub struct InspectionWorkflowService<R, E, P, T> {
    repository: Arc<R>,
    engine: Arc<E>,
    publisher: Arc<P>,
    timeseries: Arc<T>,
    mappings: Arc<AnalysisMappingRegistry>,
    storage: StorageLayout,
}

impl<R, E, P, T> InspectionWorkflowService<R, E, P, T>
where
    R: RecordRepository,
    E: WorkflowEngine,
    P: MessagePublisher,
    T: TimeseriesSink,
{
    pub fn new(
        repository: Arc<R>,
        engine: Arc<E>,
        publisher: Arc<P>,
        timeseries: Arc<T>,
        mappings: Arc<AnalysisMappingRegistry>,
        storage: StorageLayout,
    ) -> Self {
        Self {
            repository,
            engine,
            publisher,
            timeseries,
            mappings,
            storage,
        }
    }

    fn anonymizer_call(&self, record: &InspectionRecord) -> WorkflowCall {
        WorkflowCall {
            inspection_id: record.inspection_id.clone(),
            source: record.anonymization.source.clone(),
            destination: record.anonymization.destination.clone(),
            installation_code: None,
            tag: None,
            inspection_description: None,
        }
    }

    fn analysis_call(&self, record: &InspectionRecord, kind: AnalysisKind) -> WorkflowCall {
        let source = record.anonymization.destination.clone();
        let destination = self
            .storage
            .relocate(&record.anonymization.destination, &self.storage.visualized_account);
        let needs_context = kind == AnalysisKind::ThermalReading;
        WorkflowCall {
            inspection_id: record.inspection_id.clone(),
            source,
            destination,
            installation_code: needs_context.then(|| record.installation_code.clone()),
            tag: needs_context.then(|| record.tag.clone()),
            inspection_description: needs_context.then(|| record.inspection_description.clone()),
        }
    }

    /// Create a record for an inspection result received over the
    /// gateway, then kick off its anonymization. Duplicate ids and
    /// mismatched storage accounts are rejected without side effects.
    pub async fn ingest_inspection_result(
        &self,
        new: NewInspection,
    ) -> Result<InspectionRecord, ServiceError> {
        if new.raw_location.storage_account != self.storage.raw_account {
            return Err(StatusError::Validation(format!(
                "inspection data in unexpected storage account {}",
                new.raw_location.storage_account
            ))
            .into());
        }

        let anonymized = self
            .storage
            .relocate(&new.raw_location, &self.storage.anonymized_account);
        let visualized = self
            .storage
            .relocate(&new.raw_location, &self.storage.visualized_account);

        let mut record = InspectionRecord {
            inspection_id: new.inspection_id,
            installation_code: new.installation_code,
            tag: new.tag,
            inspection_description: new.inspection_description,
            created_at: Utc::now(),
            timestamp: new.timestamp,
            anonymization: WorkflowStage::new(new.raw_location, anonymized.clone()),
            cloe: None,
            fencilla: None,
            thermal_reading: None,
        };
        for kind in self
            .mappings
            .analyses_for(&record.tag, &record.inspection_description)
        {
            record.ensure_analysis_stage(kind, anonymized.clone(), visualized.clone());
        }

        self.repository.insert(record.clone())?;
        info!(
            inspection_id = %record.inspection_id,
            analyses = record.configured_kinds().len(),
            "inspection record created"
        );

        // Fire-and-forget: a failed trigger call leaves the record
        // NotStarted and is retried by a later manual trigger.
        if let Err(err) = self.trigger_analysis(&record.inspection_id).await {
            warn!(
                inspection_id = %record.inspection_id,
                error = %err,
                "initial anonymization trigger failed"
            );
        }
        Ok(record)
    }

    /// Ask the external engine to run the anonymizer. The stage stays
    /// NotStarted; only the engine's own started callback flips it.
    pub async fn trigger_anonymizer(
        &self,
        id: &InspectionId,
    ) -> Result<InspectionRecord, ServiceError> {
        let record = self.repository.fetch(id)?;
        match record.anonymization.status {
            WorkflowStatus::Started | WorkflowStatus::ExitSuccess => {
                return Err(ServiceError::Conflict(format!(
                    "anonymization already {}",
                    record.anonymization.status.label()
                )));
            }
            _ => {}
        }
        self.engine
            .trigger_anonymizer(self.anonymizer_call(&record))
            .await?;
        info!(inspection_id = %id, "anonymizer trigger sent");
        Ok(record)
    }

    /// Dispatch pending analyses for a record, or its anonymization
    /// when that has not run yet.
    pub async fn trigger_analysis(
        &self,
        id: &InspectionId,
    ) -> Result<AnalysisDispatch, ServiceError> {
        let record = self.repository.fetch(id)?;
        match record.anonymization.status {
            WorkflowStatus::NotStarted => {
                self.engine
                    .trigger_anonymizer(self.anonymizer_call(&record))
                    .await?;
                info!(inspection_id = %id, "anonymization pending, anonymizer triggered");
                Ok(AnalysisDispatch::AnonymizationTriggered)
            }
            WorkflowStatus::Started => Err(ServiceError::Conflict(
                "anonymization in progress".to_string(),
            )),
            WorkflowStatus::ExitFailure => {
                Err(ServiceError::Conflict("anonymization failed".to_string()))
            }
            WorkflowStatus::ExitSuccess => Ok(self.dispatch_pending(&record).await),
        }
    }

    /// Trigger every configured analysis still at NotStarted. Calls are
    /// independent; a failure is logged and the rest still go out.
    async fn dispatch_pending(&self, record: &InspectionRecord) -> AnalysisDispatch {
        let pending: Vec<AnalysisKind> = AnalysisKind::ordered()
            .into_iter()
            .filter(|kind| record.analysis_status(*kind) == Some(WorkflowStatus::NotStarted))
            .collect();
        if pending.is_empty() {
            return AnalysisDispatch::NonePending;
        }
        let mut triggered = Vec::new();
        for kind in pending {
            match self
                .engine
                .trigger_analysis(kind, self.analysis_call(record, kind))
                .await
            {
                Ok(()) => {
                    info!(
                        inspection_id = %record.inspection_id,
                        analysis = kind.label(),
                        "analysis trigger sent"
                    );
                    triggered.push(kind.display_name());
                }
                Err(err) => warn!(
                    inspection_id = %record.inspection_id,
                    analysis = kind.label(),
                    error = %err,
                    "analysis trigger failed"
                ),
            }
        }
        // An empty list here means every pending trigger failed, not
        // that nothing was pending.
        if triggered.is_empty() {
            warn!(
                inspection_id = %record.inspection_id,
                "no analysis trigger went out, all pending stages failed to dispatch"
            );
        }
        AnalysisDispatch::Triggered(triggered)
    }

    pub fn stage_started(
        &self,
        id: &InspectionId,
        stage: StageKind,
    ) -> Result<InspectionRecord, ServiceError> {
        let record = self
            .repository
            .update_with(id, &mut |record| status::begin(record, stage))?;
        info!(inspection_id = %id, stage = stage.label(), "workflow started");
        Ok(record)
    }

    pub fn anonymizer_result(
        &self,
        id: &InspectionId,
        is_person_in_image: bool,
    ) -> Result<InspectionRecord, ServiceError> {
        let record = self.repository.update_with(id, &mut |record| {
            status::record_anonymization_result(record, is_person_in_image)
        })?;
        info!(inspection_id = %id, is_person_in_image, "anonymization result stored");
        Ok(record)
    }

    pub fn cloe_result(
        &self,
        id: &InspectionId,
        result: CloeResult,
    ) -> Result<InspectionRecord, ServiceError> {
        let record = self
            .repository
            .update_with(id, &mut |record| status::record_cloe_result(record, result))?;
        info!(inspection_id = %id, oil_level = result.oil_level, "CLOE result stored");
        Ok(record)
    }

    pub fn fencilla_result(
        &self,
        id: &InspectionId,
        result: FencillaResult,
    ) -> Result<InspectionRecord, ServiceError> {
        let record = self.repository.update_with(id, &mut |record| {
            status::record_fencilla_result(record, result)
        })?;
        info!(
            inspection_id = %id,
            is_break = result.is_break,
            confidence = result.confidence,
            "Fencilla result stored"
        );
        Ok(record)
    }

    /// Store a thermal reading and forward it to the time-series
    /// store. The forward is a boundary effect; its failure does not
    /// undo the stored result.
    pub async fn thermal_reading_result(
        &self,
        id: &InspectionId,
        result: ThermalReadingResult,
    ) -> Result<InspectionRecord, ServiceError> {
        let record = self.repository.update_with(id, &mut |record| {
            status::record_thermal_reading_result(record, result)
        })?;
        info!(inspection_id = %id, temperature = result.temperature, "thermal reading stored");

        let point = TimeseriesPoint::new(
            &record.installation_code,
            &record.tag,
            &record.inspection_description,
            "°C",
            f64::from(result.temperature),
            record.timestamp.unwrap_or(record.created_at),
        );
        if let Err(err) = self.timeseries.upload(point).await {
            warn!(inspection_id = %id, error = %err, "thermal reading upload failed");
        }
        Ok(record)
    }

    /// Apply an exit notification. On success exits this also performs
    /// the stage's outbound effects: the anonymizer publishes a
    /// visualization-available message and auto-dispatches pending
    /// analyses; each analysis publishes its result message.
    pub async fn stage_exited(
        &self,
        id: &InspectionId,
        stage: StageKind,
        raw_status: &str,
    ) -> Result<InspectionRecord, ServiceError> {
        let exit = ExitStatus::from_raw(raw_status);
        let record = self
            .repository
            .update_with(id, &mut |record| status::exit(record, stage, exit).map(|_| ()))?;
        info!(
            inspection_id = %id,
            stage = stage.label(),
            raw_status,
            status = exit.workflow_status().label(),
            "workflow exited"
        );

        if exit == ExitStatus::Succeeded {
            match stage {
                StageKind::Anonymizer => self.after_anonymization_succeeded(&record).await,
                StageKind::Analysis(kind) => self.publish_analysis_result(&record, kind).await,
            }
        }
        Ok(record)
    }

    async fn after_anonymization_succeeded(&self, record: &InspectionRecord) {
        let message = VisualizationAvailableMessage::new(
            record.inspection_id.clone(),
            &record.anonymization.destination,
        );
        if let Err(err) = self.publisher.publish_visualization_available(message).await {
            warn!(
                inspection_id = %record.inspection_id,
                error = %err,
                "visualization-available publish failed"
            );
        }
        self.dispatch_pending(record).await;
    }

    async fn publish_analysis_result(&self, record: &InspectionRecord, kind: AnalysisKind) {
        let (value, unit, warning, confidence, destination) = match kind {
            AnalysisKind::Cloe => {
                let Some(stage) = record.cloe.as_ref() else { return };
                let Some(result) = stage.result else {
                    warn!(inspection_id = %record.inspection_id, "CLOE exited without result");
                    return;
                };
                let warning =
                    (result.oil_level < 5.0).then(|| "Low oil level".to_string());
                (
                    result.oil_level.to_string(),
                    "percentage",
                    warning,
                    None,
                    &stage.destination,
                )
            }
            AnalysisKind::Fencilla => {
                let Some(stage) = record.fencilla.as_ref() else { return };
                let Some(result) = stage.result else {
                    warn!(inspection_id = %record.inspection_id, "Fencilla exited without result");
                    return;
                };
                let warning = result.is_break.then(|| "Breach detected".to_string());
                (
                    result.is_break.to_string(),
                    "bool [isBreach]",
                    warning,
                    Some(result.confidence),
                    &stage.destination,
                )
            }
            AnalysisKind::ThermalReading => {
                let Some(stage) = record.thermal_reading.as_ref() else { return };
                let Some(result) = stage.result else {
                    warn!(
                        inspection_id = %record.inspection_id,
                        "thermal reading exited without result"
                    );
                    return;
                };
                (
                    result.temperature.to_string(),
                    "temperature [°C]",
                    None,
                    None,
                    &stage.destination,
                )
            }
        };

        let message = AnalysisResultMessage {
            inspection_id: record.inspection_id.clone(),
            analysis_name: kind.label(),
            value,
            unit,
            warning,
            confidence,
            storage_account: destination.storage_account.clone(),
            blob_container: destination.blob_container.clone(),
            blob_name: destination.blob_name.clone(),
        };
        if let Err(err) = self.publisher.publish_analysis_result(message).await {
            warn!(
                inspection_id = %record.inspection_id,
                analysis = kind.label(),
                error = %err,
                "analysis-result publish failed"
            );
        }
    }

    /// Add an analysis kind to the mapping for an equipment position,
    /// then resync every record at that position.
    pub fn add_mapping_kind(
        &self,
        tag: &str,
        inspection_description: &str,
        kind: AnalysisKind,
    ) -> Result<AnalysisMapping, ServiceError> {
        let mapping = self.mappings.add_kind(tag, inspection_description, kind)?;
        self.resync_records(&mapping.tag, &mapping.inspection_description)?;
        Ok(mapping)
    }

    pub fn remove_mapping_kind(
        &self,
        id: &str,
        kind: AnalysisKind,
    ) -> Result<AnalysisMapping, ServiceError> {
        let mapping = self.mappings.remove_kind(id, kind)?;
        self.resync_records(&mapping.tag, &mapping.inspection_description)?;
        Ok(mapping)
    }

    pub fn remove_mapping(&self, id: &str) -> Result<AnalysisMapping, ServiceError> {
        let mapping = self.mappings.remove_mapping(id)?;
        self.resync_records(&mapping.tag, &mapping.inspection_description)?;
        Ok(mapping)
    }

    pub fn get_mapping(&self, id: &str) -> Result<AnalysisMapping, ServiceError> {
        Ok(self.mappings.get(id)?)
    }

    pub fn list_mappings(&self) -> Vec<AnalysisMapping> {
        self.mappings.list()
    }

    /// After a mapping change: add missing stage sub-records for newly
    /// required kinds and reset anonymization so the pipeline reruns.
    /// Existing stages and their results are never removed.
    fn resync_records(&self, tag: &str, inspection_description: &str) -> Result<(), ServiceError> {
        let kinds = self.mappings.analyses_for(tag, inspection_description);
        let records = self
            .repository
            .find_by_tag_and_description(tag, inspection_description)?;
        for existing in records {
            let id = existing.inspection_id.clone();
            let updated = self.repository.update_with(&id, &mut |record| {
                let source = record.anonymization.destination.clone();
                let destination = self
                    .storage
                    .relocate(&record.anonymization.destination, &self.storage.visualized_account);
                for kind in &kinds {
                    record.ensure_analysis_stage(*kind, source.clone(), destination.clone());
                }
                record.anonymization.status = WorkflowStatus::NotStarted;
                Ok(())
            });
            match updated {
                Ok(_) => info!(inspection_id = %id, "record resynced after mapping change"),
                Err(err) => warn!(inspection_id = %id, error = %err, "record resync failed"),
            }
        }
        Ok(())
    }
}
