//! Pure transition rules for workflow stage status. All mutation of a
//! record's stages funnels through these functions so the state machine
//! lives in one place.

use super::domain::{
    AnalysisKind, CloeResult, FencillaResult, InspectionRecord, StageKind, ThermalReadingResult,
    WorkflowStatus,
};

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("stage {stage} is {status} and cannot accept this transition")]
    Conflict {
        stage: &'static str,
        status: &'static str,
    },
    #[error("record has no {stage} stage configured")]
    NotConfigured { stage: &'static str },
    #[error("{0}")]
    Validation(String),
}

impl StatusError {
    fn conflict(stage: StageKind, status: WorkflowStatus) -> Self {
        Self::Conflict {
            stage: stage.label(),
            status: status.label(),
        }
    }

    fn not_configured(stage: StageKind) -> Self {
        Self::NotConfigured {
            stage: stage.label(),
        }
    }
}

/// Outcome reported by an external workflow on exit. Only the exact
/// token "Succeeded" counts as success; any other string is a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Succeeded,
    Failed,
}

impl ExitStatus {
    pub fn from_raw(raw: &str) -> Self {
        if raw == "Succeeded" {
            Self::Succeeded
        } else {
            Self::Failed
        }
    }

    pub const fn workflow_status(self) -> WorkflowStatus {
        match self {
            Self::Succeeded => WorkflowStatus::ExitSuccess,
            Self::Failed => WorkflowStatus::ExitFailure,
        }
    }
}

fn stage_status(record: &InspectionRecord, stage: StageKind) -> Result<WorkflowStatus, StatusError> {
    match stage {
        StageKind::Anonymizer => Ok(record.anonymization.status),
        StageKind::Analysis(kind) => record
            .analysis_status(kind)
            .ok_or_else(|| StatusError::not_configured(stage)),
    }
}

fn set_stage_status(record: &mut InspectionRecord, stage: StageKind, status: WorkflowStatus) {
    match stage {
        StageKind::Anonymizer => record.anonymization.status = status,
        StageKind::Analysis(AnalysisKind::Cloe) => {
            if let Some(s) = record.cloe.as_mut() {
                s.status = status;
            }
        }
        StageKind::Analysis(AnalysisKind::Fencilla) => {
            if let Some(s) = record.fencilla.as_mut() {
                s.status = status;
            }
        }
        StageKind::Analysis(AnalysisKind::ThermalReading) => {
            if let Some(s) = record.thermal_reading.as_mut() {
                s.status = status;
            }
        }
    }
}

/// Mark a stage as started. Only valid from `NotStarted`.
pub fn begin(record: &mut InspectionRecord, stage: StageKind) -> Result<(), StatusError> {
    let current = stage_status(record, stage)?;
    if current != WorkflowStatus::NotStarted {
        return Err(StatusError::conflict(stage, current));
    }
    set_stage_status(record, stage, WorkflowStatus::Started);
    Ok(())
}

/// Mark a stage as exited. Accepted from `Started` and, because start
/// notifications can be lost, also from `NotStarted`. Terminal stages
/// reject further exits.
pub fn exit(
    record: &mut InspectionRecord,
    stage: StageKind,
    exit: ExitStatus,
) -> Result<WorkflowStatus, StatusError> {
    let current = stage_status(record, stage)?;
    if current.is_terminal() {
        return Err(StatusError::conflict(stage, current));
    }
    let status = exit.workflow_status();
    set_stage_status(record, stage, status);
    Ok(status)
}

pub fn record_anonymization_result(
    record: &mut InspectionRecord,
    is_person_in_image: bool,
) -> Result<(), StatusError> {
    record.anonymization.result = Some(super::domain::AnonymizationResult { is_person_in_image });
    Ok(())
}

pub fn record_cloe_result(
    record: &mut InspectionRecord,
    result: CloeResult,
) -> Result<(), StatusError> {
    if !(0.0..=100.0).contains(&result.oil_level) {
        return Err(StatusError::Validation(format!(
            "oil level {} outside 0..=100",
            result.oil_level
        )));
    }
    let stage = record.cloe.as_mut().ok_or_else(|| {
        StatusError::not_configured(StageKind::Analysis(AnalysisKind::Cloe))
    })?;
    stage.result = Some(result);
    Ok(())
}

pub fn record_fencilla_result(
    record: &mut InspectionRecord,
    result: FencillaResult,
) -> Result<(), StatusError> {
    if !(0.0..=1.0).contains(&result.confidence) {
        return Err(StatusError::Validation(format!(
            "confidence {} outside 0..=1",
            result.confidence
        )));
    }
    let stage = record.fencilla.as_mut().ok_or_else(|| {
        StatusError::not_configured(StageKind::Analysis(AnalysisKind::Fencilla))
    })?;
    stage.result = Some(result);
    Ok(())
}

pub fn record_thermal_reading_result(
    record: &mut InspectionRecord,
    result: ThermalReadingResult,
) -> Result<(), StatusError> {
    let stage = record.thermal_reading.as_mut().ok_or_else(|| {
        StatusError::not_configured(StageKind::Analysis(AnalysisKind::ThermalReading))
    })?;
    stage.result = Some(result);
    Ok(())
}
