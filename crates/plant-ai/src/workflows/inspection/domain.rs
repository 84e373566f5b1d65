use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier wrapper for inspection records. Assigned by the robot
/// fleet upstream, unique per inspection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InspectionId(pub String);

impl fmt::Display for InspectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Location of a binary object in blob storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobLocation {
    pub storage_account: String,
    pub blob_container: String,
    pub blob_name: String,
}

impl fmt::Display for BlobLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.storage_account, self.blob_container, self.blob_name
        )
    }
}

/// The analysis workflows an inspection can require, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisKind {
    Cloe,
    Fencilla,
    ThermalReading,
}

impl AnalysisKind {
    /// Dispatch and reporting order is fixed: CLOE, Fencilla, ThermalReading.
    pub const fn ordered() -> [Self; 3] {
        [Self::Cloe, Self::Fencilla, Self::ThermalReading]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Cloe => "CLOE",
            Self::Fencilla => "Fencilla",
            Self::ThermalReading => "ThermalReading",
        }
    }

    /// Name used when reporting which stages were triggered.
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Cloe => "CLOE analysis",
            Self::Fencilla => "Fencilla analysis",
            Self::ThermalReading => "ThermalReading analysis",
        }
    }

    /// Stable token used at store and URL boundaries.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cloe => "cloe",
            Self::Fencilla => "fencilla",
            Self::ThermalReading => "thermal-reading",
        }
    }

    /// Parse the boundary token back into a kind. Accepts the legacy
    /// "constantLevelOiler" spelling for CLOE.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cloe" | "constantleveloiler" => Some(Self::Cloe),
            "fencilla" => Some(Self::Fencilla),
            "thermal-reading" | "thermalreading" => Some(Self::ThermalReading),
            _ => None,
        }
    }
}

/// Pipeline step addressed by trigger and notification endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Anonymizer,
    Analysis(AnalysisKind),
}

impl StageKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Anonymizer => "Anonymizer",
            Self::Analysis(kind) => kind.label(),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        if raw.trim().eq_ignore_ascii_case("anonymizer") {
            return Some(Self::Anonymizer);
        }
        AnalysisKind::parse(raw).map(Self::Analysis)
    }
}

/// Lifecycle of one workflow stage. Payloads never live here; they sit
/// on the stage record as a separate optional result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStatus {
    NotStarted,
    Started,
    ExitSuccess,
    ExitFailure,
}

impl WorkflowStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Started => "started",
            Self::ExitSuccess => "exit_success",
            Self::ExitFailure => "exit_failure",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::ExitSuccess | Self::ExitFailure)
    }
}

/// One pipeline stage on a record: where its input comes from, where
/// its output goes, and how far the external workflow has progressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStage<P> {
    pub source: BlobLocation,
    pub destination: BlobLocation,
    pub created_at: DateTime<Utc>,
    pub status: WorkflowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<P>,
}

impl<P> WorkflowStage<P> {
    pub fn new(source: BlobLocation, destination: BlobLocation) -> Self {
        Self {
            source,
            destination,
            created_at: Utc::now(),
            status: WorkflowStatus::NotStarted,
            result: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnonymizationResult {
    pub is_person_in_image: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloeResult {
    /// Oil level as a percentage of a full reservoir, 0..=100.
    pub oil_level: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FencillaResult {
    pub is_break: bool,
    /// Model confidence, 0..=1.
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThermalReadingResult {
    pub temperature: f32,
}

pub type AnonymizationStage = WorkflowStage<AnonymizationResult>;
pub type CloeStage = WorkflowStage<CloeResult>;
pub type FencillaStage = WorkflowStage<FencillaResult>;
pub type ThermalReadingStage = WorkflowStage<ThermalReadingResult>;

/// An inspection record and the workflow stages it owns. Sub-records
/// are created and replaced only through the record itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionRecord {
    pub inspection_id: InspectionId,
    pub installation_code: String,
    pub tag: String,
    pub inspection_description: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub anonymization: AnonymizationStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloe: Option<CloeStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fencilla: Option<FencillaStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thermal_reading: Option<ThermalReadingStage>,
}

impl InspectionRecord {
    /// The analysis kinds this record has stage sub-records for, in
    /// the fixed dispatch order.
    pub fn configured_kinds(&self) -> Vec<AnalysisKind> {
        AnalysisKind::ordered()
            .into_iter()
            .filter(|kind| self.analysis_status(*kind).is_some())
            .collect()
    }

    /// Status of a given analysis stage, or `None` when the kind is
    /// not configured on this record.
    pub fn analysis_status(&self, kind: AnalysisKind) -> Option<WorkflowStatus> {
        match kind {
            AnalysisKind::Cloe => self.cloe.as_ref().map(|s| s.status),
            AnalysisKind::Fencilla => self.fencilla.as_ref().map(|s| s.status),
            AnalysisKind::ThermalReading => self.thermal_reading.as_ref().map(|s| s.status),
        }
    }

    /// Create the stage sub-record for `kind` if it does not exist
    /// yet. Existing stages (and any results on them) are untouched.
    pub fn ensure_analysis_stage(
        &mut self,
        kind: AnalysisKind,
        source: BlobLocation,
        destination: BlobLocation,
    ) -> bool {
        match kind {
            AnalysisKind::Cloe if self.cloe.is_none() => {
                self.cloe = Some(WorkflowStage::new(source, destination));
                true
            }
            AnalysisKind::Fencilla if self.fencilla.is_none() => {
                self.fencilla = Some(WorkflowStage::new(source, destination));
                true
            }
            AnalysisKind::ThermalReading if self.thermal_reading.is_none() => {
                self.thermal_reading = Some(WorkflowStage::new(source, destination));
                true
            }
            _ => false,
        }
    }
}
