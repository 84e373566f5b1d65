use chrono::Utc;

use super::common::{harness, raw_location};
use crate::workflows::inspection::domain::{AnalysisKind, BlobLocation, InspectionId, WorkflowStatus};
use crate::workflows::inspection::repository::RepositoryError;
use crate::workflows::inspection::service::{NewInspection, ServiceError};
use crate::workflows::inspection::status::StatusError;

fn new_inspection(id: &str) -> NewInspection {
    NewInspection {
        inspection_id: InspectionId(id.to_string()),
        installation_code: "KAA".to_string(),
        tag: "23-PT-92".to_string(),
        inspection_description: "oil level gauge".to_string(),
        timestamp: Some(Utc::now()),
        raw_location: raw_location(&format!("{id}.jpg")),
    }
}

#[tokio::test]
async fn ingestion_creates_one_stage_per_mapped_kind() {
    let h = harness();
    h.mappings
        .add_kind("23-PT-92", "oil level gauge", AnalysisKind::Cloe)
        .expect("mapping");
    h.mappings
        .add_kind("23-PT-92", "oil level gauge", AnalysisKind::ThermalReading)
        .expect("mapping");

    let record = h
        .service
        .ingest_inspection_result(new_inspection("insp-1"))
        .await
        .expect("ingest");

    assert_eq!(
        record.configured_kinds(),
        vec![AnalysisKind::Cloe, AnalysisKind::ThermalReading]
    );
    for kind in record.configured_kinds() {
        assert_eq!(record.analysis_status(kind), Some(WorkflowStatus::NotStarted));
    }
    assert_eq!(record.anonymization.status, WorkflowStatus::NotStarted);

    // Derived locations keep container and name, swap accounts.
    assert_eq!(record.anonymization.source.storage_account, "plantrawdata");
    assert_eq!(
        record.anonymization.destination.storage_account,
        "plantanonymized"
    );
    assert_eq!(record.anonymization.destination.blob_name, "insp-1.jpg");
    let cloe = record.cloe.as_ref().expect("cloe stage");
    assert_eq!(cloe.source.storage_account, "plantanonymized");
    assert_eq!(cloe.destination.storage_account, "plantvisualized");
}

#[tokio::test]
async fn ingestion_kicks_off_the_anonymizer() {
    let h = harness();
    h.service
        .ingest_inspection_result(new_inspection("insp-1"))
        .await
        .expect("ingest");
    assert_eq!(h.engine.calls(), vec!["Anonymizer".to_string()]);
}

#[tokio::test]
async fn ingestion_with_no_mapping_creates_no_analysis_stages() {
    let h = harness();
    let record = h
        .service
        .ingest_inspection_result(new_inspection("insp-1"))
        .await
        .expect("ingest");
    assert!(record.configured_kinds().is_empty());
}

#[tokio::test]
async fn duplicate_inspection_id_is_rejected() {
    let h = harness();
    h.service
        .ingest_inspection_result(new_inspection("insp-1"))
        .await
        .expect("first ingest");
    let err = h
        .service
        .ingest_inspection_result(new_inspection("insp-1"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Repository(RepositoryError::Conflict(_))
    ));
    // Only the first ingest reached the engine.
    assert_eq!(h.engine.calls().len(), 1);
}

#[tokio::test]
async fn unexpected_storage_account_is_rejected() {
    let h = harness();
    let mut new = new_inspection("insp-1");
    new.raw_location = BlobLocation {
        storage_account: "someoneelsesdata".to_string(),
        blob_container: "inspections".to_string(),
        blob_name: "insp-1.jpg".to_string(),
    };
    let err = h.service.ingest_inspection_result(new).await.unwrap_err();
    assert!(matches!(err, ServiceError::Status(StatusError::Validation(_))));
    assert!(h.engine.calls().is_empty());
}

#[tokio::test]
async fn failed_initial_trigger_still_creates_the_record() {
    let h = harness();
    h.engine.fail_on("Anonymizer");
    h.service
        .ingest_inspection_result(new_inspection("insp-1"))
        .await
        .expect("ingest survives trigger failure");
    let record = h
        .service
        .trigger_anonymizer(&InspectionId("insp-1".to_string()))
        .await
        .err();
    // Engine still failing, but the record exists and stays NotStarted.
    assert!(record.is_some());
}
