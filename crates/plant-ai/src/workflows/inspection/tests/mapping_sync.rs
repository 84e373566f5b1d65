use super::common::{harness, record, with_anonymization_status};
use crate::workflows::inspection::domain::{AnalysisKind, CloeResult, InspectionId, WorkflowStatus};
use crate::workflows::inspection::mapping::MappingError;
use crate::workflows::inspection::repository::RecordRepository;
use crate::workflows::inspection::service::ServiceError;

#[tokio::test]
async fn adding_a_kind_backfills_existing_records() {
    let h = harness();
    h.records
        .insert(with_anonymization_status(
            record("insp-1", &[]),
            WorkflowStatus::ExitSuccess,
        ))
        .expect("insert");

    h.service
        .add_mapping_kind("23-PT-92", "oil level gauge", AnalysisKind::Cloe)
        .expect("add kind");

    let rec = h
        .records
        .fetch(&InspectionId("insp-1".to_string()))
        .expect("fetch");
    assert_eq!(rec.configured_kinds(), vec![AnalysisKind::Cloe]);
    assert_eq!(
        rec.analysis_status(AnalysisKind::Cloe),
        Some(WorkflowStatus::NotStarted)
    );
    // The pipeline reruns from the top.
    assert_eq!(rec.anonymization.status, WorkflowStatus::NotStarted);
}

#[tokio::test]
async fn backfill_leaves_unrelated_records_alone() {
    let h = harness();
    let mut other = record("insp-2", &[]);
    other.tag = "77-XX-01".to_string();
    h.records.insert(other).expect("insert");

    h.service
        .add_mapping_kind("23-PT-92", "oil level gauge", AnalysisKind::Cloe)
        .expect("add kind");

    let rec = h
        .records
        .fetch(&InspectionId("insp-2".to_string()))
        .expect("fetch");
    assert!(rec.configured_kinds().is_empty());
}

#[tokio::test]
async fn removing_a_kind_keeps_existing_stages_and_results() {
    let h = harness();
    let mapping = h
        .service
        .add_mapping_kind("23-PT-92", "oil level gauge", AnalysisKind::Cloe)
        .expect("add kind");

    let mut rec = record("insp-1", &[AnalysisKind::Cloe]);
    rec.cloe.as_mut().expect("stage").result = Some(CloeResult { oil_level: 42.0 });
    h.records.insert(rec).expect("insert");

    h.service
        .remove_mapping_kind(&mapping.id, AnalysisKind::Cloe)
        .expect("remove kind");

    let rec = h
        .records
        .fetch(&InspectionId("insp-1".to_string()))
        .expect("fetch");
    assert_eq!(
        rec.cloe.as_ref().and_then(|s| s.result),
        Some(CloeResult { oil_level: 42.0 })
    );
    assert_eq!(rec.anonymization.status, WorkflowStatus::NotStarted);
}

#[tokio::test]
async fn duplicate_kind_leaves_the_mapping_unchanged() {
    let h = harness();
    h.service
        .add_mapping_kind("23-PT-92", "oil level gauge", AnalysisKind::Cloe)
        .expect("add kind");
    let err = h
        .service
        .add_mapping_kind("23-PT-92", "Oil Level Gauge", AnalysisKind::Cloe)
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Mapping(MappingError::DuplicateKind { .. })
    ));
    let mappings = h.service.list_mappings();
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].analyses, vec![AnalysisKind::Cloe]);
}

#[tokio::test]
async fn deleting_a_mapping_stops_future_lookups() {
    let h = harness();
    let mapping = h
        .service
        .add_mapping_kind("23-PT-92", "oil level gauge", AnalysisKind::Cloe)
        .expect("add kind");
    h.service.remove_mapping(&mapping.id).expect("remove");
    assert!(h
        .mappings
        .analyses_for("23-PT-92", "oil level gauge")
        .is_empty());
    assert!(matches!(
        h.service.get_mapping(&mapping.id),
        Err(ServiceError::Mapping(MappingError::MappingNotFound(_)))
    ));
}
