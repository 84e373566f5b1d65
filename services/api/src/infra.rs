use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use plant_ai::workflows::inspection::{
    InspectionId, InspectionRecord, RecordRepository, RepositoryError, StatusError, UpdateError,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Record store shipped with the service. One mutex over the whole
/// map: `update_with` holds it across the check-then-update so
/// concurrent stage transitions on one record serialize.
#[derive(Default)]
pub(crate) struct InMemoryRecordRepository {
    records: Mutex<HashMap<String, InspectionRecord>>,
}

impl RecordRepository for InMemoryRecordRepository {
    fn insert(&self, record: InspectionRecord) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let key = record.inspection_id.0.clone();
        if guard.contains_key(&key) {
            return Err(RepositoryError::Conflict(record.inspection_id));
        }
        guard.insert(key, record);
        Ok(())
    }

    fn fetch(&self, id: &InspectionId) -> Result<InspectionRecord, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        guard
            .get(&id.0)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.clone()))
    }

    fn update_with(
        &self,
        id: &InspectionId,
        apply: &mut dyn FnMut(&mut InspectionRecord) -> Result<(), StatusError>,
    ) -> Result<InspectionRecord, UpdateError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        let record = guard
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
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|record| {
                record.tag.trim().eq_ignore_ascii_case(tag.trim())
                    && record
                        .inspection_description
                        .trim()
                        .eq_ignore_ascii_case(inspection_description.trim())
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use plant_ai::workflows::inspection::{BlobLocation, WorkflowStage, WorkflowStatus};

    fn record(id: &str) -> InspectionRecord {
        let raw = BlobLocation {
            storage_account: "plantrawdata".to_string(),
            blob_container: "inspections".to_string(),
            blob_name: format!("{id}.jpg"),
        };
        InspectionRecord {
            inspection_id: InspectionId(id.to_string()),
            installation_code: "KAA".to_string(),
            tag: "23-PT-92".to_string(),
            inspection_description: "oil level gauge".to_string(),
            created_at: Utc::now(),
            timestamp: None,
            anonymization: WorkflowStage::new(raw.clone(), raw),
            cloe: None,
            fencilla: None,
            thermal_reading: None,
        }
    }

    #[test]
    fn insert_rejects_duplicates() {
        let repo = InMemoryRecordRepository::default();
        repo.insert(record("insp-1")).expect("first insert");
        assert!(matches!(
            repo.insert(record("insp-1")),
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[test]
    fn update_with_applies_under_the_lock() {
        let repo = InMemoryRecordRepository::default();
        repo.insert(record("insp-1")).expect("insert");
        let id = InspectionId("insp-1".to_string());

        let updated = repo
            .update_with(&id, &mut |record| {
                record.anonymization.status = WorkflowStatus::Started;
                Ok(())
            })
            .expect("update");
        assert_eq!(updated.anonymization.status, WorkflowStatus::Started);
        assert_eq!(
            repo.fetch(&id).expect("fetch").anonymization.status,
            WorkflowStatus::Started
        );

        let missing = repo.update_with(&InspectionId("nope".to_string()), &mut |_| Ok(()));
        assert!(matches!(
            missing,
            Err(UpdateError::Repository(RepositoryError::NotFound(_)))
        ));
    }

    #[test]
    fn lookup_by_position_trims_and_ignores_case() {
        let repo = InMemoryRecordRepository::default();
        repo.insert(record("insp-1")).expect("insert");
        let found = repo
            .find_by_tag_and_description(" 23-pt-92 ", "OIL LEVEL GAUGE")
            .expect("find");
        assert_eq!(found.len(), 1);
    }
}
