//! Storage port for inspection records. Implementations must apply
//! `update_with` atomically so status checks and writes cannot
//! interleave across callers.

use super::domain::{InspectionId, InspectionRecord};
use super::status::StatusError;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record {0} already exists")]
    Conflict(InspectionId),
    #[error("record {0} not found")]
    NotFound(InspectionId),
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Status(#[from] StatusError),
}

pub trait RecordRepository: Send + Sync {
    fn insert(&self, record: InspectionRecord) -> Result<(), RepositoryError>;

    fn fetch(&self, id: &InspectionId) -> Result<InspectionRecord, RepositoryError>;

    /// Apply a mutation to the record under the store's lock. The
    /// closure's error aborts the update and leaves the record as it
    /// was; on success the updated record is returned.
    fn update_with(
        &self,
        id: &InspectionId,
        apply: &mut dyn FnMut(&mut InspectionRecord) -> Result<(), StatusError>,
    ) -> Result<InspectionRecord, UpdateError>;

    /// Records matching an equipment position, for mapping resync.
    fn find_by_tag_and_description(
        &self,
        tag: &str,
        inspection_description: &str,
    ) -> Result<Vec<InspectionRecord>, RepositoryError>;
}
