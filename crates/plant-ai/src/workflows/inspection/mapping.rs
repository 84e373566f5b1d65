//! Registry mapping plant equipment to the analyses its inspections
//! require. Lookups match on installation tag plus inspection
//! description, compared case-insensitively after trimming.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::domain::AnalysisKind;

#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("mapping {0} not found")]
    MappingNotFound(String),
    #[error("analysis {kind} already configured for mapping {id}")]
    DuplicateKind { id: String, kind: &'static str },
    #[error("analysis {kind} not configured for mapping {id}")]
    KindNotFound { id: String, kind: &'static str },
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMapping {
    pub id: String,
    pub tag: String,
    pub inspection_description: String,
    pub analyses: Vec<AnalysisKind>,
}

fn matches(candidate: &str, query: &str) -> bool {
    candidate.trim().eq_ignore_ascii_case(query.trim())
}

/// In-memory mapping store. Interior mutability so callers can share it
/// behind an `Arc` without wrapping it themselves.
pub struct AnalysisMappingRegistry {
    mappings: Mutex<Vec<AnalysisMapping>>,
    next_id: AtomicU64,
}

impl Default for AnalysisMappingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisMappingRegistry {
    pub fn new() -> Self {
        Self {
            mappings: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate_id(&self) -> String {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("map-{id:06}")
    }

    /// The analyses configured for an equipment position, in the fixed
    /// dispatch order. Empty when no mapping matches.
    pub fn analyses_for(&self, tag: &str, inspection_description: &str) -> Vec<AnalysisKind> {
        let mappings = self.mappings.lock().expect("mapping registry mutex poisoned");
        mappings
            .iter()
            .find(|m| matches(&m.tag, tag) && matches(&m.inspection_description, inspection_description))
            .map(|m| {
                AnalysisKind::ordered()
                    .into_iter()
                    .filter(|kind| m.analyses.contains(kind))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get(&self, id: &str) -> Result<AnalysisMapping, MappingError> {
        let mappings = self.mappings.lock().expect("mapping registry mutex poisoned");
        mappings
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| MappingError::MappingNotFound(id.to_string()))
    }

    pub fn list(&self) -> Vec<AnalysisMapping> {
        self.mappings
            .lock()
            .expect("mapping registry mutex poisoned")
            .clone()
    }

    /// Add `kind` to the mapping for `tag`/`inspection_description`,
    /// creating the mapping when it does not exist yet. Returns the
    /// updated mapping.
    pub fn add_kind(
        &self,
        tag: &str,
        inspection_description: &str,
        kind: AnalysisKind,
    ) -> Result<AnalysisMapping, MappingError> {
        if tag.trim().is_empty() {
            return Err(MappingError::EmptyField("tag"));
        }
        if inspection_description.trim().is_empty() {
            return Err(MappingError::EmptyField("inspection description"));
        }

        let mut mappings = self.mappings.lock().expect("mapping registry mutex poisoned");
        if let Some(mapping) = mappings
            .iter_mut()
            .find(|m| matches(&m.tag, tag) && matches(&m.inspection_description, inspection_description))
        {
            if mapping.analyses.contains(&kind) {
                return Err(MappingError::DuplicateKind {
                    id: mapping.id.clone(),
                    kind: kind.label(),
                });
            }
            mapping.analyses.push(kind);
            return Ok(mapping.clone());
        }

        let mapping = AnalysisMapping {
            id: self.allocate_id(),
            tag: tag.trim().to_string(),
            inspection_description: inspection_description.trim().to_string(),
            analyses: vec![kind],
        };
        mappings.push(mapping.clone());
        Ok(mapping)
    }

    /// Remove `kind` from a mapping by id. The mapping itself stays,
    /// even when its analysis list becomes empty.
    pub fn remove_kind(&self, id: &str, kind: AnalysisKind) -> Result<AnalysisMapping, MappingError> {
        let mut mappings = self.mappings.lock().expect("mapping registry mutex poisoned");
        let mapping = mappings
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| MappingError::MappingNotFound(id.to_string()))?;
        let before = mapping.analyses.len();
        mapping.analyses.retain(|k| *k != kind);
        if mapping.analyses.len() == before {
            return Err(MappingError::KindNotFound {
                id: id.to_string(),
                kind: kind.label(),
            });
        }
        Ok(mapping.clone())
    }

    pub fn remove_mapping(&self, id: &str) -> Result<AnalysisMapping, MappingError> {
        let mut mappings = self.mappings.lock().expect("mapping registry mutex poisoned");
        let index = mappings
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| MappingError::MappingNotFound(id.to_string()))?;
        Ok(mappings.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_trims_and_ignores_case() {
        let registry = AnalysisMappingRegistry::new();
        registry
            .add_kind("23-PT-92", "Oil Level Gauge", AnalysisKind::Cloe)
            .expect("add");
        assert_eq!(
            registry.analyses_for(" 23-pt-92 ", "oil level gauge"),
            vec![AnalysisKind::Cloe]
        );
        assert!(registry.analyses_for("23-PT-92", "valve").is_empty());
    }

    #[test]
    fn add_kind_reuses_matching_mapping() {
        let registry = AnalysisMappingRegistry::new();
        let first = registry
            .add_kind("23-PT-92", "gauge", AnalysisKind::ThermalReading)
            .expect("add first");
        let second = registry
            .add_kind("23-pt-92", "GAUGE", AnalysisKind::Cloe)
            .expect("add second");
        assert_eq!(first.id, second.id);
        // Reported in dispatch order regardless of insertion order.
        assert_eq!(
            registry.analyses_for("23-PT-92", "gauge"),
            vec![AnalysisKind::Cloe, AnalysisKind::ThermalReading]
        );
    }

    #[test]
    fn duplicate_kind_is_rejected() {
        let registry = AnalysisMappingRegistry::new();
        registry
            .add_kind("23-PT-92", "gauge", AnalysisKind::Cloe)
            .expect("add");
        let err = registry
            .add_kind("23-PT-92", "gauge", AnalysisKind::Cloe)
            .unwrap_err();
        assert!(matches!(err, MappingError::DuplicateKind { .. }));
    }

    #[test]
    fn remove_kind_keeps_empty_mapping() {
        let registry = AnalysisMappingRegistry::new();
        let mapping = registry
            .add_kind("23-PT-92", "gauge", AnalysisKind::Cloe)
            .expect("add");
        let updated = registry
            .remove_kind(&mapping.id, AnalysisKind::Cloe)
            .expect("remove");
        assert!(updated.analyses.is_empty());
        assert!(registry.get(&mapping.id).is_ok());
    }

    #[test]
    fn remove_missing_kind_or_mapping_errors() {
        let registry = AnalysisMappingRegistry::new();
        let mapping = registry
            .add_kind("23-PT-92", "gauge", AnalysisKind::Cloe)
            .expect("add");
        assert!(matches!(
            registry.remove_kind(&mapping.id, AnalysisKind::Fencilla),
            Err(MappingError::KindNotFound { .. })
        ));
        assert!(matches!(
            registry.remove_mapping("map-999999"),
            Err(MappingError::MappingNotFound(_))
        ));
    }
}
