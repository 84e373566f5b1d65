//! Port for forwarding numeric inspection values to the plant
//! time-series store. Used both for thermal readings attached to
//! records and for raw `inspection_value` messages from the robots.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum TimeseriesError {
    #[error("time-series upload failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("time-series service rejected upload with status {status}")]
    Rejected { status: u16 },
}

/// One data point destined for the time-series store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeseriesPoint {
    /// Series name, built from installation, tag and measurement
    /// description with spaces collapsed to dashes.
    pub name: String,
    pub facility: String,
    pub external_id: String,
    pub description: String,
    pub unit: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub step: bool,
    pub metadata: BTreeMap<String, String>,
}

impl TimeseriesPoint {
    pub fn new(
        installation_code: &str,
        tag: &str,
        description: &str,
        unit: &str,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let slug = description.trim().replace(' ', "-");
        let name = format!("{installation_code}_{tag}_{slug}");
        let mut metadata = BTreeMap::new();
        metadata.insert("tag".to_string(), tag.to_string());
        Self {
            external_id: name.clone(),
            name,
            facility: installation_code.to_string(),
            description: description.to_string(),
            unit: unit.to_string(),
            value,
            timestamp,
            step: true,
            metadata,
        }
    }
}

#[async_trait]
pub trait TimeseriesSink: Send + Sync {
    async fn upload(&self, point: TimeseriesPoint) -> Result<(), TimeseriesError>;
}

pub struct HttpTimeseriesSink {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTimeseriesSink {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl TimeseriesSink for HttpTimeseriesSink {
    async fn upload(&self, point: TimeseriesPoint) -> Result<(), TimeseriesError> {
        let url = format!("{}/timeseries/data", self.base_url.trim_end_matches('/'));
        let response = self.client.post(url).json(&point).send().await?;
        if !response.status().is_success() {
            return Err(TimeseriesError::Rejected {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_name_joins_context_with_dashes() {
        let point = TimeseriesPoint::new(
            "KAA",
            "23-PT-92",
            "oil level gauge",
            "percentage",
            42.0,
            Utc::now(),
        );
        assert_eq!(point.name, "KAA_23-PT-92_oil-level-gauge");
        assert_eq!(point.external_id, point.name);
        assert_eq!(point.facility, "KAA");
    }
}
