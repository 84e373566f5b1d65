//! Inbound message models. The broker delivers snake_case JSON where
//! every field is nominally required but may arrive null; validation
//! reports each missing field individually so upstream robots can be
//! fixed field by field.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::workflows::inspection::domain::{BlobLocation, InspectionId};
use crate::workflows::inspection::service::NewInspection;

#[derive(Debug, Clone, Deserialize)]
pub struct RawBlobPath {
    pub storage_account: Option<String>,
    pub blob_container: Option<String>,
    pub blob_name: Option<String>,
}

/// An `inspection_result` message as deserialized off the wire, before
/// required-field validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawInspectionResult {
    pub isar_id: Option<String>,
    pub robot_name: Option<String>,
    pub inspection_id: Option<String>,
    pub blob_storage_data_path: Option<RawBlobPath>,
    pub installation_code: Option<String>,
    pub tag_id: Option<String>,
    pub inspection_type: Option<String>,
    pub inspection_description: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawInspectionResult {
    /// Names of all required fields that are null or absent.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.isar_id.is_none() {
            missing.push("isar_id");
        }
        if self.robot_name.is_none() {
            missing.push("robot_name");
        }
        if self.inspection_id.is_none() {
            missing.push("inspection_id");
        }
        match &self.blob_storage_data_path {
            None => missing.push("blob_storage_data_path"),
            Some(path) => {
                if path.storage_account.is_none() {
                    missing.push("blob_storage_data_path.storage_account");
                }
                if path.blob_container.is_none() {
                    missing.push("blob_storage_data_path.blob_container");
                }
                if path.blob_name.is_none() {
                    missing.push("blob_storage_data_path.blob_name");
                }
            }
        }
        if self.installation_code.is_none() {
            missing.push("installation_code");
        }
        if self.tag_id.is_none() {
            missing.push("tag_id");
        }
        if self.inspection_type.is_none() {
            missing.push("inspection_type");
        }
        if self.inspection_description.is_none() {
            missing.push("inspection_description");
        }
        if self.timestamp.is_none() {
            missing.push("timestamp");
        }
        missing
    }

    /// The fully-populated view. Only valid once `missing_fields` is
    /// empty; otherwise `None`.
    pub fn validated(self) -> Option<NewInspection> {
        let path = self.blob_storage_data_path?;
        Some(NewInspection {
            inspection_id: InspectionId(self.inspection_id?),
            installation_code: self.installation_code?,
            tag: self.tag_id?,
            inspection_description: self.inspection_description?,
            timestamp: Some(self.timestamp?),
            raw_location: BlobLocation {
                storage_account: path.storage_account?,
                blob_container: path.blob_container?,
                blob_name: path.blob_name?,
            },
        })
    }
}

/// An `inspection_value` message: a single numeric reading taken by a
/// robot, forwarded straight to the time-series store.
#[derive(Debug, Clone, Deserialize)]
pub struct RawInspectionValue {
    pub isar_id: Option<String>,
    pub robot_name: Option<String>,
    pub installation_code: Option<String>,
    pub tag_id: Option<String>,
    pub inspection_description: Option<String>,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct InspectionValue {
    pub installation_code: String,
    pub tag: String,
    pub inspection_description: String,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
}

impl RawInspectionValue {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.isar_id.is_none() {
            missing.push("isar_id");
        }
        if self.robot_name.is_none() {
            missing.push("robot_name");
        }
        if self.installation_code.is_none() {
            missing.push("installation_code");
        }
        if self.tag_id.is_none() {
            missing.push("tag_id");
        }
        if self.inspection_description.is_none() {
            missing.push("inspection_description");
        }
        if self.value.is_none() {
            missing.push("value");
        }
        if self.unit.is_none() {
            missing.push("unit");
        }
        if self.timestamp.is_none() {
            missing.push("timestamp");
        }
        missing
    }

    pub fn validated(self) -> Option<InspectionValue> {
        Some(InspectionValue {
            installation_code: self.installation_code?,
            tag: self.tag_id?,
            inspection_description: self.inspection_description?,
            value: self.value?,
            unit: self.unit?,
            timestamp: self.timestamp?,
        })
    }
}
