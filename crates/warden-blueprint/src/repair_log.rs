//! Append-only audit trail of applied repairs (JSONL, one record per action).

use crate::repair::{RepairOperation, RepairTarget};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::Path;
use warden_core::{JsonlError, read_records_from_path};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairChange {
    pub operation: RepairOperation,
    pub target: RepairTarget,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairLogEntry {
    pub run_id: String,
    pub artifact_id: String,
    pub file_path: String,
    pub issue_id: String,
    pub description: String,
    pub changes: Vec<RepairChange>,
    pub timestamp: DateTime<Utc>,
    pub digest_before: String,
    pub digest_after: String,
}

pub fn read_repair_log(path: impl AsRef<Path>) -> Result<Vec<RepairLogEntry>, JsonlError> {
    read_records_from_path(path)
}
