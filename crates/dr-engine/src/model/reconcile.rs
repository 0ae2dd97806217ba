use serde::{Deserialize, Serialize};

use super::PropertyMap;

/// Selects what to reconcile. Empty lists mean "everything".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRequest {
    #[serde(default)]
    pub inputs: PropertyMap,
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub objects: Vec<ReconcileObject>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileObject {
    pub object_id: i64,
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub inputs: PropertyMap,
}

impl ReconcileObject {
    pub fn new(object_id: i64) -> Self {
        Self {
            object_id,
            ..Default::default()
        }
    }
}
