use serde::{Deserialize, Serialize};

/// Wire form of an auxiliary (tool/carrier) type. `quantity_in_storages`
/// pairs with `storages` by position.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuxiliaryDto {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub storages: Vec<String>,
    pub quantity_in_storages: Vec<i64>,
    /// Processes that require one copy per activity.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relevant_processes: Vec<String>,
}
