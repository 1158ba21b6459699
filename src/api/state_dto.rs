use serde::{Deserialize, Serialize};

/// Wire form of a resource state machine. `type` is one of
/// `BreakDownState`, `ProcessBreakDownState`, `SetupState`; the optional
/// fields belong to specific types and are cross-checked during validation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StateDto {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub time_model_id: String,
    /// Breakdown types only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repair_time_model_id: Option<String>,
    /// Process breakdown only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<String>,
    /// Setup only: the configurations this transition connects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_setup: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_setup: Option<String>,
}
