use serde::{Deserialize, Serialize};

/// Wire form of a process. `type` is one of `ProductionProcesses`,
/// `TransportProcesses`, `CapabilityProcess`, `RequiredCapabilityProcess`,
/// `LinkTransportProcess`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProcessDto {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_model_id: Option<String>,
    /// Capability tag offered (CapabilityProcess) or demanded
    /// (RequiredCapabilityProcess).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    /// Enables lot formation for this process.
    #[serde(default)]
    pub lot_dependency: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_lot_size: Option<usize>,
    /// Auxiliary ids whose copies must be held per activity.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_dependencies: Vec<String>,
    /// Link transport only: the `[from, to]` entity pairs this process may
    /// carry a product between.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<[String; 2]>,
}
