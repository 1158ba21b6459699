use serde::{Deserialize, Serialize};

fn default_controller() -> String {
    "PipelineController".to_string()
}

fn default_control_policy() -> String {
    "FIFO".to_string()
}

/// Wire form of a resource. `controller` is `PipelineController` or
/// `TransportController`; `control_policy` is `FIFO`, `LIFO`, `SPT` or
/// `SPT_transport`. `process_capacities` pairs with `process_ids` by
/// position and defaults to the resource capacity when empty.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResourceDto {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub capacity: i64,
    pub location: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_location: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_location: Option<[f64; 2]>,
    #[serde(default = "default_controller")]
    pub controller: String,
    #[serde(default = "default_control_policy")]
    pub control_policy: String,
    pub process_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub process_capacities: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub state_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_queues: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_queues: Vec<String>,
}
