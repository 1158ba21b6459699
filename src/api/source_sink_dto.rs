use serde::{Deserialize, Serialize};

fn default_routing_heuristic() -> String {
    "random".to_string()
}

/// Wire form of a source. `routing_heuristic` is `random`,
/// `shortest_queue` or `FIFO` and is inherited by every product the source
/// mints.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SourceDto {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub location: [f64; 2],
    pub product_type: String,
    pub time_model_id: String,
    #[serde(default = "default_routing_heuristic")]
    pub routing_heuristic: String,
    pub output_queues: Vec<String>,
}

/// Wire form of a sink.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SinkDto {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub location: [f64; 2],
    pub product_type: String,
    pub input_queues: Vec<String>,
}
