use serde::{Deserialize, Serialize};

/// Wire form of a queue. Capacity 0 means unbounded.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct QueueDto {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capacity: i64,
}

/// Wire form of a plain location node (a link-transport endpoint that is
/// neither resource, source nor sink).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NodeDto {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub location: [f64; 2],
}
