use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A product's required processes: either an ordered list or a precedence
/// graph `{process -> [successors]}`. The map form uses a `BTreeMap` so a
/// round-tripped configuration serializes identically.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ProcessPlanDto {
    List(Vec<String>),
    Precedence(BTreeMap<String, Vec<String>>),
}

/// Wire form of a product type.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProductDto {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub processes: ProcessPlanDto,
    /// The transport process moving this product between stations; omitted
    /// means moves are immediate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_process: Option<String>,
}
