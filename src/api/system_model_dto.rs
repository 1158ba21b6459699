use serde::{Deserialize, Serialize};

use crate::api::auxiliary_dto::AuxiliaryDto;
use crate::api::process_dto::ProcessDto;
use crate::api::product_dto::ProductDto;
use crate::api::queue_dto::{NodeDto, QueueDto};
use crate::api::resource_dto::ResourceDto;
use crate::api::source_sink_dto::{SinkDto, SourceDto};
use crate::api::state_dto::StateDto;
use crate::api::time_model_dto::TimeModelDto;

fn default_valid() -> bool {
    true
}

/// The top-level configuration object: every collection references the
/// others by `ID`. This is the stable wire format; `scenario_data` is
/// carried opaquely for outer tooling.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SystemModelDto {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub time_model_data: Vec<TimeModelDto>,
    #[serde(default)]
    pub state_data: Vec<StateDto>,
    #[serde(default)]
    pub process_data: Vec<ProcessDto>,
    #[serde(default)]
    pub queue_data: Vec<QueueDto>,
    #[serde(default)]
    pub node_data: Vec<NodeDto>,
    #[serde(default)]
    pub resource_data: Vec<ResourceDto>,
    #[serde(default)]
    pub product_data: Vec<ProductDto>,
    #[serde(default)]
    pub sink_data: Vec<SinkDto>,
    #[serde(default)]
    pub source_data: Vec<SourceDto>,
    #[serde(default)]
    pub auxiliary_data: Vec<AuxiliaryDto>,
    #[serde(default)]
    pub scenario_data: Option<serde_json::Value>,
    #[serde(default = "default_valid")]
    pub valid_configuration: bool,
    #[serde(default)]
    pub reconfiguration_cost: f64,
}

impl SystemModelDto {
    /// Sorts every collection by `ID` so that load -> save -> load yields a
    /// byte-identical file.
    pub fn normalize(&mut self) {
        self.time_model_data.sort_by(|a, b| a.id().cmp(b.id()));
        self.state_data.sort_by(|a, b| a.id.cmp(&b.id));
        self.process_data.sort_by(|a, b| a.id.cmp(&b.id));
        self.queue_data.sort_by(|a, b| a.id.cmp(&b.id));
        self.node_data.sort_by(|a, b| a.id.cmp(&b.id));
        self.resource_data.sort_by(|a, b| a.id.cmp(&b.id));
        self.product_data.sort_by(|a, b| a.id.cmp(&b.id));
        self.sink_data.sort_by(|a, b| a.id.cmp(&b.id));
        self.source_data.sort_by(|a, b| a.id.cmp(&b.id));
        self.auxiliary_data.sort_by(|a, b| a.id.cmp(&b.id));
    }
}
