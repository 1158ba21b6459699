use serde::{Deserialize, Serialize};

fn default_batch_size() -> usize {
    100
}

/// Wire form of a time model. The four shapes are distinguished
/// structurally (by which fields are present), so the enum is untagged;
/// enum-valued strings stay raw here and are checked during validation so
/// errors can name the offending record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum TimeModelDto {
    Function(FunctionTimeModelDto),
    Sample(SampleTimeModelDto),
    Schedule(ScheduledTimeModelDto),
    Distance(DistanceTimeModelDto),
}

impl TimeModelDto {
    pub fn id(&self) -> &str {
        match self {
            TimeModelDto::Function(dto) => &dto.id,
            TimeModelDto::Sample(dto) => &dto.id,
            TimeModelDto::Schedule(dto) => &dto.id,
            TimeModelDto::Distance(dto) => &dto.id,
        }
    }
}

/// `distribution_function` is one of `constant`, `normal`, `lognormal`,
/// `exponential`. `location`/`scale` parameterize the distribution;
/// exponential uses `location` as its mean.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FunctionTimeModelDto {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub distribution_function: String,
    pub location: f64,
    #[serde(default)]
    pub scale: f64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SampleTimeModelDto {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub samples: Vec<f64>,
    /// Draw uniformly from the list instead of cycling through it.
    #[serde(default)]
    pub randomize: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScheduledTimeModelDto {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub schedule: Vec<f64>,
    /// Entries are absolute timestamps rather than relative deltas.
    #[serde(default)]
    pub absolute: bool,
    #[serde(default)]
    pub cyclic: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DistanceTimeModelDto {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub speed: f64,
    pub reaction_time: f64,
    /// `manhattan` or `euclidean`.
    pub metric: String,
}
