pub mod auxiliary_dto;
pub mod process_dto;
pub mod product_dto;
pub mod queue_dto;
pub mod resource_dto;
pub mod source_sink_dto;
pub mod state_dto;
pub mod system_model_dto;
pub mod time_model_dto;

use std::fs;
use std::path::Path;

use crate::api::system_model_dto::SystemModelDto;
use crate::error::Result;

/// Serializes a configuration in its normalized form (collections sorted by
/// `ID`, pretty-printed).
pub fn to_normalized_json(dto: &SystemModelDto) -> Result<String> {
    let mut normalized = dto.clone();
    normalized.normalize();
    Ok(serde_json::to_string_pretty(&normalized)?)
}

/// Writes the normalized configuration to `path`.
pub fn save_to_path(dto: &SystemModelDto, path: impl AsRef<Path>) -> Result<()> {
    let json = to_normalized_json(dto)?;
    fs::write(path, json)?;
    Ok(())
}
