use std::path::Path;

use crate::api::system_model_dto::SystemModelDto;
use crate::error::Result;
use crate::loader::parser::parse_system_model;

pub mod api;
pub mod domain;
pub mod error;
pub mod loader;
pub mod logger;
pub mod runner;

pub use runner::Runner;

/// Loads and validates a system model configuration from a JSON file.
pub fn load_system_model(file_path: impl AsRef<Path>) -> Result<SystemModelDto> {
    let dto = parse_system_model(file_path)?;
    log::info!("JSON file parsed successfully.");

    loader::validate::validate(&dto)?;
    log::info!("System model '{}' validated successfully.", dto.id);

    Ok(dto)
}
