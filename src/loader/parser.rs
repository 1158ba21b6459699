use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

use crate::api::system_model_dto::SystemModelDto;
use crate::error::Result;

/// Parses a JSON file into a given type `T`.
///
/// This function reads a file from `file_path`, attempts to parse it
/// as JSON, and returns an instance of `T`.
///
/// Errors are automatically converted into `crate::error::Error` variants:
/// - `Error::Io` if the file cannot be read.
/// - `Error::Deserialization` if the JSON is malformed.
pub fn parse_json_file<T: DeserializeOwned>(file_path: impl AsRef<Path>) -> Result<T> {
    let data = fs::read_to_string(file_path)?;

    let parsed_data: T = serde_json::from_str(&data)?;

    Ok(parsed_data)
}

/// Reads a system model configuration from disk.
pub fn parse_system_model(file_path: impl AsRef<Path>) -> Result<SystemModelDto> {
    parse_json_file::<SystemModelDto>(file_path)
}
