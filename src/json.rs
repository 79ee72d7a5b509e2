//
// json.rs
// Dicom-Harmonize
//
// JSON form of the protocol descriptor: one object per parameter with value, unit and valid_range.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::Path;

use crate::error::Result;
use crate::protocol::ProtocolDescriptor;

/// Pretty JSON string without touching the filesystem.
pub fn to_json_string(descriptor: &ProtocolDescriptor) -> Result<String> {
    Ok(serde_json::to_string_pretty(descriptor)?)
}

pub fn from_json_str(document: &str) -> Result<ProtocolDescriptor> {
    Ok(serde_json::from_str(document)?)
}

/// Write the descriptor to `output`, or print it when no path is given.
pub fn write_json(descriptor: &ProtocolDescriptor, output: Option<&Path>) -> Result<()> {
    let json_string = to_json_string(descriptor)?;

    match output {
        Some(path) => std::fs::write(path, json_string)?,
        None => println!("{}", json_string),
    }

    Ok(())
}
