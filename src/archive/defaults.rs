//! Built-in rule set compiled into the binary

use super::loader::{Format, SnapshotBuilder};
use crate::error::ArchiveError;
use std::path::Path;

/// Label used for the embedded bundle in errors and logs
pub const DEFAULTS_LABEL: &str = "<builtin>/constitution.json";

const CONSTITUTION: &str = include_str!("defaults/constitution.json");

/// Add the built-in bundle to a builder
pub fn add_defaults(builder: &mut SnapshotBuilder) -> Result<(), ArchiveError> {
    builder.add_source(Path::new(DEFAULTS_LABEL), CONSTITUTION, Format::Json)
}
