//! Database file naming conventions.

use std::path::{Path, PathBuf};

/// Generate the canonical table file path: `<db>/NNNNNN.ldb`.
pub fn table_file_path(db_path: &Path, number: u64) -> PathBuf {
    db_path.join(format!("{:06}.ldb", number))
}

/// Generate the legacy table file path: `<db>/NNNNNN.sst`.
///
/// Older deployments wrote tables with this extension; readers fall
/// back to it when the canonical name is missing.
pub fn legacy_table_file_path(db_path: &Path, number: u64) -> PathBuf {
    db_path.join(format!("{:06}.sst", number))
}
