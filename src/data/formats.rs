use std::path::Path;

use thiserror::Error;

use crate::data::csv_format::CsvFormat;

/// Errors produced by tabular format readers/writers.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The file extension is not in the format registry.
    #[error("unrecognized file format: .{0}")]
    Unrecognized(String),
    /// The file was found but could not be parsed into a table.
    #[error("malformed file: {0}")]
    Bad(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A row-oriented table in raw string form, column-major, exactly as it is
/// exchanged with a format reader/writer. No role partitioning happens at
/// this layer.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    /// `columns[col][row]`, padded so every column has the same length.
    pub columns: Vec<Vec<String>>,
}

impl RawTable {
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }
}

/// A tabular file format, keyed by file extension.
pub trait TabularFormat: Sync {
    /// Lowercase extensions (without the dot) this format handles.
    fn extensions(&self) -> &'static [&'static str];
    fn read(&self, path: &Path) -> Result<RawTable, FormatError>;
    fn save(&self, table: &RawTable, path: &Path) -> Result<(), FormatError>;
}

// Static registry, populated at startup, looked up by exact extension.
static FORMATS: [&(dyn TabularFormat); 1] = [&CsvFormat];

pub fn registry() -> &'static [&'static dyn TabularFormat] {
    &FORMATS
}

/// All extensions any registered format handles; used for file discovery.
pub fn known_extensions() -> Vec<&'static str> {
    registry().iter().flat_map(|f| f.extensions()).copied().collect()
}

/// Resolve the format for a path by its extension.
pub fn format_for(path: &Path) -> Result<&'static dyn TabularFormat, FormatError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    registry()
        .iter()
        .find(|f| f.extensions().contains(&ext.as_str()))
        .copied()
        .ok_or(FormatError::Unrecognized(ext))
}
