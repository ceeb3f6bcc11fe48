pub mod file_store;
pub mod project_store;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::data::formats::{self, FormatError};
use crate::data::table::DataTable;
use crate::processing::functions::{FunctionDomainError, ParamValues, SeriesFunction};
use crate::state::label::LabelRoster;
use crate::state::plot_spec::PlotSpec;
use crate::state::settings::SessionOptions;

pub use file_store::FileStore;
pub use project_store::ProjectStore;

/// Session-level failures. Configuration failures are fatal with a
/// distinct exit code; per-file data failures only disqualify the file.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot read {path}: {source}")]
    BadFile { path: PathBuf, source: FormatError },
    #[error("cannot write {path}: {source}")]
    DataIo { path: PathBuf, source: FormatError },
    #[error("cannot access configuration file {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("configuration file {path} is malformed: {source}")]
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("none of the session's files could be opened")]
    NoUsableFiles,
    #[error("a column named \"{0}\" already exists")]
    DuplicateColumn(String),
    #[error("no data column at index {0}")]
    UnknownColumn(usize),
    #[error(transparent)]
    Function(#[from] FunctionDomainError),
}

impl SessionError {
    /// Process exit code when the error is fatal at startup.
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionError::ConfigIo { .. } | SessionError::ConfigParse { .. } => 2,
            SessionError::NoUsableFiles => 3,
            _ => 1,
        }
    }
}

/// Key under which files sharing a column schema are grouped in a project
/// manifest. The debug rendering of the header is stable and readable in
/// the JSON.
pub fn header_signature(header: &[String]) -> String {
    format!("{header:?}")
}

/// Per-schema layout block of a project manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaBlock {
    pub plot: Vec<Vec<usize>>,
    #[serde(default)]
    pub normalize: Vec<usize>,
    /// Names of derived columns registered for this schema, in creation
    /// order.
    #[serde(default)]
    pub functions: Vec<String>,
}

impl SchemaBlock {
    pub fn from_spec(spec: &PlotSpec, functions: Vec<String>) -> Self {
        Self {
            plot: spec.plot.clone(),
            normalize: spec.normalize.clone(),
            functions,
        }
    }

    pub fn spec(&self) -> PlotSpec {
        PlotSpec {
            plot: self.plot.clone(),
            normalize: self.normalize.clone(),
        }
    }
}

/// On-disk shape of a per-file sidecar config (`<file>.json` next to the
/// data file).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarConfig {
    pub labels: Vec<String>,
    pub colors: Vec<String>,
    pub plot: Vec<Vec<usize>>,
    #[serde(default)]
    pub normalize: Vec<usize>,
    #[serde(default)]
    pub functions: Vec<String>,
    #[serde(default, skip_serializing_if = "SessionOptions::is_default")]
    pub options: SessionOptions,
}

/// On-disk shape of a project manifest. Schema blocks are flattened next
/// to the fixed fields, keyed by header signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectManifest {
    pub files: Vec<String>,
    pub labels: Vec<String>,
    pub colors: Vec<String>,
    #[serde(default, skip_serializing_if = "SessionOptions::is_default")]
    pub options: SessionOptions,
    #[serde(flatten)]
    pub schemas: std::collections::BTreeMap<String, SchemaBlock>,
}

/// The session surface the application drives, independent of whether the
/// configuration lives in per-file sidecars or a project manifest.
pub trait ConfigStore {
    fn table(&self) -> &DataTable;
    fn table_mut(&mut self) -> &mut DataTable;
    fn current_path(&self) -> &Path;
    fn file_position(&self) -> (usize, usize);

    /// Move to the next/previous usable file, skipping and remembering bad
    /// ones, wrapping around the list.
    fn next_file(&mut self) -> Result<(), SessionError>;
    fn prev_file(&mut self) -> Result<(), SessionError>;

    fn roster(&self) -> &LabelRoster;
    fn roster_mut(&mut self) -> &mut LabelRoster;
    /// Replace the roster contents. Unlike cursor movement this is
    /// persisted.
    fn set_roster(&mut self, names: Vec<String>, colors: Vec<String>);

    fn plot_spec(&self) -> &PlotSpec;
    fn set_plot_spec(&mut self, spec: PlotSpec);

    fn registered_functions(&self) -> &[String];
    /// Evaluate a derived column and append it. Nothing is mutated when
    /// evaluation fails.
    fn add_function(
        &mut self,
        name: &str,
        source: usize,
        function: &dyn SeriesFunction,
        params: &ParamValues,
    ) -> Result<(), SessionError>;
    /// Remove the derived column at a data-header index and rebase the
    /// layout past it.
    fn remove_function(&mut self, header_index: usize);

    fn options(&self) -> SessionOptions;
    fn set_options(&mut self, options: SessionOptions);

    fn is_dirty(&self) -> bool;
    /// Flag that labels or cell data changed and the data file needs
    /// rewriting.
    fn mark_data_dirty(&mut self);

    /// Persist whatever is dirty: the data file, the configuration, or
    /// both. A no-op when clean.
    fn save(&mut self) -> Result<(), SessionError>;
}

/// State shared by both store kinds: the file list with its cursor and
/// bad-file set, the roster, the options, the loaded table, and the two
/// dirty flags.
pub(crate) struct SessionCore {
    pub files: Vec<PathBuf>,
    pub current: usize,
    pub bad: HashSet<usize>,
    pub roster: LabelRoster,
    pub options: SessionOptions,
    pub table: DataTable,
    pub config_dirty: bool,
    pub data_dirty: bool,
}

impl SessionCore {
    /// File indices in the order navigation should try them: every other
    /// file first, wrapping around, the current file last. A single-file
    /// session therefore re-yields its only file.
    pub fn candidates(&self, forward: bool) -> Vec<usize> {
        let n = self.files.len();
        let step = if forward { 1 } else { n - 1 };
        (1..=n).map(|k| (self.current + k * step) % n).collect()
    }

    pub fn mark_bad(&mut self, index: usize, err: &FormatError) {
        warn!(file = %self.files[index].display(), error = %err, "skipping unusable file");
        self.bad.insert(index);
    }
}

/// All files in a folder whose extension a registered format handles,
/// sorted by name.
pub fn discover_files(folder: &Path) -> Result<Vec<PathBuf>, SessionError> {
    let known = formats::known_extensions();
    let entries = std::fs::read_dir(folder).map_err(|source| SessionError::ConfigIo {
        path: folder.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase())
                .is_some_and(|e| known.contains(&e.as_str()))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Scaffold a fresh project manifest in `folder` listing `files` (stored
/// relative to the folder) and the given roster. Returns the manifest
/// path.
pub fn init_project(
    folder: &Path,
    files: &[PathBuf],
    roster: &LabelRoster,
) -> Result<PathBuf, SessionError> {
    let manifest = ProjectManifest {
        files: files
            .iter()
            .map(|p| {
                p.strip_prefix(folder)
                    .unwrap_or(p)
                    .to_string_lossy()
                    .into_owned()
            })
            .collect(),
        labels: roster.names().to_vec(),
        colors: roster.colors().to_vec(),
        options: SessionOptions::default(),
        schemas: Default::default(),
    };
    let path = folder.join("project.json");
    write_json(&path, &manifest)?;
    Ok(path)
}

pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), SessionError> {
    let body = serde_json::to_string_pretty(value).map_err(|source| SessionError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, body).map_err(|source| SessionError::ConfigIo {
        path: path.to_path_buf(),
        source,
    })
}

/// Evaluate-then-append shared by both stores. The layout is untouched;
/// new columns become plottable through the content menu.
pub(crate) fn evaluate_function(
    table: &DataTable,
    name: &str,
    source: usize,
    function: &dyn SeriesFunction,
    params: &ParamValues,
) -> Result<Vec<f64>, SessionError> {
    if table.data_header().iter().any(|n| n == name) {
        return Err(SessionError::DuplicateColumn(name.to_string()));
    }
    let values = table
        .column(source)
        .ok_or(SessionError::UnknownColumn(source))?;
    let input = crate::processing::functions::SourceSeries {
        values,
        timestamp: table.timestamp_seconds(),
    };
    Ok(function.apply(input, params)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_failure_class() {
        let config = SessionError::ConfigIo {
            path: PathBuf::from("p.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(config.exit_code(), 2);
        assert_eq!(SessionError::NoUsableFiles.exit_code(), 3);
        assert_eq!(
            SessionError::DuplicateColumn("x".to_string()).exit_code(),
            1
        );
    }

    #[test]
    fn header_signature_distinguishes_schemas() {
        let a = header_signature(&["acc".to_string(), "gyro".to_string()]);
        let b = header_signature(&["acc".to_string()]);
        assert_ne!(a, b);
        assert_eq!(
            a,
            header_signature(&["acc".to_string(), "gyro".to_string()])
        );
    }

    #[test]
    fn manifest_flattens_schema_blocks() {
        let mut schemas = std::collections::BTreeMap::new();
        schemas.insert(
            "[\"acc\"]".to_string(),
            SchemaBlock {
                plot: vec![vec![0]],
                normalize: vec![],
                functions: vec![],
            },
        );
        let manifest = ProjectManifest {
            files: vec!["a.csv".to_string()],
            labels: vec!["L".to_string()],
            colors: vec!["#112233".to_string()],
            options: SessionOptions::default(),
            schemas,
        };
        let json = serde_json::to_string(&manifest).unwrap();
        assert!(json.contains("\"[\\\"acc\\\"]\""));
        let back: ProjectManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.schemas.len(), 1);
        assert!(back.options.is_default());
    }

    #[test]
    fn candidate_order_wraps_and_ends_on_current() {
        let core = SessionCore {
            files: vec![
                PathBuf::from("a.csv"),
                PathBuf::from("b.csv"),
                PathBuf::from("c.csv"),
            ],
            current: 1,
            bad: HashSet::new(),
            roster: LabelRoster::default(),
            options: SessionOptions::default(),
            table: test_table(),
            config_dirty: false,
            data_dirty: false,
        };
        assert_eq!(core.candidates(true), vec![2, 0, 1]);
        assert_eq!(core.candidates(false), vec![0, 2, 1]);
    }

    fn test_table() -> DataTable {
        use crate::data::formats::RawTable;
        DataTable::from_raw(
            &PathBuf::from("a.csv"),
            RawTable {
                headers: vec!["v".to_string()],
                columns: vec![vec!["1".to_string()]],
            },
            &[],
        )
        .unwrap()
    }
}
