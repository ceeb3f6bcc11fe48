use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::data::formats::{self, FormatError, RawTable};
use crate::state::label::LabelEntry;

/// A column literally named this marks the chronological axis.
pub const TIMESTAMP_COLUMN: &str = "Timestamp";

/// Timestamp formats tried in order when parsing the chronological column.
const TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%H:%M:%S%.f",
];

/// The chronological axis: original cell text (kept verbatim for saving)
/// plus the parsed epoch seconds, and the column's position among the
/// non-label columns of the source file.
#[derive(Debug, Clone)]
struct TimeAxis {
    raw: Vec<String>,
    seconds: Vec<f64>,
    position: usize,
}

/// The loaded table: an ordered mapping from column name to numeric values,
/// with columns partitioned into timestamp / label / function / plain data
/// roles. `names`/`columns` hold exactly the data header (non-timestamp,
/// non-label, function columns appended last); extracted labels live in
/// `labels` as canonical row-index ranges.
#[derive(Debug, Clone)]
pub struct DataTable {
    path: PathBuf,
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    function_names: Vec<String>,
    timestamp: Option<TimeAxis>,
    row_count: usize,
    pub labels: Vec<LabelEntry>,
}

impl DataTable {
    /// Read a file through its registered format and partition the columns.
    pub fn load(path: &Path, roster_names: &[String]) -> Result<Self, FormatError> {
        let io = formats::format_for(path)?;
        let raw = io.read(path)?;
        Self::from_raw(path, raw, roster_names)
    }

    pub fn from_raw(
        path: &Path,
        raw: RawTable,
        roster_names: &[String],
    ) -> Result<Self, FormatError> {
        let row_count = raw.row_count();
        let mut names = Vec::new();
        let mut columns = Vec::new();
        let mut labels = Vec::new();
        let mut timestamp = None;
        let mut visible_pos = 0usize;

        for (name, cells) in raw.headers.into_iter().zip(raw.columns.into_iter()) {
            if let Some((base, scope)) = LabelEntry::parse_column_name(&name, roster_names) {
                // Label columns leave the visible table; only the range of
                // their set run is retained.
                if let Some(range) = set_run(&cells) {
                    labels.push(LabelEntry::new(base, range, scope));
                }
                continue;
            }

            if name == TIMESTAMP_COLUMN && timestamp.is_none() {
                if let Some(seconds) = parse_time_column(&cells) {
                    timestamp = Some(TimeAxis {
                        raw: cells,
                        seconds,
                        position: visible_pos,
                    });
                    visible_pos += 1;
                    continue;
                }
                // Unparseable chronological column degrades to plain data.
            }

            columns.push(parse_numeric_column(&cells));
            names.push(name);
            visible_pos += 1;
        }

        if names.is_empty() {
            return Err(FormatError::Bad("no data columns".to_string()));
        }

        Ok(Self {
            path: path.to_path_buf(),
            names,
            columns,
            function_names: Vec::new(),
            timestamp,
            row_count,
            labels,
        })
    }

    /// Ordered names excluding timestamp and label columns; function columns
    /// included. This is the index space PlotSpec refers to.
    pub fn data_header(&self) -> &[String] {
        &self.names
    }

    pub fn header_len(&self) -> usize {
        self.names.len()
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn column(&self, header_index: usize) -> Option<&[f64]> {
        self.columns.get(header_index).map(Vec::as_slice)
    }

    pub fn timestamp_seconds(&self) -> Option<&[f64]> {
        self.timestamp.as_ref().map(|t| t.seconds.as_slice())
    }

    pub fn function_names(&self) -> &[String] {
        &self.function_names
    }

    pub fn is_function_column(&self, header_index: usize) -> bool {
        self.names
            .get(header_index)
            .is_some_and(|n| self.function_names.iter().any(|f| f == n))
    }

    /// Mark the columns whose names appear in `registered` as function
    /// columns, in the order they occur in the header. Called right after
    /// load, once the active config is known.
    pub fn set_function_names(&mut self, registered: &[String]) {
        self.function_names = self
            .names
            .iter()
            .filter(|n| registered.iter().any(|r| r == *n))
            .cloned()
            .collect();
    }

    /// Append a derived column. The caller guarantees the name is unique
    /// and the series has `row_count` values.
    pub fn add_function(&mut self, name: &str, values: Vec<f64>) {
        debug_assert_eq!(values.len(), self.row_count);
        self.names.push(name.to_string());
        self.columns.push(values);
        self.function_names.push(name.to_string());
    }

    /// Drop a derived column by name. Returns the data-header index it
    /// occupied so the caller can rebase its PlotSpec; PlotSpec itself is
    /// never touched here.
    pub fn remove_function(&mut self, name: &str) -> Option<usize> {
        let idx = self
            .names
            .iter()
            .position(|n| n == name && self.function_names.iter().any(|f| f == n))?;
        self.names.remove(idx);
        self.columns.remove(idx);
        self.function_names.retain(|f| f != name);
        Some(idx)
    }

    /// Rebuild the on-disk table: original non-function columns (with the
    /// timestamp back in place) ++ function columns ++ one marker column per
    /// label.
    pub fn to_raw(&self) -> RawTable {
        let mut headers = Vec::new();
        let mut columns: Vec<Vec<String>> = Vec::new();

        for (name, values) in self.names.iter().zip(&self.columns) {
            if self.function_names.iter().any(|f| f == name) {
                continue;
            }
            headers.push(name.clone());
            columns.push(values.iter().map(|&v| format_value(v)).collect());
        }

        if let Some(axis) = &self.timestamp {
            let at = axis.position.min(headers.len());
            headers.insert(at, TIMESTAMP_COLUMN.to_string());
            columns.insert(at, axis.raw.clone());
        }

        for name in &self.function_names {
            if let Some(idx) = self.names.iter().position(|n| n == name) {
                headers.push(name.clone());
                columns.push(self.columns[idx].iter().map(|&v| format_value(v)).collect());
            }
        }

        for label in &self.labels {
            headers.push(label.column_name());
            columns.push(marker_column(label.range, self.row_count));
        }

        RawTable { headers, columns }
    }

    /// Write the table back through its format.
    pub fn save(&self) -> Result<(), FormatError> {
        let io = formats::format_for(&self.path)?;
        io.save(&self.to_raw(), &self.path)
    }
}

fn parse_numeric_column(cells: &[String]) -> Vec<f64> {
    cells
        .iter()
        .map(|s| s.trim().parse::<f64>().unwrap_or(f64::NAN))
        .collect()
}

/// First and last "set" row of a marker column. A cell is set when it holds
/// a nonzero number.
fn set_run(cells: &[String]) -> Option<(usize, usize)> {
    let mut first = None;
    let mut last = None;
    for (i, cell) in cells.iter().enumerate() {
        let set = cell.trim().parse::<f64>().is_ok_and(|v| v != 0.0);
        if set {
            if first.is_none() {
                first = Some(i);
            }
            last = Some(i);
        }
    }
    Some((first?, last?))
}

fn marker_column(range: (usize, usize), rows: usize) -> Vec<String> {
    let mut cells = vec![String::new(); rows];
    let end = range.1.min(rows.saturating_sub(1));
    for cell in cells.iter_mut().take(end + 1).skip(range.0) {
        *cell = "1".to_string();
    }
    cells
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        v.to_string()
    }
}

/// Parse the chronological column to epoch seconds: a chrono format list is
/// tried first, then a plain numeric interpretation.
fn parse_time_column(cells: &[String]) -> Option<Vec<f64>> {
    let probe = cells.iter().find(|c| !c.trim().is_empty())?;
    for fmt in TIME_FORMATS {
        if NaiveDateTime::parse_from_str(probe.trim(), fmt).is_ok()
            || chrono::NaiveTime::parse_from_str(probe.trim(), fmt).is_ok()
        {
            return parse_all_with(cells, fmt);
        }
    }
    // Numeric timestamps (already in seconds) are accepted as-is.
    let numeric: Vec<f64> = cells
        .iter()
        .map(|c| c.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    Some(numeric)
}

fn parse_all_with(cells: &[String], fmt: &str) -> Option<Vec<f64>> {
    let mut seconds = Vec::with_capacity(cells.len());
    for cell in cells {
        let value = cell.trim();
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            seconds.push(dt.and_utc().timestamp_millis() as f64 / 1000.0);
        } else if let Ok(t) = chrono::NaiveTime::parse_from_str(value, fmt) {
            let midnight = chrono::NaiveTime::from_hms_opt(0, 0, 0)?;
            seconds.push((t - midnight).num_milliseconds() as f64 / 1000.0);
        } else {
            return None;
        }
    }
    Some(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::label::LabelScope;
    use std::path::PathBuf;

    fn roster() -> Vec<String> {
        vec!["Walk".to_string(), "Run".to_string()]
    }

    fn raw(headers: &[&str], columns: &[&[&str]]) -> RawTable {
        RawTable {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            columns: columns
                .iter()
                .map(|c| c.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    fn table_with_label() -> DataTable {
        let raw = raw(
            &["Timestamp", "acc", "gyro", "Walk"],
            &[
                &["2021-03-01 10:00:00", "2021-03-01 10:00:01", "2021-03-01 10:00:02"],
                &["1.0", "2.0", "3.0"],
                &["0.1", "0.2", "0.3"],
                &["", "1", "1"],
            ],
        );
        DataTable::from_raw(&PathBuf::from("walk.csv"), raw, &roster()).unwrap()
    }

    #[test]
    fn header_excludes_timestamp_and_labels() {
        let table = table_with_label();
        assert_eq!(table.data_header(), ["acc", "gyro"]);
        assert_eq!(table.row_count(), 3);
        assert!(table.timestamp_seconds().is_some());
    }

    #[test]
    fn label_run_is_extracted_with_inclusive_bounds() {
        let table = table_with_label();
        assert_eq!(table.labels.len(), 1);
        assert_eq!(table.labels[0].name, "Walk");
        assert_eq!(table.labels[0].range, (1, 2));
        assert_eq!(table.labels[0].scope, LabelScope::All);
    }

    #[test]
    fn labels_round_trip_through_marker_columns() {
        let mut table = table_with_label();
        table.labels.push(LabelEntry::new("Run", (0, 0), LabelScope::Subplot(1)));

        let raw = table.to_raw();
        let back = DataTable::from_raw(&PathBuf::from("walk.csv"), raw, &roster()).unwrap();
        assert_eq!(back.labels, table.labels);
        assert_eq!(back.data_header(), table.data_header());
    }

    #[test]
    fn save_order_is_originals_functions_labels() {
        let mut table = table_with_label();
        table.add_function("acc_avg", vec![1.0, 1.5, 2.5]);
        let raw = table.to_raw();
        assert_eq!(
            raw.headers,
            vec!["Timestamp", "acc", "gyro", "acc_avg", "Walk"]
        );
        // Timestamp cells are written back verbatim.
        assert_eq!(raw.columns[0][0], "2021-03-01 10:00:00");
    }

    #[test]
    fn remove_function_reports_header_index_and_keeps_others() {
        let mut table = table_with_label();
        table.add_function("f1", vec![0.0; 3]);
        table.add_function("f2", vec![0.0; 3]);
        assert_eq!(table.remove_function("f1"), Some(2));
        assert_eq!(table.data_header(), ["acc", "gyro", "f2"]);
        assert!(table.is_function_column(2));
        // Plain data columns cannot be removed through the function path.
        assert_eq!(table.remove_function("acc"), None);
    }

    #[test]
    fn function_membership_is_restored_from_registered_names() {
        let raw = raw(
            &["acc", "acc_deriv"],
            &[&["1", "2"], &["0", "1"]],
        );
        let mut table = DataTable::from_raw(&PathBuf::from("d.csv"), raw, &[]).unwrap();
        table.set_function_names(&["acc_deriv".to_string()]);
        assert!(!table.is_function_column(0));
        assert!(table.is_function_column(1));
    }

    #[test]
    fn numeric_timestamp_column_is_accepted() {
        let raw = raw(
            &["Timestamp", "v"],
            &[&["0.0", "0.5", "1.0"], &["1", "2", "3"]],
        );
        let table = DataTable::from_raw(&PathBuf::from("n.csv"), raw, &[]).unwrap();
        assert_eq!(table.timestamp_seconds().unwrap(), &[0.0, 0.5, 1.0]);
    }

    #[test]
    fn unparseable_timestamp_degrades_to_data_column() {
        let raw = raw(&["Timestamp", "v"], &[&["a", "b"], &["1", "2"]]);
        let table = DataTable::from_raw(&PathBuf::from("u.csv"), raw, &[]).unwrap();
        assert!(table.timestamp_seconds().is_none());
        assert_eq!(table.data_header(), ["Timestamp", "v"]);
    }

    #[test]
    fn all_empty_label_column_is_dropped_without_entry() {
        let raw = raw(&["v", "Walk"], &[&["1", "2"], &["", ""]]);
        let table = DataTable::from_raw(&PathBuf::from("e.csv"), raw, &roster()).unwrap();
        assert!(table.labels.is_empty());
        assert_eq!(table.data_header(), ["v"]);
    }
}
