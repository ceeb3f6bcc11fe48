use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::{
    evaluate_function, write_json, ConfigStore, SessionCore, SessionError, SidecarConfig,
};
use crate::data::table::DataTable;
use crate::processing::functions::{ParamValues, SeriesFunction};
use crate::state::label::LabelRoster;
use crate::state::plot_spec::PlotSpec;
use crate::state::settings::SessionOptions;

/// Sidecar path of a data file: the full file name with `.json` appended,
/// so `walk.csv` pairs with `walk.csv.json`.
pub fn sidecar_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

/// One slot of the session as loaded from disk.
struct LoadedSlot {
    table: DataTable,
    spec: PlotSpec,
    functions: Vec<String>,
    roster: Option<(Vec<String>, Vec<String>)>,
    options: Option<SessionOptions>,
    /// The stored layout referenced columns the file no longer has and was
    /// replaced; persist the repair on the next save.
    repaired: bool,
}

/// Session backed by one sidecar config per data file. A file without a
/// sidecar gets a default configuration seeded in memory; nothing is
/// written until something actually changes.
pub struct FileStore {
    core: SessionCore,
    spec: PlotSpec,
    functions: Vec<String>,
}

impl FileStore {
    pub fn open(files: Vec<PathBuf>) -> Result<Self, SessionError> {
        if files.is_empty() {
            return Err(SessionError::NoUsableFiles);
        }
        let mut roster = LabelRoster::default();
        let mut options = SessionOptions::default();
        let mut bad = HashSet::new();

        for idx in 0..files.len() {
            match load_slot(&files[idx], roster.names()) {
                Ok(slot) => {
                    if let Some((names, colors)) = slot.roster {
                        roster.set_entries(names, colors);
                    }
                    if let Some(opts) = slot.options {
                        options = opts;
                    }
                    info!(file = %files[idx].display(), "session opened");
                    return Ok(Self {
                        core: SessionCore {
                            files,
                            current: idx,
                            bad,
                            roster,
                            options,
                            table: slot.table,
                            config_dirty: slot.repaired,
                            data_dirty: false,
                        },
                        spec: slot.spec,
                        functions: slot.functions,
                    });
                }
                Err(SessionError::BadFile { path, source }) => {
                    tracing::warn!(file = %path.display(), error = %source, "skipping unusable file");
                    bad.insert(idx);
                }
                Err(fatal) => return Err(fatal),
            }
        }
        Err(SessionError::NoUsableFiles)
    }

    fn navigate(&mut self, forward: bool) -> Result<(), SessionError> {
        for idx in self.core.candidates(forward) {
            if self.core.bad.contains(&idx) {
                continue;
            }
            match load_slot(&self.core.files[idx], self.core.roster.names()) {
                Ok(slot) => {
                    if let Some((names, colors)) = slot.roster {
                        self.core.roster.set_entries(names, colors);
                    }
                    if let Some(opts) = slot.options {
                        self.core.options = opts;
                    }
                    self.core.current = idx;
                    self.core.table = slot.table;
                    self.core.config_dirty = slot.repaired;
                    self.core.data_dirty = false;
                    self.spec = slot.spec;
                    self.functions = slot.functions;
                    debug!(file = %self.core.files[idx].display(), "switched file");
                    return Ok(());
                }
                Err(SessionError::BadFile { source, .. }) => self.core.mark_bad(idx, &source),
                Err(fatal) => return Err(fatal),
            }
        }
        Err(SessionError::NoUsableFiles)
    }

    fn sidecar(&self) -> SidecarConfig {
        SidecarConfig {
            labels: self.core.roster.names().to_vec(),
            colors: self.core.roster.colors().to_vec(),
            plot: self.spec.plot.clone(),
            normalize: self.spec.normalize.clone(),
            functions: self.functions.clone(),
            options: self.core.options,
        }
    }
}

/// Read a sidecar if one exists. Missing sidecars are normal; unreadable
/// or malformed ones are fatal configuration errors.
fn read_sidecar(file: &Path) -> Result<Option<SidecarConfig>, SessionError> {
    let path = sidecar_path(file);
    let body = match std::fs::read_to_string(&path) {
        Ok(body) => body,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(SessionError::ConfigIo { path, source }),
    };
    let config =
        serde_json::from_str(&body).map_err(|source| SessionError::ConfigParse { path, source })?;
    Ok(Some(config))
}

fn load_slot(file: &Path, fallback_roster: &[String]) -> Result<LoadedSlot, SessionError> {
    let sidecar = read_sidecar(file)?;
    let roster_names: Vec<String> = sidecar
        .as_ref()
        .map(|c| c.labels.clone())
        .unwrap_or_else(|| fallback_roster.to_vec());

    let mut table =
        DataTable::load(file, &roster_names).map_err(|source| SessionError::BadFile {
            path: file.to_path_buf(),
            source,
        })?;

    match sidecar {
        Some(config) => {
            table.set_function_names(&config.functions);
            let stored = PlotSpec {
                plot: config.plot,
                normalize: config.normalize,
            };
            let repaired = !stored.is_valid_for(table.header_len());
            let spec = if repaired {
                PlotSpec::one_per_column(table.header_len())
            } else {
                stored
            };
            Ok(LoadedSlot {
                functions: table.function_names().to_vec(),
                table,
                spec,
                roster: Some((config.labels, config.colors)),
                options: Some(config.options),
                repaired,
            })
        }
        None => Ok(LoadedSlot {
            spec: PlotSpec::one_per_column(table.header_len()),
            functions: Vec::new(),
            table,
            roster: None,
            options: None,
            repaired: false,
        }),
    }
}

impl ConfigStore for FileStore {
    fn table(&self) -> &DataTable {
        &self.core.table
    }

    fn table_mut(&mut self) -> &mut DataTable {
        &mut self.core.table
    }

    fn current_path(&self) -> &Path {
        &self.core.files[self.core.current]
    }

    fn file_position(&self) -> (usize, usize) {
        (self.core.current, self.core.files.len())
    }

    fn next_file(&mut self) -> Result<(), SessionError> {
        self.navigate(true)
    }

    fn prev_file(&mut self) -> Result<(), SessionError> {
        self.navigate(false)
    }

    fn roster(&self) -> &LabelRoster {
        &self.core.roster
    }

    fn roster_mut(&mut self) -> &mut LabelRoster {
        &mut self.core.roster
    }

    fn set_roster(&mut self, names: Vec<String>, colors: Vec<String>) {
        self.core.roster.set_entries(names, colors);
        self.core.config_dirty = true;
    }

    fn plot_spec(&self) -> &PlotSpec {
        &self.spec
    }

    fn set_plot_spec(&mut self, spec: PlotSpec) {
        if self.spec != spec {
            self.spec = spec;
            self.core.config_dirty = true;
        }
    }

    fn registered_functions(&self) -> &[String] {
        &self.functions
    }

    fn add_function(
        &mut self,
        name: &str,
        source: usize,
        function: &dyn SeriesFunction,
        params: &ParamValues,
    ) -> Result<(), SessionError> {
        let values = evaluate_function(&self.core.table, name, source, function, params)?;
        self.core.table.add_function(name, values);
        self.functions.push(name.to_string());
        self.core.config_dirty = true;
        self.core.data_dirty = true;
        Ok(())
    }

    fn remove_function(&mut self, header_index: usize) {
        if !self.core.table.is_function_column(header_index) {
            return;
        }
        let name = self.core.table.data_header()[header_index].clone();
        if let Some(removed) = self.core.table.remove_function(&name) {
            self.spec.rebase_removed(removed);
            self.functions.retain(|f| f != &name);
            self.core.config_dirty = true;
            self.core.data_dirty = true;
        }
    }

    fn options(&self) -> SessionOptions {
        self.core.options
    }

    fn set_options(&mut self, options: SessionOptions) {
        if self.core.options != options {
            self.core.options = options;
            self.core.config_dirty = true;
        }
    }

    fn is_dirty(&self) -> bool {
        self.core.config_dirty || self.core.data_dirty
    }

    fn mark_data_dirty(&mut self) {
        self.core.data_dirty = true;
    }

    fn save(&mut self) -> Result<(), SessionError> {
        if self.core.data_dirty {
            self.core
                .table
                .save()
                .map_err(|source| SessionError::DataIo {
                    path: self.current_path().to_path_buf(),
                    source,
                })?;
            self.core.data_dirty = false;
        }
        if self.core.config_dirty {
            write_json(&sidecar_path(self.current_path()), &self.sidecar())?;
            self.core.config_dirty = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tslabel-store-{}-{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_csv(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, "acc,gyro\n1,4\n2,5\n3,6\n").unwrap();
        path
    }

    #[test]
    fn missing_sidecar_seeds_defaults_without_writing() {
        let dir = temp_dir("seed");
        let file = write_csv(&dir, "a.csv");

        let mut store = FileStore::open(vec![file.clone()]).unwrap();
        assert_eq!(store.plot_spec(), &PlotSpec::one_per_column(2));
        assert!(!store.is_dirty());

        store.save().unwrap();
        assert!(!sidecar_path(&file).exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn layout_changes_round_trip_through_the_sidecar() {
        let dir = temp_dir("roundtrip");
        let file = write_csv(&dir, "a.csv");

        let mut store = FileStore::open(vec![file.clone()]).unwrap();
        let mut spec = store.plot_spec().clone();
        spec.toggle_column(0, 1);
        spec.toggle_normalize(0);
        store.set_plot_spec(spec.clone());
        assert!(store.is_dirty());
        store.save().unwrap();
        assert!(!store.is_dirty());
        assert!(sidecar_path(&file).exists());

        let reopened = FileStore::open(vec![file]).unwrap();
        assert_eq!(reopened.plot_spec(), &spec);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn navigation_skips_bad_files_and_wraps() {
        let dir = temp_dir("skip");
        let a = write_csv(&dir, "a.csv");
        let broken = dir.join("b.csv");
        std::fs::write(&broken, "").unwrap();
        let c = write_csv(&dir, "c.csv");

        let mut store = FileStore::open(vec![a.clone(), broken, c.clone()]).unwrap();
        assert_eq!(store.current_path(), a);
        store.next_file().unwrap();
        assert_eq!(store.current_path(), c);
        store.next_file().unwrap();
        assert_eq!(store.current_path(), a);
        store.prev_file().unwrap();
        assert_eq!(store.current_path(), c);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn all_bad_files_is_a_fatal_session_error() {
        let dir = temp_dir("allbad");
        let broken = dir.join("a.csv");
        std::fs::write(&broken, "").unwrap();

        match FileStore::open(vec![broken]) {
            Err(err) => assert_eq!(err.exit_code(), 3),
            Ok(_) => panic!("expected NoUsableFiles"),
        }
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn files_going_bad_mid_session_is_fatal() {
        let dir = temp_dir("midbad");
        let a = write_csv(&dir, "a.csv");
        let b = write_csv(&dir, "b.csv");

        let mut store = FileStore::open(vec![a.clone(), b.clone()]).unwrap();
        std::fs::remove_file(&a).unwrap();
        std::fs::remove_file(&b).unwrap();

        match store.next_file() {
            Err(err) => assert_eq!(err.exit_code(), 3),
            Ok(()) => panic!("expected NoUsableFiles"),
        }
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn function_lifecycle_updates_table_layout_and_dirt() {
        let dir = temp_dir("function");
        let file = write_csv(&dir, "a.csv");
        let mut store = FileStore::open(vec![file]).unwrap();

        let f = crate::processing::functions::by_name("Derivative").unwrap();
        let params = ParamValues::default();
        store.add_function("acc_deriv", 0, f, &params).unwrap();
        assert_eq!(store.table().data_header(), ["acc", "gyro", "acc_deriv"]);
        assert_eq!(store.registered_functions(), ["acc_deriv"]);
        assert!(store.is_dirty());

        // Duplicate names are refused without touching anything.
        assert!(store.add_function("acc", 0, f, &params).is_err());
        assert_eq!(store.table().header_len(), 3);

        let mut spec = PlotSpec::one_per_column(3);
        spec.toggle_normalize(2);
        store.set_plot_spec(spec);
        store.remove_function(2);
        assert_eq!(store.table().data_header(), ["acc", "gyro"]);
        assert!(store.registered_functions().is_empty());
        assert_eq!(store.plot_spec().subplot_count(), 3);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn malformed_sidecar_is_a_config_error() {
        let dir = temp_dir("badcfg");
        let file = write_csv(&dir, "a.csv");
        std::fs::write(sidecar_path(&file), "{ not json").unwrap();

        match FileStore::open(vec![file]) {
            Err(err) => assert_eq!(err.exit_code(), 2),
            Ok(_) => panic!("expected ConfigParse"),
        }
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn invalid_stored_layout_is_repaired() {
        let dir = temp_dir("repair");
        let file = write_csv(&dir, "a.csv");
        let config = SidecarConfig {
            labels: vec!["L".to_string()],
            colors: vec!["#112233".to_string()],
            plot: vec![vec![0, 7]],
            normalize: vec![],
            functions: vec![],
            options: SessionOptions::default(),
        };
        write_json(&sidecar_path(&file), &config).unwrap();

        let store = FileStore::open(vec![file]).unwrap();
        assert_eq!(store.plot_spec(), &PlotSpec::one_per_column(2));
        assert!(store.is_dirty());
        std::fs::remove_dir_all(&dir).ok();
    }
}
