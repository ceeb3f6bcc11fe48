use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::{
    evaluate_function, header_signature, write_json, ConfigStore, ProjectManifest, SchemaBlock,
    SessionCore, SessionError,
};
use crate::data::table::DataTable;
use crate::processing::functions::{ParamValues, SeriesFunction};
use crate::state::label::LabelRoster;
use crate::state::plot_spec::PlotSpec;
use crate::state::settings::SessionOptions;

/// Session backed by a single project manifest. The file list, roster and
/// options are project-wide; layouts are grouped by header signature so
/// files with the same column schema share one layout block.
pub struct ProjectStore {
    manifest_path: PathBuf,
    file_names: Vec<String>,
    core: SessionCore,
    schemas: BTreeMap<String, SchemaBlock>,
    spec: PlotSpec,
    signature: String,
}

impl ProjectStore {
    pub fn open(manifest_path: &Path) -> Result<Self, SessionError> {
        let body =
            std::fs::read_to_string(manifest_path).map_err(|source| SessionError::ConfigIo {
                path: manifest_path.to_path_buf(),
                source,
            })?;
        let manifest: ProjectManifest =
            serde_json::from_str(&body).map_err(|source| SessionError::ConfigParse {
                path: manifest_path.to_path_buf(),
                source,
            })?;

        let root = manifest_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        let files: Vec<PathBuf> = manifest.files.iter().map(|f| root.join(f)).collect();
        if files.is_empty() {
            return Err(SessionError::NoUsableFiles);
        }
        let roster = LabelRoster::new(manifest.labels, manifest.colors);
        let mut schemas = manifest.schemas;
        let mut bad = HashSet::new();

        for idx in 0..files.len() {
            match load_file(&files[idx], roster.names(), &mut schemas) {
                Ok((table, spec, signature, config_dirty)) => {
                    info!(project = %manifest_path.display(), file = %files[idx].display(), "project opened");
                    let mut store = Self {
                        manifest_path: manifest_path.to_path_buf(),
                        file_names: manifest.files,
                        core: SessionCore {
                            files,
                            current: idx,
                            bad,
                            roster,
                            options: manifest.options,
                            table,
                            config_dirty,
                            data_dirty: false,
                        },
                        schemas,
                        spec,
                        signature,
                    };
                    // New schema blocks are persisted right away so the
                    // manifest always lists every schema it has seen.
                    if store.core.config_dirty {
                        store.write_manifest()?;
                        store.core.config_dirty = false;
                    }
                    return Ok(store);
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
            match load_file(
                &self.core.files[idx],
                self.core.roster.names(),
                &mut self.schemas,
            ) {
                Ok((table, spec, signature, config_dirty)) => {
                    self.core.current = idx;
                    self.core.table = table;
                    self.core.data_dirty = false;
                    self.spec = spec;
                    self.signature = signature;
                    if config_dirty {
                        self.write_manifest()?;
                    }
                    debug!(file = %self.core.files[idx].display(), "switched file");
                    return Ok(());
                }
                Err(SessionError::BadFile { source, .. }) => self.core.mark_bad(idx, &source),
                Err(fatal) => return Err(fatal),
            }
        }
        Err(SessionError::NoUsableFiles)
    }

    fn manifest(&self) -> ProjectManifest {
        ProjectManifest {
            files: self.file_names.clone(),
            labels: self.core.roster.names().to_vec(),
            colors: self.core.roster.colors().to_vec(),
            options: self.core.options,
            schemas: self.schemas.clone(),
        }
    }

    fn write_manifest(&self) -> Result<(), SessionError> {
        write_json(&self.manifest_path, &self.manifest())
    }

    fn store_block(&mut self) {
        self.schemas.insert(
            self.signature.clone(),
            SchemaBlock::from_spec(&self.spec, self.registered_functions().to_vec()),
        );
        self.core.config_dirty = true;
    }
}

type Loaded = (DataTable, PlotSpec, String, bool);

/// Load one project file and resolve its schema block, synthesizing a
/// default block for schemas the manifest has not seen yet. The returned
/// flag reports whether the schema map changed and needs persisting.
fn load_file(
    file: &Path,
    roster_names: &[String],
    schemas: &mut BTreeMap<String, SchemaBlock>,
) -> Result<Loaded, SessionError> {
    let mut table = DataTable::load(file, roster_names).map_err(|source| SessionError::BadFile {
        path: file.to_path_buf(),
        source,
    })?;
    let signature = header_signature(table.data_header());

    let (spec, dirty) = match schemas.get(&signature) {
        Some(block) => {
            table.set_function_names(&block.functions);
            let stored = block.spec();
            if stored.is_valid_for(table.header_len()) {
                (stored, false)
            } else {
                let repaired = PlotSpec::one_per_column(table.header_len());
                schemas.insert(
                    signature.clone(),
                    SchemaBlock::from_spec(&repaired, block.functions.clone()),
                );
                (repaired, true)
            }
        }
        None => {
            let spec = PlotSpec::one_per_column(table.header_len());
            schemas.insert(signature.clone(), SchemaBlock::from_spec(&spec, Vec::new()));
            (spec, true)
        }
    };
    Ok((table, spec, signature, dirty))
}

impl ConfigStore for ProjectStore {
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
            self.store_block();
        }
    }

    fn registered_functions(&self) -> &[String] {
        self.schemas
            .get(&self.signature)
            .map(|b| b.functions.as_slice())
            .unwrap_or(&[])
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
        if let Some(block) = self.schemas.get_mut(&self.signature) {
            block.functions.push(name.to_string());
        }
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
            if let Some(block) = self.schemas.get_mut(&self.signature) {
                block.functions.retain(|f| f != &name);
            }
            self.store_block();
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
            self.write_manifest()?;
            self.core.config_dirty = false;
        }
        Ok(())
    }
}
