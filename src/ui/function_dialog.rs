use std::collections::BTreeMap;

use crate::processing::functions::{self, ParamSpec, ParamValues, SeriesFunction};

/// A completed add-function request, ready for the session store.
pub struct FunctionRequest {
    pub name: String,
    pub source: usize,
    pub function: &'static dyn SeriesFunction,
    pub params: ParamValues,
}

/// Modal form for deriving a new column: transform, source column, output
/// name, and the transform's typed parameters.
pub struct FunctionDialog {
    open: bool,
    name: String,
    source: usize,
    function_index: usize,
    int_values: BTreeMap<&'static str, i64>,
    choice_values: BTreeMap<&'static str, usize>,
}

impl Default for FunctionDialog {
    fn default() -> Self {
        let mut dialog = Self {
            open: false,
            name: String::new(),
            source: 0,
            function_index: 0,
            int_values: BTreeMap::new(),
            choice_values: BTreeMap::new(),
        };
        dialog.seed_params();
        dialog
    }
}

impl FunctionDialog {
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn open(&mut self) {
        self.open = true;
        self.name.clear();
        self.source = 0;
        self.function_index = 0;
        self.seed_params();
    }

    fn function(&self) -> &'static dyn SeriesFunction {
        functions::registry()[self.function_index]
    }

    /// Reset parameter widgets to the selected transform's defaults.
    fn seed_params(&mut self) {
        self.int_values.clear();
        self.choice_values.clear();
        for spec in self.function().parameters() {
            match *spec {
                ParamSpec::Int { key, default, .. } => {
                    self.int_values.insert(key, default);
                }
                ParamSpec::Choice { key, default, .. } => {
                    self.choice_values.insert(key, default);
                }
            }
        }
    }

    fn params(&self) -> ParamValues {
        let mut params = ParamValues::default();
        for spec in self.function().parameters() {
            match *spec {
                ParamSpec::Int { key, .. } => {
                    if let Some(&v) = self.int_values.get(key) {
                        params.set_int(key, v);
                    }
                }
                ParamSpec::Choice { key, values, .. } => {
                    if let Some(&i) = self.choice_values.get(key) {
                        params.set_choice(key, values[i.min(values.len() - 1)]);
                    }
                }
            }
        }
        params
    }

    pub fn show(&mut self, ctx: &egui::Context, header: &[String]) -> Option<FunctionRequest> {
        if !self.open {
            return None;
        }
        let mut request = None;
        let mut open = self.open;

        egui::Window::new("Add function")
            .open(&mut open)
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                egui::Grid::new("function_form")
                    .num_columns(2)
                    .spacing([12.0, 6.0])
                    .show(ui, |ui| {
                        ui.label("Function");
                        let before = self.function_index;
                        egui::ComboBox::from_id_salt("function_kind")
                            .selected_text(self.function().name())
                            .show_ui(ui, |ui| {
                                for (i, f) in functions::registry().iter().enumerate() {
                                    ui.selectable_value(&mut self.function_index, i, f.name());
                                }
                            });
                        if self.function_index != before {
                            self.seed_params();
                        }
                        ui.end_row();

                        ui.label("Source column");
                        self.source = self.source.min(header.len().saturating_sub(1));
                        egui::ComboBox::from_id_salt("function_source")
                            .selected_text(header.get(self.source).map(String::as_str).unwrap_or(""))
                            .show_ui(ui, |ui| {
                                for (i, name) in header.iter().enumerate() {
                                    ui.selectable_value(&mut self.source, i, name);
                                }
                            });
                        ui.end_row();

                        ui.label("Column name");
                        ui.text_edit_singleline(&mut self.name);
                        ui.end_row();

                        for spec in self.function().parameters() {
                            match *spec {
                                ParamSpec::Int { key, min, max, .. } => {
                                    ui.label(key);
                                    let value = self.int_values.entry(key).or_insert(min);
                                    ui.add(egui::DragValue::new(value).range(min..=max));
                                    ui.end_row();
                                }
                                ParamSpec::Choice { key, values, .. } => {
                                    ui.label(key);
                                    let selected = self.choice_values.entry(key).or_insert(0);
                                    egui::ComboBox::from_id_salt(("function_choice", key))
                                        .selected_text(values[(*selected).min(values.len() - 1)])
                                        .show_ui(ui, |ui| {
                                            for (i, v) in values.iter().enumerate() {
                                                ui.selectable_value(selected, i, *v);
                                            }
                                        });
                                    ui.end_row();
                                }
                            }
                        }
                    });

                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    let ready = !self.name.trim().is_empty() && !header.is_empty();
                    if ui.add_enabled(ready, egui::Button::new("Add")).clicked() {
                        request = Some(FunctionRequest {
                            name: self.name.trim().to_string(),
                            source: self.source,
                            function: self.function(),
                            params: self.params(),
                        });
                    }
                    if ui.button("Cancel").clicked() {
                        self.open = false;
                    }
                });
            });

        self.open = open && self.open && request.is_none();
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_are_seeded_from_the_selected_function() {
        let mut dialog = FunctionDialog::default();
        dialog.open();
        // Moving average carries a window size parameter.
        dialog.function_index = functions::registry()
            .iter()
            .position(|f| f.name() == "Moving average")
            .unwrap();
        dialog.seed_params();
        let params = dialog.params();
        assert!(params.int("Window size").is_some());
    }

    #[test]
    fn choice_params_resolve_to_labels() {
        let mut dialog = FunctionDialog::default();
        dialog.open();
        // Derivative exposes the time-scale choice.
        dialog.function_index = functions::registry()
            .iter()
            .position(|f| f.name() == "Derivative")
            .unwrap();
        dialog.seed_params();
        let params = dialog.params();
        assert!(params.choice("Time scale").is_some());
    }
}
