use eframe::egui;
use tracing::{error, info};

use crate::config::{ConfigStore, SessionError};
use crate::state::label::{color32_from_hex, color_for_index, LabelEntry, LabelScope};
use crate::state::settings::ChannelMode;
use crate::ui::function_dialog::FunctionDialog;
use crate::ui::plot_menu::{self, MenuAction};
use crate::ui::plot_panel::{self, PlotEvent};
use crate::view::labeling::{LabelAction, LabelEngine};
use crate::view::viewport::{self, Viewport};

/// A navigation the user requested while unsaved changes were pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingMove {
    NextFile,
    PrevFile,
    Quit,
}

/// Editable copy of the label roster shown in the "Edit labels" window.
struct RosterEditor {
    open: bool,
    rows: Vec<(String, String)>,
}

/// The main annotation application.
pub struct LabelerApp {
    store: Box<dyn ConfigStore>,
    viewports: Vec<Viewport>,
    engine: LabelEngine,
    function_dialog: FunctionDialog,
    roster_editor: RosterEditor,
    error_message: Option<String>,
    pending_move: Option<PendingMove>,
    close_confirmed: bool,
}

impl LabelerApp {
    pub fn new(cc: &eframe::CreationContext<'_>, store: Box<dyn ConfigStore>) -> Self {
        let ctx = &cc.egui_ctx;
        let mut style = (*ctx.style()).clone();
        style.spacing.button_padding = egui::vec2(10.0, 5.0);
        style.spacing.item_spacing = egui::vec2(8.0, 6.0);
        ctx.set_style(style);

        let mut app = Self {
            store,
            viewports: Vec::new(),
            engine: LabelEngine::default(),
            function_dialog: FunctionDialog::default(),
            roster_editor: RosterEditor {
                open: false,
                rows: Vec::new(),
            },
            error_message: None,
            pending_move: None,
            close_confirmed: false,
        };
        app.rebuild_viewports();
        app
    }

    /// Rebuild the stack from scratch: layout, series, overlays, ranges.
    fn rebuild_viewports(&mut self) {
        self.viewports = viewport::build_viewports(
            self.store.table(),
            self.store.plot_spec(),
            self.store.roster(),
        );
    }

    fn rebuild_overlays(&mut self) {
        viewport::rebuild_overlays(
            &mut self.viewports,
            self.store.table(),
            self.store.roster(),
        );
    }

    fn report(&mut self, err: SessionError) {
        error!(error = %err, "operation failed");
        self.error_message = Some(err.to_string());
    }

    fn save(&mut self) {
        if let Err(err) = self.store.save() {
            self.report(err);
        }
    }

    /// Start a navigation, routing through the unsaved-changes flow when
    /// needed: autosave saves silently, otherwise the user is asked.
    fn request_move(&mut self, mv: PendingMove) {
        if self.store.is_dirty() {
            if self.store.options().autosave {
                self.save();
                if self.store.is_dirty() {
                    // Save failed; keep the prompt path available.
                    self.pending_move = Some(mv);
                    return;
                }
            } else {
                self.pending_move = Some(mv);
                return;
            }
        }
        self.perform_move(mv, None);
    }

    fn perform_move(&mut self, mv: PendingMove, ctx: Option<&egui::Context>) {
        self.engine.reset();
        let result = match mv {
            PendingMove::NextFile => self.store.next_file(),
            PendingMove::PrevFile => self.store.prev_file(),
            PendingMove::Quit => {
                self.close_confirmed = true;
                if let Some(ctx) = ctx {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
                return;
            }
        };
        match result {
            Ok(()) => self.rebuild_viewports(),
            Err(err @ SessionError::NoUsableFiles) => {
                // Every remaining file is unreadable; nothing left to label.
                error!("{err}");
                eprintln!("{err}");
                std::process::exit(err.exit_code());
            }
            Err(err) => self.report(err),
        }
    }

    fn zoom(&mut self, zoom_in: bool) {
        for v in &mut self.viewports {
            if zoom_in {
                v.zoom_in();
            } else {
                v.zoom_out();
            }
        }
    }

    fn reset_view(&mut self) {
        for v in &mut self.viewports {
            v.reset_view();
        }
        viewport::align_empty_ranges(&mut self.viewports);
    }

    fn cycle_label(&mut self, forward: bool) {
        // Switching labels mid-gesture discards the pending anchor.
        self.engine.reset();
        if forward {
            self.store.roster_mut().next();
        } else {
            self.store.roster_mut().prev();
        }
    }

    fn handle_label_action(&mut self, action: LabelAction) {
        let LabelAction::Create {
            start,
            end,
            subplot,
            ..
        } = action
        else {
            return;
        };
        let Some((name, _)) = self.store.roster().current() else {
            return;
        };
        let name = name.to_string();
        let scope = match self.store.options().channel_mode {
            ChannelMode::Synchronized => LabelScope::All,
            ChannelMode::Independent => LabelScope::Subplot(subplot),
        };
        info!(label = %name, start, end, "label created");
        self.store
            .table_mut()
            .labels
            .push(LabelEntry::new(name, (start, end), scope));
        self.store.mark_data_dirty();
        self.rebuild_overlays();
        if self.store.options().autosave {
            self.save();
        }
    }

    fn handle_menu_action(&mut self, action: MenuAction) {
        match action {
            MenuAction::RemoveLabel(entry) => {
                if entry < self.store.table().labels.len() {
                    self.store.table_mut().labels.remove(entry);
                    self.store.mark_data_dirty();
                    self.rebuild_overlays();
                }
            }
            MenuAction::RemoveFunction(column) => {
                self.store.remove_function(column);
                self.rebuild_viewports();
            }
            other => {
                let mut spec = self.store.plot_spec().clone();
                let header_len = self.store.table().header_len();
                if plot_menu::apply_layout_action(&mut spec, header_len, &other) {
                    self.store.set_plot_spec(spec);
                    self.rebuild_viewports();
                }
            }
        }
    }

    fn handle_keys(&mut self, ctx: &egui::Context) {
        if ctx.wants_keyboard_input() {
            return;
        }
        let mut zoom_in = false;
        let mut zoom_out = false;
        let mut prev_label = false;
        let mut next_label = false;
        let mut prev_file = false;
        let mut next_file = false;
        let mut reset = false;
        let mut save = false;
        let mut quit = false;
        ctx.input(|i| {
            zoom_in = i.key_pressed(egui::Key::Z);
            zoom_out = i.key_pressed(egui::Key::X);
            prev_label = i.key_pressed(egui::Key::K);
            next_label = i.key_pressed(egui::Key::L);
            prev_file = i.key_pressed(egui::Key::P);
            next_file = i.key_pressed(egui::Key::N);
            reset = i.key_pressed(egui::Key::R);
            save = i.key_pressed(egui::Key::S);
            quit = i.modifiers.command && i.key_pressed(egui::Key::Q);
        });
        if zoom_in {
            self.zoom(true);
        }
        if zoom_out {
            self.zoom(false);
        }
        if prev_label {
            self.cycle_label(false);
        }
        if next_label {
            self.cycle_label(true);
        }
        if prev_file {
            self.request_move(PendingMove::PrevFile);
        }
        if next_file {
            self.request_move(PendingMove::NextFile);
        }
        if reset {
            self.reset_view();
        }
        if save {
            self.save();
        }
        if quit {
            self.request_move(PendingMove::Quit);
        }
    }

    fn show_menu_bar(&mut self, ctx: &egui::Context) {
        let mut add_function = false;
        let mut edit_labels = false;
        let mut options = self.store.options();
        let options_before = options;

        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("Save        S").clicked() {
                        self.save();
                        ui.close_menu();
                    }
                    if ui.button("Next file        N").clicked() {
                        self.request_move(PendingMove::NextFile);
                        ui.close_menu();
                    }
                    if ui.button("Previous file        P").clicked() {
                        self.request_move(PendingMove::PrevFile);
                        ui.close_menu();
                    }
                    ui.separator();
                    if ui.button("Quit        Ctrl+Q").clicked() {
                        self.request_move(PendingMove::Quit);
                        ui.close_menu();
                    }
                });
                ui.menu_button("Label", |ui| {
                    if ui.button("Next label        L").clicked() {
                        self.cycle_label(true);
                        ui.close_menu();
                    }
                    if ui.button("Previous label        K").clicked() {
                        self.cycle_label(false);
                        ui.close_menu();
                    }
                    if ui.button("Edit labels…").clicked() {
                        edit_labels = true;
                        ui.close_menu();
                    }
                    ui.separator();
                    for mode in [ChannelMode::Synchronized, ChannelMode::Independent] {
                        if ui
                            .radio(options.channel_mode == mode, mode.label())
                            .clicked()
                        {
                            options.channel_mode = mode;
                        }
                    }
                    ui.separator();
                    ui.checkbox(&mut options.autosave, "Autosave");
                });
                ui.menu_button("Functions", |ui| {
                    if ui.button("Add function…").clicked() {
                        add_function = true;
                        ui.close_menu();
                    }
                });
                ui.menu_button("View", |ui| {
                    if ui.button("Zoom in        Z").clicked() {
                        self.zoom(true);
                        ui.close_menu();
                    }
                    if ui.button("Zoom out        X").clicked() {
                        self.zoom(false);
                        ui.close_menu();
                    }
                    if ui.button("Reset zoom        R").clicked() {
                        self.reset_view();
                        ui.close_menu();
                    }
                    ui.separator();
                    ui.horizontal(|ui| {
                        ui.label("Plot height");
                        ui.add(
                            egui::DragValue::new(&mut options.plot_height)
                                .range(80.0..=600.0)
                                .speed(2.0),
                        );
                    });
                });
            });
        });

        if options != options_before {
            self.store.set_options(options);
        }
        if add_function {
            self.function_dialog.open();
        }
        if edit_labels {
            self.roster_editor.open = true;
            self.roster_editor.rows = self
                .store
                .roster()
                .names()
                .iter()
                .cloned()
                .zip(self.store.roster().colors().iter().cloned())
                .collect();
        }
    }

    fn show_footer(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("footer").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let (index, count) = self.store.file_position();
                ui.label(format!(
                    "{}/{}  {}",
                    index + 1,
                    count,
                    self.store.current_path().display()
                ));
                ui.separator();
                if let Some((name, color)) = self.store.roster().current() {
                    let swatch = color32_from_hex(color);
                    let (rect, _) =
                        ui.allocate_exact_size(egui::vec2(12.0, 12.0), egui::Sense::hover());
                    ui.painter()
                        .rect_filled(rect, egui::CornerRadius::same(2), swatch);
                    ui.label(name);
                }
                ui.separator();
                ui.label(self.store.options().channel_mode.label());
                if self.engine.is_armed() {
                    ui.separator();
                    ui.label("placing label…");
                }
                if self.store.is_dirty() {
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        ui.label(egui::RichText::new("unsaved changes").weak());
                    });
                }
            });
        });
    }

    fn show_roster_editor(&mut self, ctx: &egui::Context) {
        if !self.roster_editor.open {
            return;
        }
        let mut open = self.roster_editor.open;
        let mut apply = false;
        egui::Window::new("Edit labels")
            .open(&mut open)
            .collapsible(false)
            .show(ctx, |ui| {
                let mut remove = None;
                for (i, (name, color)) in self.roster_editor.rows.iter_mut().enumerate() {
                    ui.horizontal(|ui| {
                        ui.text_edit_singleline(name);
                        let mut rgb = color32_from_hex(color);
                        if ui.color_edit_button_srgba(&mut rgb).changed() {
                            *color = format!("#{:02x}{:02x}{:02x}", rgb.r(), rgb.g(), rgb.b());
                        }
                        if ui.button("✕").clicked() {
                            remove = Some(i);
                        }
                    });
                }
                if let Some(i) = remove {
                    self.roster_editor.rows.remove(i);
                }
                if ui.button("Add label").clicked() {
                    let idx = self.roster_editor.rows.len();
                    self.roster_editor.rows.push((
                        format!("Label #{}", idx + 1),
                        color_for_index(idx).to_string(),
                    ));
                }
                ui.separator();
                ui.horizontal(|ui| {
                    let valid = !self.roster_editor.rows.is_empty()
                        && self
                            .roster_editor
                            .rows
                            .iter()
                            .all(|(n, _)| !n.trim().is_empty());
                    if ui.add_enabled(valid, egui::Button::new("Apply")).clicked() {
                        apply = true;
                    }
                });
            });
        if apply {
            let (names, colors): (Vec<_>, Vec<_>) = self
                .roster_editor
                .rows
                .iter()
                .map(|(n, c)| (n.trim().to_string(), c.clone()))
                .unzip();
            self.store.set_roster(names, colors);
            self.engine.reset();
            self.rebuild_overlays();
            open = false;
        }
        self.roster_editor.open = open;
    }

    fn show_unsaved_prompt(&mut self, ctx: &egui::Context) {
        let Some(mv) = self.pending_move else {
            return;
        };
        let mut decided = None;
        egui::Window::new("Unsaved changes")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
            .show(ctx, |ui| {
                ui.label(format!(
                    "Save changes to {}?",
                    self.store.current_path().display()
                ));
                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    if ui.button("Save").clicked() {
                        decided = Some(true);
                    }
                    if ui.button("Discard").clicked() {
                        decided = Some(false);
                    }
                    if ui.button("Cancel").clicked() {
                        self.pending_move = None;
                    }
                });
            });
        if let Some(save) = decided {
            self.pending_move = None;
            if save {
                self.save();
                if self.store.is_dirty() {
                    return; // save failed, stay put
                }
            }
            self.perform_move(mv, Some(ctx));
        }
    }

    fn show_error(&mut self, ctx: &egui::Context) {
        let Some(message) = self.error_message.clone() else {
            return;
        };
        let mut open = true;
        let mut dismissed = false;
        egui::Window::new("Error")
            .open(&mut open)
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                ui.label(&message);
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });
        if !open || dismissed {
            self.error_message = None;
        }
    }
}

impl eframe::App for LabelerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Closing with unsaved changes routes through the same prompt as
        // file navigation.
        if ctx.input(|i| i.viewport().close_requested())
            && !self.close_confirmed
            && self.store.is_dirty()
        {
            if self.store.options().autosave {
                self.save();
            } else {
                ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
                self.pending_move = Some(PendingMove::Quit);
            }
        }

        self.handle_keys(ctx);
        self.show_menu_bar(ctx);
        self.show_footer(ctx);

        let mut event = PlotEvent::None;
        let plot_height = self.store.options().plot_height;
        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                event = plot_panel::show_plot_stack(
                    ui,
                    &mut self.viewports,
                    self.store.table(),
                    self.store.plot_spec(),
                    plot_height,
                    self.store.table().timestamp_seconds().is_some(),
                );
            });
        });

        match event {
            PlotEvent::Pointer(hit) => {
                let action = self.engine.handle(hit);
                self.handle_label_action(action);
            }
            PlotEvent::Menu(action) => self.handle_menu_action(action),
            PlotEvent::None => {}
        }

        if let Some(request) = self
            .function_dialog
            .show(ctx, self.store.table().data_header())
        {
            match self.store.add_function(
                &request.name,
                request.source,
                request.function,
                &request.params,
            ) {
                Ok(()) => self.rebuild_viewports(),
                Err(err) => self.report(err),
            }
        }

        self.show_roster_editor(ctx);
        self.show_unsaved_prompt(ctx);
        self.show_error(ctx);
    }
}
