use crate::data::table::DataTable;
use crate::state::plot_spec::PlotSpec;

/// Layout and label edits requested from a subplot's context menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuAction {
    RemoveLabel(usize),
    ToggleColumn { subplot: usize, column: usize },
    ToggleNormalize(usize),
    AddPlotBefore(usize),
    AddPlotAfter(usize),
    ClearPlot(usize),
    RemovePlot(usize),
    ResetLayout,
    RemoveFunction(usize),
}

/// Body of the right-click menu of one subplot. `hit_label` is the label
/// entry under the pointer, if any.
pub fn context_menu(
    ui: &mut egui::Ui,
    subplot: usize,
    table: &DataTable,
    spec: &PlotSpec,
    hit_label: Option<usize>,
) -> Option<MenuAction> {
    let mut action = None;
    ui.set_min_width(180.0);

    if let Some(entry) = hit_label {
        let name = table
            .labels
            .get(entry)
            .map(|l| l.name.as_str())
            .unwrap_or("label");
        if ui.button(format!("Remove \"{name}\"")).clicked() {
            action = Some(MenuAction::RemoveLabel(entry));
            ui.close_menu();
        }
        ui.separator();
    }

    ui.menu_button("Plot content", |ui| {
        for (column, name) in table.data_header().iter().enumerate() {
            let selected = spec
                .plot
                .get(subplot)
                .is_some_and(|set| set.contains(&column));
            if ui.selectable_label(selected, name).clicked() {
                action = Some(MenuAction::ToggleColumn { subplot, column });
                ui.close_menu();
            }
        }
    });

    let normalized = spec.is_normalized(subplot);
    if ui.selectable_label(normalized, "Normalize").clicked() {
        action = Some(MenuAction::ToggleNormalize(subplot));
        ui.close_menu();
    }

    ui.separator();
    if ui.button("Add plot above").clicked() {
        action = Some(MenuAction::AddPlotBefore(subplot));
        ui.close_menu();
    }
    if ui.button("Add plot below").clicked() {
        action = Some(MenuAction::AddPlotAfter(subplot));
        ui.close_menu();
    }
    if ui.button("Clear plot").clicked() {
        action = Some(MenuAction::ClearPlot(subplot));
        ui.close_menu();
    }
    // The last subplot cannot be removed, only cleared.
    if spec.subplot_count() > 1 && ui.button("Remove plot").clicked() {
        action = Some(MenuAction::RemovePlot(subplot));
        ui.close_menu();
    }

    if table.function_names().is_empty() {
        ui.separator();
    } else {
        ui.separator();
        ui.menu_button("Remove function", |ui| {
            for (column, name) in table.data_header().iter().enumerate() {
                if table.is_function_column(column) && ui.button(name).clicked() {
                    action = Some(MenuAction::RemoveFunction(column));
                    ui.close_menu();
                }
            }
        });
        ui.separator();
    }

    if ui.button("Reset layout").clicked() {
        action = Some(MenuAction::ResetLayout);
        ui.close_menu();
    }

    action
}

/// Apply a layout edit to a spec copy. Label and function actions mutate
/// more than the layout and are handled by the application instead.
pub fn apply_layout_action(spec: &mut PlotSpec, header_len: usize, action: &MenuAction) -> bool {
    match *action {
        MenuAction::ToggleColumn { subplot, column } => spec.toggle_column(subplot, column),
        MenuAction::ToggleNormalize(subplot) => spec.toggle_normalize(subplot),
        MenuAction::AddPlotBefore(subplot) => spec.insert_subplot(subplot),
        MenuAction::AddPlotAfter(subplot) => spec.insert_subplot(subplot + 1),
        MenuAction::ClearPlot(subplot) => spec.clear_subplot(subplot),
        MenuAction::RemovePlot(subplot) => spec.remove_subplot(subplot),
        MenuAction::ResetLayout => spec.reset(header_len),
        MenuAction::RemoveLabel(_) | MenuAction::RemoveFunction(_) => return false,
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_actions_apply_to_the_spec() {
        let mut spec = PlotSpec::one_per_column(3);
        assert!(apply_layout_action(
            &mut spec,
            3,
            &MenuAction::ToggleColumn {
                subplot: 0,
                column: 2
            }
        ));
        assert_eq!(spec.plot[0], vec![0, 2]);

        assert!(apply_layout_action(&mut spec, 3, &MenuAction::AddPlotAfter(0)));
        assert_eq!(spec.subplot_count(), 4);
        assert!(spec.plot[1].is_empty());

        assert!(apply_layout_action(&mut spec, 3, &MenuAction::ResetLayout));
        assert_eq!(spec, PlotSpec::one_per_column(3));
    }

    #[test]
    fn label_and_function_actions_are_not_layout_edits() {
        let mut spec = PlotSpec::one_per_column(2);
        assert!(!apply_layout_action(&mut spec, 2, &MenuAction::RemoveLabel(0)));
        assert!(!apply_layout_action(
            &mut spec,
            2,
            &MenuAction::RemoveFunction(1)
        ));
        assert_eq!(spec, PlotSpec::one_per_column(2));
    }
}
