use egui_plot::{Corner, Legend, Line, Plot, PlotBounds, PlotPoints, Polygon, VLine};

use crate::data::table::DataTable;
use crate::state::plot_spec::PlotSpec;
use crate::ui::plot_menu::{self, MenuAction};
use crate::view::labeling::{PointerHit, PointerKind};
use crate::view::viewport::Viewport;

/// What the plot stack asks the application to do this frame.
#[derive(Debug, Clone, PartialEq)]
pub enum PlotEvent {
    None,
    Pointer(PointerHit),
    Menu(MenuAction),
}

/// Render the vertical stack of subplots. Interaction is fully owned by
/// the viewports: panning/zooming through egui_plot is disabled and the
/// bounds are set every frame, so keyboard zoom and pointer labeling are
/// the only ways the view changes.
pub fn show_plot_stack(
    ui: &mut egui::Ui,
    viewports: &mut [Viewport],
    table: &DataTable,
    spec: &PlotSpec,
    plot_height: f32,
    timestamp_axis: bool,
) -> PlotEvent {
    let mut event = PlotEvent::None;
    let mut shared_cursor: Option<f64> = None;

    for subplot in 0..viewports.len() {
        let sub_event = show_subplot(
            ui,
            &mut viewports[subplot],
            table,
            spec,
            subplot,
            plot_height,
            timestamp_axis,
            &mut shared_cursor,
        );
        if event == PlotEvent::None {
            event = sub_event;
        }
    }

    // The cursor is one vertical line through the whole stack.
    if let Some(x) = shared_cursor {
        for v in viewports.iter_mut() {
            v.set_cursor(x);
        }
    }
    event
}

#[allow(clippy::too_many_arguments)]
fn show_subplot(
    ui: &mut egui::Ui,
    viewport: &mut Viewport,
    table: &DataTable,
    spec: &PlotSpec,
    subplot: usize,
    plot_height: f32,
    timestamp_axis: bool,
    shared_cursor: &mut Option<f64>,
) -> PlotEvent {
    let mut event = PlotEvent::None;

    let (y_lo, y_hi) = viewport.y_bounds();
    let lines: Vec<(String, egui::Color32, Vec<[f64; 2]>)> = {
        let series = viewport.series.clone();
        viewport
            .display_series()
            .iter()
            .map(|(slot, points)| {
                (
                    series[*slot].name.clone(),
                    series[*slot].color,
                    points.clone(),
                )
            })
            .collect()
    };
    let overlays = viewport.overlays.clone();
    let bounds = PlotBounds::from_min_max([viewport.x_min, y_lo], [viewport.x_max, y_hi]);
    let legend_corner = if viewport.legend_left() {
        Corner::LeftTop
    } else {
        Corner::RightTop
    };
    let span = viewport.x_max - viewport.x_min;
    let cursor_x = viewport.cursor_x;

    let mut plot = Plot::new(("subplot", subplot))
        .height(plot_height)
        .legend(Legend::default().position(legend_corner))
        .allow_drag(false)
        .allow_zoom(false)
        .allow_scroll(false)
        .allow_double_click_reset(false)
        .show_y(false);
    if timestamp_axis {
        plot = plot.x_axis_formatter(move |mark, _range| format_timestamp_tick(mark.value, span));
    }

    let response = plot.show(ui, |plot_ui| {
        plot_ui.set_plot_bounds(bounds);

        for rect in &overlays {
            let fill = rect.color.gamma_multiply(0.25);
            let corners: PlotPoints = vec![
                [rect.x1, y_lo],
                [rect.x2, y_lo],
                [rect.x2, y_hi],
                [rect.x1, y_hi],
            ]
            .into();
            plot_ui.polygon(
                Polygon::new(corners)
                    .fill_color(fill)
                    .stroke(egui::Stroke::new(1.0, rect.color)),
            );
        }

        for (name, color, points) in &lines {
            let plot_points: PlotPoints = points.iter().copied().collect();
            plot_ui.line(Line::new(plot_points).name(name).color(*color).width(1.2));
        }

        plot_ui.vline(VLine::new(cursor_x).color(egui::Color32::LIGHT_GRAY).width(1.0));

        plot_ui.pointer_coordinate()
    });

    if let Some(pos) = response.inner {
        *shared_cursor = Some(pos.x);
    }

    // A click and the start/end of a drag all resolve to the nearest data
    // index at the pointer's x.
    let pointer_x = response.inner.map(|p| p.x).unwrap_or(cursor_x);
    if response.response.clicked() || response.response.drag_started() {
        event = PlotEvent::Pointer(PointerHit {
            kind: PointerKind::Press,
            index: viewport.resolve_index(pointer_x),
            subplot,
        });
    } else if response.response.drag_stopped() {
        event = PlotEvent::Pointer(PointerHit {
            kind: PointerKind::Release,
            index: viewport.resolve_index(pointer_x),
            subplot,
        });
    }

    let hit_label = viewport.hit_overlay(cursor_x);
    let mut menu_action = None;
    response.response.context_menu(|ui| {
        menu_action = plot_menu::context_menu(ui, subplot, table, spec, hit_label);
    });
    if let Some(action) = menu_action {
        event = PlotEvent::Menu(action);
    }

    event
}

/// Ticks on the chronological axis: coarser spans show coarser time, and
/// multi-day spans include the date.
pub fn format_timestamp_tick(epoch_seconds: f64, visible_span: f64) -> String {
    let Some(dt) = chrono::DateTime::from_timestamp_millis((epoch_seconds * 1000.0) as i64) else {
        return format!("{epoch_seconds:.0}");
    };
    let fmt = if visible_span >= 60.0 * 86_400.0 {
        "%Y-%m-%d"
    } else if visible_span >= 2.0 * 86_400.0 {
        "%m-%d %H:%M"
    } else if visible_span >= 3_600.0 {
        "%H:%M"
    } else if visible_span >= 60.0 {
        "%H:%M:%S"
    } else {
        "%H:%M:%S%.3f"
    };
    dt.format(fmt).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_format_follows_the_visible_span() {
        // 2021-03-01 10:00:00 UTC
        let t = 1_614_592_800.0;
        assert_eq!(format_timestamp_tick(t, 90.0 * 86_400.0), "2021-03-01");
        assert_eq!(format_timestamp_tick(t, 3.0 * 86_400.0), "03-01 10:00");
        assert_eq!(format_timestamp_tick(t, 6.0 * 3_600.0), "10:00");
        assert_eq!(format_timestamp_tick(t, 600.0), "10:00:00");
        assert_eq!(format_timestamp_tick(t + 0.25, 10.0), "10:00:00.250");
    }

    #[test]
    fn unrepresentable_timestamps_fall_back_to_raw_seconds() {
        assert_eq!(format_timestamp_tick(f64::MAX, 10.0), format!("{:.0}", f64::MAX));
    }
}
