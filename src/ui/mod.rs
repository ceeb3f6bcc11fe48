pub mod function_dialog;
pub mod plot_menu;
pub mod plot_panel;
