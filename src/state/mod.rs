pub mod label;
pub mod plot_spec;
pub mod settings;
