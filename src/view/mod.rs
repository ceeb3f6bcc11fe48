pub mod labeling;
pub mod viewport;
