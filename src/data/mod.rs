pub mod csv_format;
pub mod formats;
pub mod table;
