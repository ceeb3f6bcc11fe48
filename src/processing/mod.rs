pub mod downsampling;
pub mod functions;
