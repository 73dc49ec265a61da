pub mod decoder;
pub mod source;
pub mod types;
