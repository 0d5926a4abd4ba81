pub mod config;
pub mod delete;
pub mod format;
pub mod probe;
pub mod status;
pub mod sync;
