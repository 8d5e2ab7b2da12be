pub mod commands;
pub mod config;

pub use commands::{check, upload, UploadOptions, UploadSummary};
pub use config::Settings;
