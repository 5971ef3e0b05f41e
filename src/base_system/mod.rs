pub mod cmd;
pub mod config;
pub mod context;
pub mod credential;
pub mod file_cleaner;
pub mod json_extract;
pub mod logging;
pub mod media_paths;
pub mod rate_limit;
