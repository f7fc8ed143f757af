// mod.rs - CLI module

pub mod args;
pub mod config;
pub mod merge;
pub mod validation;

// Re-export main types for convenience
pub use args::{build_cli, Cli, InsertArgs, LinkArgs, MatrixArgs};
pub use config::Config;
pub use validation::{existing_file, validate_insert};
