// validation.rs - Input validation utilities

use std::path::PathBuf;

use crate::cli::args::InsertArgs;
use crate::error::{Result, RsdError};

/// clap value parser for input files that must already exist
pub fn existing_file(value: &str) -> std::result::Result<PathBuf, String> {
    let path = PathBuf::from(value);
    if path.is_file() {
        Ok(path)
    } else {
        Err(format!("File {} does not exist.", value))
    }
}

/// Range checks that cannot be expressed in the clap definitions (values may come from a config file)
pub fn validate_insert(args: &InsertArgs) -> Result<()> {
    if !(0.0..=1.0).contains(&args.min_af) {
        return Err(RsdError::invalid_option(
            "--min-af",
            format!("{} is outside 0.0-1.0", args.min_af),
        ));
    }
    if args.threads == 0 {
        return Err(RsdError::invalid_option("--threads", "must be at least 1"));
    }
    if args.sample_name.trim().is_empty() {
        return Err(RsdError::invalid_option("--sample-name", "must not be empty"));
    }
    if args.sample_name.contains(['/', '\\']) {
        return Err(RsdError::invalid_option(
            "--sample-name",
            format!("'{}' must not contain path separators", args.sample_name),
        ));
    }
    Ok(())
}
