// merge.rs - Merge configuration file with CLI arguments

use std::path::Path;
use std::str::FromStr;

use crate::cli::{Config, InsertArgs};
use crate::core::tools::ToolPaths;
use crate::error::{Result, RsdError};

fn parse_choice<T: FromStr<Err = String>>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|e: String| RsdError::Config(format!("{}: {}", key, e)))
}

impl InsertArgs {
    /// Merge with configuration from file.
    /// CLI arguments take precedence; config values only replace defaults.
    pub fn merge_with_config(mut self, config: &Config) -> Result<Self> {
        // Filtering
        if let Some(v) = config.min_depth.filter(|_| !self.is_explicit("min_depth")) {
            self.min_depth = v;
        }
        if let Some(v) = config.min_af.filter(|_| !self.is_explicit("min_af")) {
            self.min_af = v;
        }
        if let Some(v) = config
            .snp_distance_cutoff
            .filter(|_| !self.is_explicit("snp_distance_cutoff"))
        {
            self.snp_distance_cutoff = v;
        }

        // Algorithms
        if let Some(v) = config.mapper.as_deref().filter(|_| !self.is_explicit("mapper")) {
            self.mapper = parse_choice("mapper", v)?;
        }
        if let Some(v) = config.caller.as_deref().filter(|_| !self.is_explicit("caller")) {
            self.caller = parse_choice("caller", v)?;
        }
        if let Some(v) = config.platform.as_deref().filter(|_| !self.is_explicit("platform")) {
            self.platform = parse_choice("platform", v)?;
        }
        // A flag can only be switched on from the command line
        if !self.samclip && config.samclip.unwrap_or(false) {
            self.samclip = true;
        }

        // Performance
        if let Some(v) = config.threads.filter(|_| !self.is_explicit("threads")) {
            self.threads = v;
        }

        Ok(self)
    }

    /// Load configuration and merge with CLI args; also returns the configured tool paths
    pub fn with_config_file(self, config_path: &Path) -> Result<(Self, ToolPaths)> {
        let config = Config::from_file(config_path)?;
        let args = self.merge_with_config(&config)?;
        Ok((args, config.tools.unwrap_or_default()))
    }
}
