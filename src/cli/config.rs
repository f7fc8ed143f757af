// config.rs - Configuration file support

use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::core::tools::ToolPaths;
use crate::error::{Result, RsdError};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    // Filtering
    pub min_depth: Option<u32>,
    pub min_af: Option<f64>,
    pub snp_distance_cutoff: Option<usize>,

    // Algorithms
    pub mapper: Option<String>,
    pub caller: Option<String>,
    pub platform: Option<String>,
    pub samclip: Option<bool>,

    // Performance
    pub threads: Option<usize>,

    /// Executable paths of the external tools
    pub tools: Option<ToolPaths>,
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| RsdError::io(path, e))?;
        let config = Self::parse(&content)
            .map_err(|e| RsdError::Config(format!("failed to parse '{}': {}", path.display(), e)))?;

        info!("📄 Loaded configuration from: {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_config_parses() {
        let config = Config::parse(include_str!("../../rsd.example.toml")).unwrap();
        assert_eq!(config.min_depth, Some(10));
        assert_eq!(config.mapper.as_deref(), Some("bwa"));
        assert_eq!(config.tools.unwrap().samtools, "samtools");
    }

    #[test]
    fn test_partial_tools_section() {
        let config = Config::parse("threads = 2\n[tools]\nsamtools = \"/opt/bin/samtools\"\n").unwrap();
        let tools = config.tools.unwrap();
        assert_eq!(tools.samtools, "/opt/bin/samtools");
        assert_eq!(tools.bwa, "bwa");
        assert!(config.min_af.is_none());
    }

    #[test]
    fn test_from_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rsd.toml");
        std::fs::write(&path, "min_depht = 3\n").unwrap();
        assert!(matches!(Config::from_file(&path), Err(RsdError::Config(_))));
        assert!(matches!(Config::from_file(dir.path().join("none.toml")), Err(RsdError::Io { .. })));
    }
}
