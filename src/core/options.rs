// options.rs - Algorithm choices and filtering thresholds

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Read mapper used to build an alignment from a read pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mapper {
    #[default]
    Bwa,
    Minimap2,
}

impl Mapper {
    pub const NAMES: [&'static str; 2] = ["bwa", "minimap2"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mapper::Bwa => "bwa",
            Mapper::Minimap2 => "minimap2",
        }
    }
}

impl FromStr for Mapper {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bwa" => Ok(Mapper::Bwa),
            "minimap2" => Ok(Mapper::Minimap2),
            _ => Err(format!("Invalid mapper: {}. Use: bwa, minimap2", s)),
        }
    }
}

/// Variant caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Caller {
    #[default]
    Freebayes,
    Bcftools,
}

impl Caller {
    pub const NAMES: [&'static str; 2] = ["freebayes", "bcftools"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Caller::Freebayes => "freebayes",
            Caller::Bcftools => "bcftools",
        }
    }
}

impl FromStr for Caller {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "freebayes" => Ok(Caller::Freebayes),
            "bcftools" => Ok(Caller::Bcftools),
            _ => Err(format!("Invalid caller: {}. Use: freebayes, bcftools", s)),
        }
    }
}

/// Sequencing platform, written into the read group and used to pick a mapper preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Illumina,
    Nanopore,
}

impl Platform {
    pub const NAMES: [&'static str; 2] = ["illumina", "nanopore"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Illumina => "illumina",
            Platform::Nanopore => "nanopore",
        }
    }

    /// minimap2 `-x` preset for this platform
    pub fn minimap2_preset(&self) -> &'static str {
        match self {
            Platform::Illumina => "sr",
            Platform::Nanopore => "map-ont",
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "illumina" => Ok(Platform::Illumina),
            "nanopore" => Ok(Platform::Nanopore),
            _ => Err(format!("Invalid platform: {}. Use: illumina, nanopore", s)),
        }
    }
}

macro_rules! display_as_str {
    ($($t:ty),*) => {
        $(impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(Mapper, Caller, Platform);

/// Hard filters applied to raw variant calls
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Filters {
    /// Minimum alternate allele frequency
    pub af_hard: f64,
    /// Minimum read depth
    pub dp_hard: u32,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            af_hard: 0.75,
            dp_hard: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MappingOptions {
    pub sample_name: String,
    pub prefix: String,
    pub mapper: Mapper,
    pub platform: Platform,
    pub threads: usize,
}

#[derive(Debug, Clone)]
pub struct CallingOptions {
    pub prefix: String,
    pub caller: Caller,
    pub filters: Filters,
    pub threads: usize,
    pub samclip: bool,
}
