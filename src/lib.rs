// lib.rs - rsd library root

//! # rsd - Real-time SNP Distance estimation
//!
//! Turns sequencing reads (or an existing BAM/CRAM) of bacterial samples into
//! consensus variant profiles and keeps a persistent database of pairwise SNP
//! distances between them.
//!
//! ## Features
//!
//! - **Pipeline**: read mapping (bwa, minimap2), variant calling (freebayes, bcftools)
//!   and optional samclip through external tools
//! - **Masking**: low-depth regions and user BED regions are masked in the consensus
//! - **Database**: single-file, checksummed, LZ4-compressed store of sample profiles
//!   and links within a SNP cutoff
//! - **Multiple formats**: TSV, CSV, PHYLIP, NEXUS matrix output
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use rsd::prelude::*;
//!
//! let db = SnpDistDb::open_existing("samples.rsd")?;
//! let (samples, matrix) = db.extract_matrix();
//! print_matrix(std::io::stdout(), &samples, &matrix)?;
//!
//! let report = db.inspect_link("S1", "S2")?;
//! println!("{}", report);
//! # Ok::<(), rsd::error::RsdError>(())
//! ```

pub mod cli;
pub mod commands;
pub mod core;
pub mod db;
pub mod error;
pub mod output;

// Convenience prelude for common imports
pub mod prelude {
    pub use crate::core::{ExternalBackend, ToolPaths, ToolRunner, VariantBackend};
    pub use crate::core::{Caller, CallingOptions, Filters, Mapper, MappingOptions, Platform};
    pub use crate::db::{DistanceStore, LinkReport, SnpDistDb};
    pub use crate::error::{Result, RsdError};
    pub use crate::output::{print_matrix, write_matrix, OutputFormat};
}

pub use error::{Result, RsdError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
