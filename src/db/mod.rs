// mod.rs - SNP distance database module

pub mod profile;
pub mod snpdb;

use std::path::Path;

use crate::error::Result;

pub use profile::{snp_distance, SampleProfile, SiteDiff};
pub use snpdb::{DbLock, Link, LinkReport, SnpDistDb, StoreSummary};

/// Taxon label given to every sample inserted from the command line
pub const DEFAULT_TAXA: &str = "bacteria";

/// Store of sample variant profiles with pairwise SNP distances
pub trait DistanceStore {
    /// Insert a sample from its consensus VCF, linking it to samples within `cutoff` SNPs
    fn store(&mut self, sample_name: &str, vcf_file: &Path, taxa: &str, cutoff: usize) -> Result<StoreSummary>;

    /// True when a sample of that name is already stored
    fn contains(&self, sample_name: &str) -> bool;

    /// Sample names and the full symmetric distance matrix (`None` across taxa)
    fn extract_matrix(&self) -> (Vec<String>, Vec<Vec<Option<usize>>>);

    fn inspect_link(&self, source: &str, target: &str) -> Result<LinkReport>;
}
