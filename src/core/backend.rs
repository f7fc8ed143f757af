// backend.rs - Collaborator interface for the alignment/calling/consensus steps

use std::path::{Path, PathBuf};

use crate::core::consensus::ConsensusRequest;
use crate::core::options::{CallingOptions, MappingOptions, Platform};
use crate::error::Result;

/// Paired-end read files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPair {
    pub r1: PathBuf,
    pub r2: PathBuf,
}

/// A mapped read set or a pre-supplied BAM/CRAM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alignment {
    pub bam_file: PathBuf,
    pub sample_name: String,
    pub platform: Platform,
}

/// Result of variant calling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantCalls {
    /// Filtered VCF
    pub filename: PathBuf,
}

/// The steps that turn reads into a consensus VCF.
///
/// `ExternalBackend` drives the bioinformatics tools; tests substitute a stub.
pub trait VariantBackend {
    fn map_reads(&self, reads: &ReadPair, reference: &Path, opts: &MappingOptions) -> Result<Alignment>;

    fn open_alignment(&self, bam: &Path, sample_name: &str, platform: Platform) -> Result<Alignment>;

    fn call_variants(&self, alignment: &Alignment, reference: &Path, opts: &CallingOptions) -> Result<VariantCalls>;

    /// Write a BED of regions with depth below `min_dp`
    fn low_depth_mask(&self, alignment: &Alignment, reference: &Path, outfile: &Path, min_dp: u32) -> Result<()>;

    fn prepare_consensus(&self, request: &ConsensusRequest<'_>) -> Result<()>;

    fn consensus_to_vcf(&self, consensus: &Path, reference: &Path, sample_name: &str, outfile: &Path) -> Result<()>;
}
