// insert.rs - Reads/BAM to consensus VCF to database

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use log::info;

use crate::cli::InsertArgs;
use crate::core::backend::VariantBackend;
use crate::core::consensus::ConsensusRequest;
use crate::core::options::{CallingOptions, Filters, MappingOptions};
use crate::db::{DistanceStore, StoreSummary, DEFAULT_TAXA};
use crate::error::{Result, RsdError};

/// Files produced for one sample in the work directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleFiles {
    pub low_dp_bed: PathBuf,
    pub consensus_fasta: PathBuf,
    pub consensus_vcf: PathBuf,
}

impl SampleFiles {
    pub fn new(args: &InsertArgs) -> Self {
        let file = |suffix: &str| args.work_dir.join(format!("{}{}", args.sample_name, suffix));
        Self {
            low_dp_bed: file(".low_dp.bed"),
            consensus_fasta: file(".consensus.fasta"),
            consensus_vcf: file(".consensus.vcf"),
        }
    }
}

pub fn run<B, S>(args: &InsertArgs, backend: &B, store: &mut S) -> Result<StoreSummary>
where
    B: VariantBackend + ?Sized,
    S: DistanceStore + ?Sized,
{
    let start = Instant::now();
    let sample = args.sample_name.as_str();
    if store.contains(sample) {
        return Err(RsdError::SampleExists(sample.to_string()));
    }
    let files = SampleFiles::new(args);
    fs::create_dir_all(&args.work_dir).map_err(|e| RsdError::io(&args.work_dir, e))?;

    info!("🚀 Processing sample {}", sample);
    let alignment = match (&args.reads, &args.bam) {
        (Some(reads), _) => {
            let mapping = MappingOptions {
                sample_name: sample.to_string(),
                prefix: sample.to_string(),
                mapper: args.mapper,
                platform: args.platform,
                threads: args.threads,
            };
            backend.map_reads(reads, &args.reference, &mapping)?
        }
        (None, Some(bam)) => backend.open_alignment(bam, sample, args.platform)?,
        (None, None) => {
            return Err(RsdError::invalid_option(
                "--read1/--read2 or --bam",
                "one input is required",
            ))
        }
    };

    let calling = CallingOptions {
        prefix: sample.to_string(),
        caller: args.caller,
        filters: Filters {
            af_hard: args.min_af,
            dp_hard: args.min_depth,
        },
        threads: args.threads,
        samclip: args.samclip,
    };
    let calls = backend.call_variants(&alignment, &args.reference, &calling)?;

    backend.low_depth_mask(&alignment, &args.reference, &files.low_dp_bed, args.min_depth)?;

    let request = ConsensusRequest {
        sample_name: sample,
        reference: &args.reference,
        input_vcf: &calls.filename,
        output_file: &files.consensus_fasta,
        excluded_regions: args.excluded_regions_bed.as_deref().unwrap_or(files.low_dp_bed.as_path()),
        low_dp_regions: &files.low_dp_bed,
    };
    backend.prepare_consensus(&request)?;

    backend.consensus_to_vcf(&files.consensus_fasta, &args.reference, sample, &files.consensus_vcf)?;

    let summary = store.store(sample, &files.consensus_vcf, DEFAULT_TAXA, args.snp_distance_cutoff)?;
    info!(
        "✅ Sample {} inserted into database {} ({} variants, {} masked bases, {} links within {} SNPs) in {:.2}s",
        sample,
        args.output_db.display(),
        summary.variants,
        summary.missing_bases,
        summary.links.len(),
        args.snp_distance_cutoff,
        start.elapsed().as_secs_f64()
    );
    Ok(summary)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::core::backend::{Alignment, ReadPair, VariantCalls};
    use crate::core::options::{Caller, Mapper, Platform};
    use crate::db::LinkReport;
    use std::cell::RefCell;
    use std::path::Path;

    /// Records each call; writes nothing
    #[derive(Default)]
    pub(crate) struct StubBackend {
        pub calls: RefCell<Vec<String>>,
    }

    impl StubBackend {
        fn log(&self, entry: String) {
            self.calls.borrow_mut().push(entry);
        }
    }

    impl VariantBackend for StubBackend {
        fn map_reads(&self, reads: &ReadPair, _reference: &Path, opts: &MappingOptions) -> Result<Alignment> {
            self.log(format!(
                "map_reads {} {} {} {} t{}",
                reads.r1.display(),
                opts.sample_name,
                opts.mapper,
                opts.platform,
                opts.threads
            ));
            Ok(Alignment {
                bam_file: PathBuf::from(format!("{}.bam", opts.prefix)),
                sample_name: opts.sample_name.clone(),
                platform: opts.platform,
            })
        }

        fn open_alignment(&self, bam: &Path, sample_name: &str, platform: Platform) -> Result<Alignment> {
            self.log(format!("open_alignment {} {}", bam.display(), sample_name));
            Ok(Alignment {
                bam_file: bam.to_path_buf(),
                sample_name: sample_name.to_string(),
                platform,
            })
        }

        fn call_variants(&self, alignment: &Alignment, _reference: &Path, opts: &CallingOptions) -> Result<VariantCalls> {
            self.log(format!(
                "call_variants {} {} af{} dp{} samclip={}",
                alignment.bam_file.display(),
                opts.caller,
                opts.filters.af_hard,
                opts.filters.dp_hard,
                opts.samclip
            ));
            Ok(VariantCalls {
                filename: PathBuf::from(format!("{}.filtered.vcf", opts.prefix)),
            })
        }

        fn low_depth_mask(&self, _alignment: &Alignment, _reference: &Path, outfile: &Path, min_dp: u32) -> Result<()> {
            self.log(format!("low_depth_mask {} {}", name(outfile), min_dp));
            Ok(())
        }

        fn prepare_consensus(&self, request: &ConsensusRequest<'_>) -> Result<()> {
            self.log(format!(
                "prepare_consensus {} {} {} {}",
                request.input_vcf.display(),
                name(request.output_file),
                name(request.excluded_regions),
                name(request.low_dp_regions)
            ));
            Ok(())
        }

        fn consensus_to_vcf(&self, consensus: &Path, _reference: &Path, sample_name: &str, outfile: &Path) -> Result<()> {
            self.log(format!("consensus_to_vcf {} {} {}", name(consensus), sample_name, name(outfile)));
            Ok(())
        }
    }

    fn name(path: &Path) -> String {
        path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
    }

    /// Store that answers from fixed data and records insertions
    #[derive(Default)]
    pub(crate) struct StubStore {
        pub stored: Vec<(String, String, String, usize)>,
        pub samples: Vec<String>,
        pub matrix: Vec<Vec<Option<usize>>>,
        pub report: Option<LinkReport>,
    }

    impl DistanceStore for StubStore {
        fn store(&mut self, sample_name: &str, vcf_file: &Path, taxa: &str, cutoff: usize) -> Result<StoreSummary> {
            self.stored
                .push((sample_name.to_string(), name(vcf_file), taxa.to_string(), cutoff));
            Ok(StoreSummary {
                sample: sample_name.to_string(),
                variants: 3,
                missing_bases: 0,
                compared: 0,
                links: Vec::new(),
            })
        }

        fn contains(&self, sample_name: &str) -> bool {
            self.samples.iter().any(|s| s == sample_name) || self.stored.iter().any(|s| s.0 == sample_name)
        }

        fn extract_matrix(&self) -> (Vec<String>, Vec<Vec<Option<usize>>>) {
            (self.samples.clone(), self.matrix.clone())
        }

        fn inspect_link(&self, source: &str, target: &str) -> Result<LinkReport> {
            self.report
                .clone()
                .filter(|r| r.source == source && r.target == target)
                .ok_or_else(|| RsdError::UnknownSample(target.to_string()))
        }
    }

    fn parse_insert(dir: &Path, extra: &[&str]) -> InsertArgs {
        let touch = |n: &str| {
            let p = dir.join(n);
            fs::write(&p, "").unwrap();
            p.display().to_string()
        };
        let reference = touch("ref.fa");
        let work = dir.join("work").display().to_string();
        let mut argv = vec![
            "rsd".to_string(),
            "insert".to_string(),
            "-r".to_string(),
            reference,
            "-o".to_string(),
            "db.rsd".to_string(),
            "-s".to_string(),
            "S1".to_string(),
            "--work-dir".to_string(),
            work,
        ];
        for arg in extra {
            // Bare file names become real files so the existence check passes
            if arg.ends_with(".fq") || arg.ends_with(".bam") || arg.ends_with(".bed") {
                argv.push(touch(arg));
            } else {
                argv.push(arg.to_string());
            }
        }
        match Cli::try_parse_from(argv).unwrap() {
            Cli::Insert(args) => args,
            _ => panic!("expected insert"),
        }
    }

    #[test]
    fn test_insert_from_reads_calls_steps_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let args = parse_insert(
            dir.path(),
            &["-1", "r1.fq", "-2", "r2.fq", "-m", "minimap2", "-c", "bcftools", "-t", "4", "--min-depth", "5"],
        );
        let backend = StubBackend::default();
        let mut store = StubStore::default();

        let summary = run(&args, &backend, &mut store).unwrap();
        assert_eq!(summary.sample, "S1");
        assert!(dir.path().join("work").is_dir());

        let calls = backend.calls.borrow();
        let r1 = dir.path().join("r1.fq");
        assert_eq!(
            *calls,
            vec![
                format!("map_reads {} S1 minimap2 illumina t4", r1.display()),
                "call_variants S1.bam bcftools af0.75 dp5 samclip=false".to_string(),
                "low_depth_mask S1.low_dp.bed 5".to_string(),
                "prepare_consensus S1.filtered.vcf S1.consensus.fasta S1.low_dp.bed S1.low_dp.bed".to_string(),
                "consensus_to_vcf S1.consensus.fasta S1 S1.consensus.vcf".to_string(),
            ]
        );
        assert_eq!(
            store.stored,
            vec![("S1".to_string(), "S1.consensus.vcf".to_string(), "bacteria".to_string(), 10)]
        );
    }

    #[test]
    fn test_insert_from_bam_with_excluded_regions() {
        let dir = tempfile::tempdir().unwrap();
        let args = parse_insert(
            dir.path(),
            &["-a", "in.bam", "--excluded-regions-bed", "mask.bed", "--samclip", "--snp-distance-cutoff", "3"],
        );
        assert_eq!(args.mapper, Mapper::Bwa);
        assert_eq!(args.caller, Caller::Freebayes);
        let backend = StubBackend::default();
        let mut store = StubStore::default();

        run(&args, &backend, &mut store).unwrap();

        let calls = backend.calls.borrow();
        assert!(calls[0].starts_with("open_alignment ") && calls[0].ends_with("in.bam S1"));
        assert!(calls[1].ends_with("samclip=true"));
        // The user BED replaces the low-depth mask as excluded regions only
        assert_eq!(
            calls[3],
            "prepare_consensus S1.filtered.vcf S1.consensus.fasta mask.bed S1.low_dp.bed"
        );
        assert_eq!(store.stored[0].3, 3);
    }

    #[test]
    fn test_store_failure_propagates() {
        struct FailingStore;
        impl DistanceStore for FailingStore {
            fn store(&mut self, sample_name: &str, _: &Path, _: &str, _: usize) -> Result<StoreSummary> {
                Err(RsdError::SampleExists(sample_name.to_string()))
            }
            // Another insert lands the name after the up-front check
            fn contains(&self, _: &str) -> bool {
                false
            }
            fn extract_matrix(&self) -> (Vec<String>, Vec<Vec<Option<usize>>>) {
                (Vec::new(), Vec::new())
            }
            fn inspect_link(&self, source: &str, _: &str) -> Result<LinkReport> {
                Err(RsdError::UnknownSample(source.to_string()))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let args = parse_insert(dir.path(), &["-a", "in.bam"]);
        let err = run(&args, &StubBackend::default(), &mut FailingStore).unwrap_err();
        assert!(matches!(err, RsdError::SampleExists(ref s) if s == "S1"));
    }

    #[test]
    fn test_existing_sample_rejected_before_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let args = parse_insert(dir.path(), &["-1", "r1.fq", "-2", "r2.fq"]);
        let backend = StubBackend::default();
        let mut store = StubStore {
            samples: vec!["S0".to_string(), "S1".to_string()],
            ..Default::default()
        };

        let err = run(&args, &backend, &mut store).unwrap_err();
        assert!(matches!(err, RsdError::SampleExists(ref s) if s == "S1"));
        assert!(backend.calls.borrow().is_empty());
        assert!(store.stored.is_empty());
        assert!(!dir.path().join("work").exists());
    }
}
