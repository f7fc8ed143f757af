// external.rs - VariantBackend driven by bwa/minimap2/samtools/freebayes/bcftools/samclip

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::core::backend::{Alignment, ReadPair, VariantBackend, VariantCalls};
use crate::core::consensus::{self, ConsensusRequest};
use crate::core::mask::{self, LowDepthTracker};
use crate::core::options::{Caller, CallingOptions, Mapper, MappingOptions, Platform};
use crate::core::tools::{Stage, Tool, ToolRunner};
use crate::core::vcf;
use crate::error::{Result, RsdError};

/// `path` with `.ext` appended to the full file name (`ref.fa` -> `ref.fa.fai`)
fn sidecar(path: &Path, ext: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

fn has_alignment_index(bam: &Path) -> bool {
    ["bai", "csi", "crai"].iter().any(|ext| sidecar(bam, ext).exists())
        || bam.with_extension("bai").exists()
}

pub struct ExternalBackend {
    runner: ToolRunner,
    work_dir: PathBuf,
}

impl ExternalBackend {
    pub fn new(runner: ToolRunner, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            work_dir: work_dir.into(),
        }
    }

    fn output(&self, prefix: &str, suffix: &str) -> PathBuf {
        self.work_dir.join(format!("{}{}", prefix, suffix))
    }

    fn ensure_faidx(&self, reference: &Path) -> Result<()> {
        if sidecar(reference, "fai").exists() {
            return Ok(());
        }
        let mut cmd = self.runner.command(Tool::Samtools);
        cmd.arg("faidx").arg(reference);
        self.runner.run("📇 Indexing reference (samtools faidx)", Tool::Samtools, cmd)
    }

    fn ensure_bwa_index(&self, reference: &Path) -> Result<()> {
        if sidecar(reference, "bwt").exists() {
            return Ok(());
        }
        let mut cmd = self.runner.command(Tool::Bwa);
        cmd.arg("index").arg(reference);
        self.runner.run("📇 Indexing reference (bwa index)", Tool::Bwa, cmd)
    }

    fn index_alignment(&self, bam: &Path) -> Result<()> {
        let mut cmd = self.runner.command(Tool::Samtools);
        cmd.arg("index").arg(bam);
        self.runner.run("📇 Indexing alignment", Tool::Samtools, cmd)
    }

    /// Link (or copy) an input alignment into the work directory so its index is written there
    fn stage_alignment(&self, bam: &Path, sample_name: &str) -> Result<PathBuf> {
        let ext = bam.extension().and_then(|e| e.to_str()).unwrap_or("bam");
        let staged = self.output(sample_name, &format!(".input.{}", ext));
        fs::create_dir_all(&self.work_dir).map_err(|e| RsdError::io(&self.work_dir, e))?;

        // Leftovers of an earlier run may point at another input
        for path in ["bai", "csi", "crai"].iter().map(|ext| sidecar(&staged, ext)).chain([staged.clone()]) {
            if path.symlink_metadata().is_ok() {
                fs::remove_file(&path).map_err(|e| RsdError::io(&path, e))?;
            }
        }

        let target = fs::canonicalize(bam).map_err(|e| RsdError::io(bam, e))?;
        #[cfg(unix)]
        std::os::unix::fs::symlink(&target, &staged).map_err(|e| RsdError::io(&staged, e))?;
        #[cfg(not(unix))]
        fs::copy(&target, &staged).map_err(|e| RsdError::io(&staged, e))?;
        debug!("Staged {} as {}", bam.display(), staged.display());
        Ok(staged)
    }

    fn sort_stage(&self, threads: usize, output: &Path) -> Stage {
        let mut sort = self.runner.command(Tool::Samtools);
        sort.arg("sort")
            .arg("-@")
            .arg(threads.to_string())
            .arg("-o")
            .arg(output)
            .arg("-");
        Stage::new(Tool::Samtools, sort)
    }

    /// Clip reads with large soft/hard clips; returns the clipped BAM
    fn samclip(&self, alignment: &Alignment, reference: &Path, opts: &CallingOptions) -> Result<PathBuf> {
        let clipped = self.output(&opts.prefix, ".clipped.bam");

        let mut view = self.runner.command(Tool::Samtools);
        view.arg("view")
            .arg("-h")
            .arg("-T")
            .arg(reference)
            .arg(&alignment.bam_file);
        let mut clip = self.runner.command(Tool::Samclip);
        clip.arg("--ref").arg(reference);

        self.runner.run_pipeline(
            "✂️  Clipping reads (samclip)",
            vec![
                Stage::new(Tool::Samtools, view),
                Stage::new(Tool::Samclip, clip),
                self.sort_stage(opts.threads, &clipped),
            ],
            None,
        )?;
        self.index_alignment(&clipped)?;
        Ok(clipped)
    }
}

impl VariantBackend for ExternalBackend {
    fn map_reads(&self, reads: &ReadPair, reference: &Path, opts: &MappingOptions) -> Result<Alignment> {
        let mapper = match (opts.mapper, opts.platform) {
            (Mapper::Bwa, Platform::Nanopore) => {
                warn!("⚠️  bwa is not suited to nanopore reads, using minimap2 (map-ont)");
                Mapper::Minimap2
            }
            (mapper, _) => mapper,
        };

        self.ensure_faidx(reference)?;
        let read_group = format!(
            "@RG\\tID:{0}\\tSM:{0}\\tPL:{1}",
            opts.sample_name, opts.platform
        );
        let threads = opts.threads.to_string();

        let map_stage = match mapper {
            Mapper::Bwa => {
                self.ensure_bwa_index(reference)?;
                let mut cmd = self.runner.command(Tool::Bwa);
                cmd.arg("mem")
                    .arg("-t")
                    .arg(&threads)
                    .arg("-M")
                    .arg("-R")
                    .arg(&read_group)
                    .arg(reference)
                    .arg(&reads.r1)
                    .arg(&reads.r2);
                Stage::new(Tool::Bwa, cmd)
            }
            Mapper::Minimap2 => {
                let mut cmd = self.runner.command(Tool::Minimap2);
                cmd.arg("-a")
                    .arg("-x")
                    .arg(opts.platform.minimap2_preset())
                    .arg("-t")
                    .arg(&threads)
                    .arg("-R")
                    .arg(&read_group)
                    .arg(reference)
                    .arg(&reads.r1)
                    .arg(&reads.r2);
                Stage::new(Tool::Minimap2, cmd)
            }
        };

        let bam = self.output(&opts.prefix, ".bam");
        self.runner.run_pipeline(
            &format!("🧬 Mapping reads with {}", mapper),
            vec![map_stage, self.sort_stage(opts.threads, &bam)],
            None,
        )?;
        self.index_alignment(&bam)?;
        info!("✅ Reads mapped: {}", bam.display());

        Ok(Alignment {
            bam_file: bam,
            sample_name: opts.sample_name.clone(),
            platform: opts.platform,
        })
    }

    fn open_alignment(&self, bam: &Path, sample_name: &str, platform: Platform) -> Result<Alignment> {
        let bam_file = if has_alignment_index(bam) {
            bam.to_path_buf()
        } else {
            let staged = self.stage_alignment(bam, sample_name)?;
            self.index_alignment(&staged)?;
            staged
        };
        Ok(Alignment {
            bam_file,
            sample_name: sample_name.to_string(),
            platform,
        })
    }

    fn call_variants(&self, alignment: &Alignment, reference: &Path, opts: &CallingOptions) -> Result<VariantCalls> {
        self.ensure_faidx(reference)?;
        let bam = if opts.samclip {
            self.samclip(alignment, reference, opts)?
        } else {
            alignment.bam_file.clone()
        };
        let raw = self.output(&opts.prefix, ".raw.vcf");

        match opts.caller {
            Caller::Freebayes => {
                let mut cmd = self.runner.command(Tool::Freebayes);
                cmd.arg("-f")
                    .arg(reference)
                    .arg("-p")
                    .arg("1")
                    .arg("--haplotype-length")
                    .arg("-1")
                    .arg(&bam);
                self.runner.run_pipeline(
                    "🔬 Calling variants (freebayes)",
                    vec![Stage::new(Tool::Freebayes, cmd)],
                    Some(&raw),
                )?;
            }
            Caller::Bcftools => {
                let mut pileup = self.runner.command(Tool::Bcftools);
                pileup
                    .arg("mpileup")
                    .arg("-f")
                    .arg(reference)
                    .arg("-a")
                    .arg("FORMAT/AD,FORMAT/DP")
                    .arg("-B")
                    .arg("-q")
                    .arg("0")
                    .arg("-Q")
                    .arg("13")
                    .arg("--threads")
                    .arg(opts.threads.to_string())
                    .arg("-Ou")
                    .arg(&bam);
                let mut call = self.runner.command(Tool::Bcftools);
                call.arg("call")
                    .arg("--ploidy")
                    .arg("1")
                    .arg("-mv")
                    .arg("-Ov");
                self.runner.run_pipeline(
                    "🔬 Calling variants (bcftools)",
                    vec![Stage::new(Tool::Bcftools, pileup), Stage::new(Tool::Bcftools, call)],
                    Some(&raw),
                )?;
            }
        }

        let filtered = self.output(&opts.prefix, ".filtered.vcf");
        let stats = vcf::filter_vcf(&raw, &filtered, &opts.filters)?;
        info!(
            "✅ Variants called with {}: {} kept, {} filtered out (AF ≥ {}, DP ≥ {})",
            opts.caller, stats.kept, stats.dropped, opts.filters.af_hard, opts.filters.dp_hard
        );
        Ok(VariantCalls { filename: filtered })
    }

    fn low_depth_mask(&self, alignment: &Alignment, reference: &Path, outfile: &Path, min_dp: u32) -> Result<()> {
        let mut cmd = self.runner.command(Tool::Samtools);
        cmd.arg("depth")
            .arg("-aa")
            .arg("--reference")
            .arg(reference)
            .arg(&alignment.bam_file);

        let regions = self.runner.stream_stdout(
            "📉 Computing low-depth mask",
            Tool::Samtools,
            cmd,
            |stdout| {
                let mut reader = csv::ReaderBuilder::new()
                    .delimiter(b'\t')
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(stdout);
                let mut tracker = LowDepthTracker::new(min_dp);
                for (idx, row) in reader.deserialize::<(String, u64, u32)>().enumerate() {
                    let (chrom, pos, depth) = row.map_err(|e| RsdError::Bed {
                        path: PathBuf::from("samtools depth"),
                        line: idx + 1,
                        message: e.to_string(),
                    })?;
                    tracker.push(&chrom, pos, depth);
                }
                Ok(tracker.finish())
            },
        )?;

        mask::write_bed(outfile, &regions)?;
        let masked: u64 = regions.iter().map(|r| r.len()).sum();
        info!(
            "✅ Low-depth mask: {} regions, {} bases below depth {} → {}",
            regions.len(),
            masked,
            min_dp,
            outfile.display()
        );
        Ok(())
    }

    fn prepare_consensus(&self, request: &ConsensusRequest<'_>) -> Result<()> {
        let stats = consensus::prepare_sample_consensus(request)?;
        info!(
            "✅ Consensus written: {} ({} substitutions applied, {} bases masked)",
            request.output_file.display(),
            stats.applied,
            stats.masked_bases + stats.masked_calls
        );
        Ok(())
    }

    fn consensus_to_vcf(&self, consensus_fasta: &Path, reference: &Path, sample_name: &str, outfile: &Path) -> Result<()> {
        let records = consensus::consensus_fasta_to_vcf(consensus_fasta, reference, sample_name, outfile)?;
        info!("✅ Consensus VCF written: {} ({} records)", outfile.display(), records);
        Ok(())
    }
}
