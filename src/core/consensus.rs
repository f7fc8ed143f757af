// consensus.rs - Consensus sequence construction and consensus-to-VCF conversion

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use bio::io::fasta;
use log::{debug, warn};

use crate::core::mask::RegionMask;
use crate::core::vcf::{Genotype, VcfFile};
use crate::error::{Result, RsdError};

/// A named contig with its uppercased bases
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contig {
    pub id: String,
    pub seq: Vec<u8>,
}

pub fn read_fasta(path: &Path) -> Result<Vec<Contig>> {
    let file = File::open(path).map_err(|e| RsdError::io(path, e))?;
    let reader = fasta::Reader::new(BufReader::new(file));

    let mut contigs = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| RsdError::Fasta {
            path: path.to_path_buf(),
            message: format!("invalid record: {}", e),
        })?;
        contigs.push(Contig {
            id: record.id().to_string(),
            seq: record.seq().to_ascii_uppercase(),
        });
    }
    if contigs.is_empty() {
        return Err(RsdError::Fasta {
            path: path.to_path_buf(),
            message: "no sequences found".to_string(),
        });
    }
    Ok(contigs)
}

/// Inputs for building a sample consensus
#[derive(Debug, Clone)]
pub struct ConsensusRequest<'a> {
    pub sample_name: &'a str,
    pub reference: &'a Path,
    pub input_vcf: &'a Path,
    pub output_file: &'a Path,
    pub excluded_regions: &'a Path,
    pub low_dp_regions: &'a Path,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsensusStats {
    pub applied: usize,
    pub skipped_indels: usize,
    pub masked_calls: usize,
    pub masked_bases: usize,
}

/// Apply called substitutions to the reference and mask excluded and low-depth regions with `N`.
///
/// Indels are skipped so consensus coordinates stay identical to the reference.
/// Calls without a clear alt genotype (missing or mixed) are masked.
pub fn prepare_sample_consensus(req: &ConsensusRequest<'_>) -> Result<ConsensusStats> {
    let mut contigs = read_fasta(req.reference)?;
    let index: HashMap<String, usize> = contigs
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id.clone(), i))
        .collect();
    let vcf = VcfFile::read(req.input_vcf)?;
    let mut stats = ConsensusStats::default();

    for record in &vcf.records {
        let Some(&ci) = index.get(&record.chrom) else {
            warn!("⚠️  Skipping call on unknown contig {}:{}", record.chrom, record.pos);
            continue;
        };
        let seq = &mut contigs[ci].seq;
        let start = (record.pos - 1) as usize;
        let end = start + record.ref_allele.len();
        if end > seq.len() {
            warn!("⚠️  Skipping call past contig end {}:{}", record.chrom, record.pos);
            continue;
        }

        match record.genotype() {
            Genotype::Ref => {}
            Genotype::Alt(allele) => {
                if !record.is_substitution(allele) {
                    stats.skipped_indels += 1;
                    continue;
                }
                let alt = record.alts[allele - 1].as_bytes();
                if !seq[start..end].eq_ignore_ascii_case(record.ref_allele.as_bytes()) {
                    warn!(
                        "⚠️  REF mismatch at {}:{} ({} in VCF), call skipped",
                        record.chrom, record.pos, record.ref_allele
                    );
                    continue;
                }
                seq[start..end].copy_from_slice(&alt.to_ascii_uppercase());
                stats.applied += 1;
            }
            Genotype::Missing | Genotype::Mixed => {
                seq[start..end].fill(b'N');
                stats.masked_calls += 1;
            }
        }
    }

    let mask = if req.excluded_regions == req.low_dp_regions {
        RegionMask::from_bed_files(&[req.low_dp_regions])?
    } else {
        RegionMask::from_bed_files(&[req.excluded_regions, req.low_dp_regions])?
    };
    for contig in &mut contigs {
        stats.masked_bases += mask.apply(&contig.id, &mut contig.seq);
    }

    let out = File::create(req.output_file).map_err(|e| RsdError::io(req.output_file, e))?;
    let mut writer = fasta::Writer::new(BufWriter::new(out));
    for contig in &contigs {
        writer
            .write(&contig.id, Some(req.sample_name), &contig.seq)
            .map_err(|e| RsdError::io(req.output_file, e))?;
    }
    writer.flush().map_err(|e| RsdError::io(req.output_file, e))?;

    debug!(
        "Consensus {}: {} applied, {} indels skipped, {} calls masked, {} bases masked",
        req.sample_name, stats.applied, stats.skipped_indels, stats.masked_calls, stats.masked_bases
    );
    Ok(stats)
}

fn is_nucleotide(base: u8) -> bool {
    matches!(base, b'A' | b'C' | b'G' | b'T')
}

/// Write one VCF record per position where `consensus` differs from `reference`.
///
/// Called bases get `GT=1`; `N` or ambiguity codes become missing calls (`ALT=.`, `GT=.`).
/// Returns the number of records written.
pub fn consensus_fasta_to_vcf(
    consensus: &Path,
    reference: &Path,
    sample_name: &str,
    outfile: &Path,
) -> Result<usize> {
    let reference_contigs = read_fasta(reference)?;
    let consensus_contigs: HashMap<String, Vec<u8>> = read_fasta(consensus)?
        .into_iter()
        .map(|c| (c.id, c.seq))
        .collect();

    for id in consensus_contigs.keys() {
        if !reference_contigs.iter().any(|c| &c.id == id) {
            return Err(RsdError::Fasta {
                path: consensus.to_path_buf(),
                message: format!("contig '{}' is not in the reference", id),
            });
        }
    }

    let file = File::create(outfile).map_err(|e| RsdError::io(outfile, e))?;
    let mut w = BufWriter::new(file);
    let io_err = |e| RsdError::io(outfile, e);

    writeln!(w, "##fileformat=VCFv4.2").map_err(io_err)?;
    writeln!(w, "##source=rsd-{}", env!("CARGO_PKG_VERSION")).map_err(io_err)?;
    writeln!(w, "##reference={}", reference.display()).map_err(io_err)?;
    for contig in &reference_contigs {
        writeln!(w, "##contig=<ID={},length={}>", contig.id, contig.seq.len()).map_err(io_err)?;
    }
    writeln!(w, "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">").map_err(io_err)?;
    writeln!(
        w,
        "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\t{}",
        sample_name
    )
    .map_err(io_err)?;

    let mut written = 0;
    for contig in &reference_contigs {
        let Some(cons) = consensus_contigs.get(&contig.id) else {
            continue;
        };
        if cons.len() != contig.seq.len() {
            return Err(RsdError::Fasta {
                path: consensus.to_path_buf(),
                message: format!(
                    "contig '{}' has length {} but the reference has {}",
                    contig.id,
                    cons.len(),
                    contig.seq.len()
                ),
            });
        }
        for (i, (&r, &c)) in contig.seq.iter().zip(cons.iter()).enumerate() {
            if r == c || !is_nucleotide(r) {
                continue;
            }
            let (alt, gt) = if is_nucleotide(c) {
                ((c as char).to_string(), "1")
            } else {
                (".".to_string(), ".")
            };
            writeln!(
                w,
                "{}\t{}\t.\t{}\t{}\t.\tPASS\t.\tGT\t{}",
                contig.id,
                i + 1,
                r as char,
                alt,
                gt
            )
            .map_err(io_err)?;
            written += 1;
        }
    }
    w.flush().map_err(io_err)?;
    Ok(written)
}
