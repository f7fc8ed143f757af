// profile.rs - Per-sample variant profiles and pairwise SNP distance

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::core::vcf::{Genotype, VcfFile};

/// A called base that differs from the reference (1-based position)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub chrom: String,
    pub pos: u64,
    pub ref_base: String,
    pub alt: String,
}

impl Variant {
    fn key(&self) -> (&str, u64) {
        (&self.chrom, self.pos)
    }
}

/// Positions `[start, end)` (1-based) without a usable call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingRange {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleProfile {
    pub name: String,
    pub taxa: String,
    pub added: String,
    /// Sorted by (chrom, pos)
    pub variants: Vec<Variant>,
    /// Sorted by (chrom, start), non-overlapping
    pub missing: Vec<MissingRange>,
}

/// One site where two samples carry different bases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteDiff {
    pub chrom: String,
    pub pos: u64,
    pub source_base: String,
    pub target_base: String,
}

impl SampleProfile {
    /// Build a profile from a consensus VCF: alt calls become variants, missing calls become ranges
    pub fn from_vcf(name: &str, taxa: &str, vcf: &VcfFile) -> Self {
        let mut variants = Vec::new();
        let mut missing_sites: Vec<(&str, u64)> = Vec::new();

        for record in &vcf.records {
            match record.genotype() {
                Genotype::Alt(allele) => variants.push(Variant {
                    chrom: record.chrom.clone(),
                    pos: record.pos,
                    ref_base: record.ref_allele.to_ascii_uppercase(),
                    alt: record.alts[allele - 1].to_ascii_uppercase(),
                }),
                Genotype::Missing | Genotype::Mixed => {
                    let span = record.ref_allele.len().max(1) as u64;
                    for offset in 0..span {
                        missing_sites.push((&record.chrom, record.pos + offset));
                    }
                }
                Genotype::Ref => {}
            }
        }

        variants.sort_by(|a, b| a.key().cmp(&b.key()));
        variants.dedup_by(|a, b| a.key() == b.key());
        missing_sites.sort_unstable();
        missing_sites.dedup();

        let mut missing: Vec<MissingRange> = Vec::new();
        for (chrom, pos) in missing_sites {
            if let Some(range) = missing.last_mut() {
                if range.chrom == chrom && range.end == pos {
                    range.end = pos + 1;
                    continue;
                }
            }
            missing.push(MissingRange {
                chrom: chrom.to_string(),
                start: pos,
                end: pos + 1,
            });
        }
        // A variant site is never also missing
        variants.retain(|v| !is_in_ranges(&missing, &v.chrom, v.pos));

        Self {
            name: name.to_string(),
            taxa: taxa.to_string(),
            added: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            variants,
            missing,
        }
    }

    pub fn is_missing(&self, chrom: &str, pos: u64) -> bool {
        is_in_ranges(&self.missing, chrom, pos)
    }

    pub fn missing_bases(&self) -> u64 {
        self.missing.iter().map(|r| r.end - r.start).sum()
    }
}

fn is_in_ranges(ranges: &[MissingRange], chrom: &str, pos: u64) -> bool {
    let idx = ranges.partition_point(|r| (r.chrom.as_str(), r.start) <= (chrom, pos));
    idx > 0 && {
        let r = &ranges[idx - 1];
        r.chrom == chrom && pos < r.end
    }
}

/// Visit every site where `a` and `b` differ and neither is missing
fn walk_differences<F>(a: &SampleProfile, b: &SampleProfile, mut visit: F)
where
    F: FnMut(&str, u64, &str, &str),
{
    let (av, bv) = (&a.variants, &b.variants);
    let (mut i, mut j) = (0, 0);
    loop {
        let ord = match (av.get(i), bv.get(j)) {
            (Some(x), Some(y)) => x.key().cmp(&y.key()),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => break,
        };
        match ord {
            Ordering::Less => {
                let x = &av[i];
                i += 1;
                if !b.is_missing(&x.chrom, x.pos) {
                    visit(&x.chrom, x.pos, &x.alt, &x.ref_base);
                }
            }
            Ordering::Greater => {
                let y = &bv[j];
                j += 1;
                if !a.is_missing(&y.chrom, y.pos) {
                    visit(&y.chrom, y.pos, &y.ref_base, &y.alt);
                }
            }
            Ordering::Equal => {
                let (x, y) = (&av[i], &bv[j]);
                i += 1;
                j += 1;
                if x.alt != y.alt {
                    visit(&x.chrom, x.pos, &x.alt, &y.alt);
                }
            }
        }
    }
}

/// Number of sites where both samples have a call and the calls differ
pub fn snp_distance(a: &SampleProfile, b: &SampleProfile) -> usize {
    let mut distance = 0;
    walk_differences(a, b, |_, _, _, _| distance += 1);
    distance
}

pub fn differing_sites(a: &SampleProfile, b: &SampleProfile) -> Vec<SiteDiff> {
    let mut sites = Vec::new();
    walk_differences(a, b, |chrom, pos, source_base, target_base| {
        sites.push(SiteDiff {
            chrom: chrom.to_string(),
            pos,
            source_base: source_base.to_string(),
            target_base: target_base.to_string(),
        })
    });
    sites
}
