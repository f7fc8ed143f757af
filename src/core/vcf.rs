// vcf.rs - Minimal VCF model: parsing, genotype access, hard filtering

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::core::options::Filters;
use crate::error::{Result, RsdError};

/// Genotype of the first sample column, reduced to what consensus building needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Genotype {
    Missing,
    Ref,
    /// Every called allele is this alt allele (1-based allele index)
    Alt(usize),
    /// Alleles disagree (heterozygous or mixed)
    Mixed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VcfRecord {
    pub chrom: String,
    /// 1-based position
    pub pos: u64,
    pub id: String,
    pub ref_allele: String,
    pub alts: Vec<String>,
    pub qual: String,
    pub filter: String,
    pub info: String,
    pub format: Vec<String>,
    pub sample: Vec<String>,
}

impl VcfRecord {
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 8 {
            return Err(format!("expected at least 8 columns, found {}", fields.len()));
        }
        let pos = fields[1]
            .parse::<u64>()
            .map_err(|e| format!("invalid POS '{}': {}", fields[1], e))?;
        if pos == 0 {
            return Err("POS must be 1-based".to_string());
        }
        let alts = if fields[4] == "." {
            Vec::new()
        } else {
            fields[4].split(',').map(str::to_string).collect()
        };
        let format = fields
            .get(8)
            .map(|f| f.split(':').map(str::to_string).collect())
            .unwrap_or_default();
        let sample = fields
            .get(9)
            .map(|s| s.split(':').map(str::to_string).collect())
            .unwrap_or_default();

        Ok(Self {
            chrom: fields[0].to_string(),
            pos,
            id: fields[2].to_string(),
            ref_allele: fields[3].to_string(),
            alts,
            qual: fields[5].to_string(),
            filter: fields[6].to_string(),
            info: fields[7].to_string(),
            format,
            sample,
        })
    }

    pub fn format_value(&self, key: &str) -> Option<&str> {
        let idx = self.format.iter().position(|k| k == key)?;
        self.sample.get(idx).map(String::as_str)
    }

    pub fn info_value(&self, key: &str) -> Option<&str> {
        self.info.split(';').find_map(|entry| {
            let (k, v) = entry.split_once('=')?;
            (k == key).then_some(v)
        })
    }

    pub fn genotype(&self) -> Genotype {
        let Some(gt) = self.format_value("GT") else {
            // Sites-only records carrying an ALT are taken as alt calls
            return if self.alts.len() == 1 { Genotype::Alt(1) } else { Genotype::Missing };
        };
        let alleles: Vec<Option<usize>> = gt
            .split(['/', '|'])
            .map(|a| a.parse::<usize>().ok())
            .collect();
        if alleles.is_empty() || alleles.iter().any(Option::is_none) {
            return Genotype::Missing;
        }
        let first = alleles[0];
        if alleles.iter().all(|a| *a == first) {
            match first {
                Some(0) => Genotype::Ref,
                Some(idx) if idx <= self.alts.len() => Genotype::Alt(idx),
                _ => Genotype::Missing,
            }
        } else {
            Genotype::Mixed
        }
    }

    /// Read depth: FORMAT/DP, then INFO/DP, then the sum of FORMAT/AD
    pub fn depth(&self) -> Option<u32> {
        if let Some(dp) = self.format_value("DP").and_then(|v| v.parse().ok()) {
            return Some(dp);
        }
        if let Some(dp) = self.info_value("DP").and_then(|v| v.parse().ok()) {
            return Some(dp);
        }
        self.allele_depths().map(|ad| ad.iter().sum())
    }

    /// Per-allele read counts (REF first) from AD, or from RO/AO as written by freebayes
    fn allele_depths(&self) -> Option<Vec<u32>> {
        if let Some(ad) = self.format_value("AD") {
            return parse_counts(ad);
        }
        let ro: u32 = self.format_value("RO")?.parse().ok()?;
        let mut counts = vec![ro];
        counts.extend(parse_counts(self.format_value("AO")?)?);
        Some(counts)
    }

    /// Frequency of the given 1-based alt allele among all reads at the site
    pub fn allele_frequency(&self, allele: usize) -> Option<f64> {
        if let Some(counts) = self.allele_depths() {
            let total: u32 = counts.iter().sum();
            if total == 0 {
                return Some(0.0);
            }
            return counts.get(allele).map(|&c| c as f64 / total as f64);
        }
        self.info_value("AF")?
            .split(',')
            .nth(allele.checked_sub(1)?)?
            .parse()
            .ok()
    }

    /// True when ALT number `allele` (1-based) has the REF length (SNPs and MNPs)
    pub fn is_substitution(&self, allele: usize) -> bool {
        allele
            .checked_sub(1)
            .and_then(|idx| self.alts.get(idx))
            .is_some_and(|alt| alt.len() == self.ref_allele.len() && !alt.starts_with('<'))
    }

    fn passes(&self, filters: &Filters) -> bool {
        let depth_ok = self.depth().is_some_and(|dp| dp >= filters.dp_hard);
        if !depth_ok {
            return false;
        }
        match self.genotype() {
            Genotype::Alt(idx) => self
                .allele_frequency(idx)
                .is_some_and(|af| af >= filters.af_hard),
            // Mixed calls are kept so the consensus can mask them
            Genotype::Mixed => true,
            Genotype::Ref | Genotype::Missing => false,
        }
    }
}

fn parse_counts(value: &str) -> Option<Vec<u32>> {
    value.split(',').map(|v| v.parse().ok()).collect()
}

/// Parsed VCF: meta/header lines (including `#CHROM`) and records
#[derive(Debug, Default)]
pub struct VcfFile {
    pub header: Vec<String>,
    pub records: Vec<VcfRecord>,
}

impl VcfFile {
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| RsdError::io(path, e))?;
        let reader = BufReader::new(file);
        let mut vcf = VcfFile::default();

        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| RsdError::io(path, e))?;
            if line.is_empty() {
                continue;
            }
            if line.starts_with('#') {
                vcf.header.push(line);
                continue;
            }
            let record = VcfRecord::parse(&line).map_err(|message| RsdError::Vcf {
                path: path.to_path_buf(),
                line: idx + 1,
                message,
            })?;
            vcf.records.push(record);
        }
        Ok(vcf)
    }

    /// Contig names and lengths declared in `##contig` lines, in header order
    pub fn contigs(&self) -> Vec<(String, Option<u64>)> {
        self.header
            .iter()
            .filter_map(|line| line.strip_prefix("##contig=<"))
            .filter_map(|body| {
                let body = body.trim_end_matches('>');
                let mut id = None;
                let mut length = None;
                for field in body.split(',') {
                    match field.split_once('=') {
                        Some(("ID", v)) => id = Some(v.to_string()),
                        Some(("length", v)) => length = v.parse().ok(),
                        _ => {}
                    }
                }
                id.map(|id| (id, length))
            })
            .collect()
    }

    /// Name of the first sample column, if any
    pub fn sample_name(&self) -> Option<&str> {
        self.header
            .iter()
            .rev()
            .find(|l| l.starts_with("#CHROM"))
            .and_then(|l| l.split('\t').nth(9))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub kept: usize,
    pub dropped: usize,
}

/// Copy `input` to `output`, keeping only records that pass the hard filters
pub fn filter_vcf(input: &Path, output: &Path, filters: &Filters) -> Result<FilterStats> {
    let file = File::open(input).map_err(|e| RsdError::io(input, e))?;
    let reader = BufReader::new(file);
    let out = File::create(output).map_err(|e| RsdError::io(output, e))?;
    let mut writer = BufWriter::new(out);
    let mut stats = FilterStats::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| RsdError::io(input, e))?;
        if line.starts_with('#') {
            writeln!(writer, "{}", line).map_err(|e| RsdError::io(output, e))?;
            continue;
        }
        if line.is_empty() {
            continue;
        }
        let record = VcfRecord::parse(&line).map_err(|message| RsdError::Vcf {
            path: input.to_path_buf(),
            line: idx + 1,
            message,
        })?;
        if record.passes(filters) {
            writeln!(writer, "{}", line).map_err(|e| RsdError::io(output, e))?;
            stats.kept += 1;
        } else {
            stats.dropped += 1;
        }
    }
    writer.flush().map_err(|e| RsdError::io(output, e))?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn record(line: &str) -> VcfRecord {
        VcfRecord::parse(line).unwrap()
    }

    #[test]
    fn test_parse_record() {
        let rec = record("chr1\t100\t.\tA\tG,T\t50\tPASS\tDP=30;AF=0.9\tGT:AD\t1:2,27,1");
        assert_eq!(rec.chrom, "chr1");
        assert_eq!(rec.pos, 100);
        assert_eq!(rec.alts, vec!["G", "T"]);
        assert_eq!(rec.info_value("DP"), Some("30"));
        assert_eq!(rec.format_value("AD"), Some("2,27,1"));
        assert_eq!(rec.genotype(), Genotype::Alt(1));
        assert_eq!(rec.depth(), Some(30));
        assert!((rec.allele_frequency(1).unwrap() - 0.9).abs() < 1e-9);

        assert!(VcfRecord::parse("chr1\t0\t.\tA\tG\t.\t.\t.").is_err());
        assert!(VcfRecord::parse("chr1\t10\t.\tA").is_err());
    }

    #[test]
    fn test_genotypes() {
        let gt = |g: &str| record(&format!("c\t1\t.\tA\tG\t.\t.\t.\tGT\t{}", g)).genotype();
        assert_eq!(gt("0"), Genotype::Ref);
        assert_eq!(gt("1/1"), Genotype::Alt(1));
        assert_eq!(gt("0|1"), Genotype::Mixed);
        assert_eq!(gt("."), Genotype::Missing);
        assert_eq!(gt("./."), Genotype::Missing);
        assert_eq!(gt("2"), Genotype::Missing);
    }

    #[test]
    fn test_freebayes_counts() {
        let rec = record("c\t5\t.\tC\tT\t80\t.\tDP=20\tGT:DP:RO:AO\t1:20:4:16");
        assert_eq!(rec.depth(), Some(20));
        assert!((rec.allele_frequency(1).unwrap() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_substitution() {
        assert!(record("c\t1\t.\tAC\tGT\t.\t.\t.").is_substitution(1));
        assert!(!record("c\t1\t.\tA\tAT\t.\t.\t.").is_substitution(1));
        assert!(!record("c\t1\t.\tA\t<DEL>\t.\t.\t.").is_substitution(1));
        assert!(!record("c\t1\t.\tA\t.\t.\t.\t.").is_substitution(1));

        // Only the called allele matters in a multi-allelic record
        let multi = record("c\t1\t.\tC\tT,CAG\t.\t.\t.");
        assert!(multi.is_substitution(1));
        assert!(!multi.is_substitution(2));
        assert!(!multi.is_substitution(0));
        assert!(!multi.is_substitution(3));
    }

    #[test]
    fn test_filter_vcf() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("raw.vcf");
        let output = dir.path().join("filtered.vcf");
        fs::write(
            &input,
            "##fileformat=VCFv4.2\n\
             ##contig=<ID=chr1,length=1000>\n\
             #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\n\
             chr1\t10\t.\tA\tG\t.\t.\t.\tGT:DP:AD\t1:30:2,28\n\
             chr1\t20\t.\tA\tG\t.\t.\t.\tGT:DP:AD\t1:5:0,5\n\
             chr1\t30\t.\tA\tG\t.\t.\t.\tGT:DP:AD\t1:30:15,15\n\
             chr1\t40\t.\tA\tG\t.\t.\t.\tGT:DP:AD\t0:30:30,0\n",
        )
        .unwrap();

        let stats = filter_vcf(&input, &output, &Filters::default()).unwrap();
        assert_eq!(stats, FilterStats { kept: 1, dropped: 3 });

        let vcf = VcfFile::read(&output).unwrap();
        assert_eq!(vcf.header.len(), 3);
        assert_eq!(vcf.records.len(), 1);
        assert_eq!(vcf.records[0].pos, 10);
        assert_eq!(vcf.contigs(), vec![("chr1".to_string(), Some(1000))]);
        assert_eq!(vcf.sample_name(), Some("S1"));
    }

    #[test]
    fn test_read_reports_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.vcf");
        fs::write(&path, "#CHROM\tPOS\n chr1\tx\t.\tA\tG\t.\t.\t.\n").unwrap();
        match VcfFile::read(&path) {
            Err(RsdError::Vcf { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected VCF error, got {:?}", other),
        }
    }
}
