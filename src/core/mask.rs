// mask.rs - BED regions and low-depth mask construction

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{Result, RsdError};

/// A 0-based, half-open genomic interval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BedRegion {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
}

impl BedRegion {
    pub fn new(chrom: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            chrom: chrom.into(),
            start,
            end,
        }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Read the first three columns of a BED file
pub fn read_bed(path: &Path) -> Result<Vec<BedRegion>> {
    let file = File::open(path).map_err(|e| RsdError::io(path, e))?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .comment(Some(b'#'))
        .from_reader(file);

    let bed_err = |line: usize, message: String| RsdError::Bed {
        path: path.to_path_buf(),
        line,
        message,
    };

    let mut regions = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| bed_err(idx + 1, e.to_string()))?;
        let line = record.position().map(|p| p.line() as usize).unwrap_or(idx + 1);
        let chrom = match record.get(0) {
            Some(c) if !c.is_empty() => c,
            _ => continue,
        };
        if chrom == "track" || chrom == "browser" || chrom.starts_with("track ") || chrom.starts_with("browser ") {
            continue;
        }
        if record.len() < 3 {
            return Err(bed_err(line, format!("expected 3 columns, found {}", record.len())));
        }
        let start: u64 = record[1]
            .trim()
            .parse()
            .map_err(|e| bed_err(line, format!("invalid start '{}': {}", &record[1], e)))?;
        let end: u64 = record[2]
            .trim()
            .parse()
            .map_err(|e| bed_err(line, format!("invalid end '{}': {}", &record[2], e)))?;
        if end < start {
            return Err(bed_err(line, format!("end {} before start {}", end, start)));
        }
        regions.push(BedRegion::new(chrom, start, end));
    }
    Ok(regions)
}

pub fn write_bed(path: &Path, regions: &[BedRegion]) -> Result<()> {
    let file = File::create(path).map_err(|e| RsdError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    for r in regions {
        writeln!(writer, "{}\t{}\t{}", r.chrom, r.start, r.end).map_err(|e| RsdError::io(path, e))?;
    }
    writer.flush().map_err(|e| RsdError::io(path, e))
}

/// Folds per-position depths (in coordinate order) into merged low-depth regions
#[derive(Debug)]
pub struct LowDepthTracker {
    min_dp: u32,
    regions: Vec<BedRegion>,
    open: Option<BedRegion>,
}

impl LowDepthTracker {
    pub fn new(min_dp: u32) -> Self {
        Self {
            min_dp,
            regions: Vec::new(),
            open: None,
        }
    }

    /// Record the depth at a 1-based position
    pub fn push(&mut self, chrom: &str, pos: u64, depth: u32) {
        let start = pos.saturating_sub(1);
        if depth >= self.min_dp {
            self.close();
            return;
        }
        if let Some(region) = self.open.as_mut() {
            if region.chrom == chrom && region.end == start {
                region.end = start + 1;
                return;
            }
        }
        self.close();
        self.open = Some(BedRegion::new(chrom, start, start + 1));
    }

    fn close(&mut self) {
        if let Some(region) = self.open.take() {
            self.regions.push(region);
        }
    }

    pub fn finish(mut self) -> Vec<BedRegion> {
        self.close();
        self.regions
    }
}

/// Merged regions where depth falls below `min_dp`
pub fn low_depth_regions<I>(depths: I, min_dp: u32) -> Vec<BedRegion>
where
    I: IntoIterator<Item = (String, u64, u32)>,
{
    let mut tracker = LowDepthTracker::new(min_dp);
    for (chrom, pos, depth) in depths {
        tracker.push(&chrom, pos, depth);
    }
    tracker.finish()
}

/// Per-contig interval lookup used to mask consensus positions
#[derive(Debug, Default)]
pub struct RegionMask {
    by_chrom: HashMap<String, Vec<(u64, u64)>>,
}

impl RegionMask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, regions: impl IntoIterator<Item = BedRegion>) {
        for r in regions {
            self.by_chrom.entry(r.chrom).or_default().push((r.start, r.end));
        }
    }

    pub fn from_bed_files(paths: &[&Path]) -> Result<Self> {
        let mut mask = Self::new();
        for path in paths {
            mask.extend(read_bed(path)?);
        }
        Ok(mask)
    }

    /// Set every masked position of `seq` (contig `chrom`) to `N`; returns the number of bases masked
    pub fn apply(&self, chrom: &str, seq: &mut [u8]) -> usize {
        let Some(intervals) = self.by_chrom.get(chrom) else {
            return 0;
        };
        let mut masked = 0;
        for &(start, end) in intervals {
            let start = (start as usize).min(seq.len());
            let end = (end as usize).min(seq.len());
            for base in &mut seq[start..end] {
                if *base != b'N' {
                    *base = b'N';
                    masked += 1;
                }
            }
        }
        masked
    }

    pub fn total_regions(&self) -> usize {
        self.by_chrom.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn depths(chrom: &str, values: &[u32]) -> Vec<(String, u64, u32)> {
        values
            .iter()
            .enumerate()
            .map(|(i, &d)| (chrom.to_string(), i as u64 + 1, d))
            .collect()
    }

    #[test]
    fn test_low_depth_regions_merge_adjacent_positions() {
        let regions = low_depth_regions(depths("chr1", &[0, 0, 12, 15, 3, 4, 5, 20]), 10);
        assert_eq!(
            regions,
            vec![BedRegion::new("chr1", 0, 2), BedRegion::new("chr1", 4, 7)]
        );
    }

    #[test]
    fn test_low_depth_regions_split_on_contig_change() {
        let mut input = depths("chr1", &[1, 1]);
        input.extend(depths("chr2", &[1, 30, 1]));
        let regions = low_depth_regions(input, 10);
        assert_eq!(
            regions,
            vec![
                BedRegion::new("chr1", 0, 2),
                BedRegion::new("chr2", 0, 1),
                BedRegion::new("chr2", 2, 3),
            ]
        );
    }

    #[test]
    fn test_threshold_is_inclusive() {
        assert!(low_depth_regions(depths("c", &[10, 10]), 10).is_empty());
        assert_eq!(low_depth_regions(depths("c", &[9]), 10).len(), 1);
    }

    #[test]
    fn test_bed_round_trip_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regions.bed");
        fs::write(&path, "# comment\ntrack name=x\nchr1\t5\t10\textra\nchr2\t0\t1\n").unwrap();
        let regions = read_bed(&path).unwrap();
        assert_eq!(
            regions,
            vec![BedRegion::new("chr1", 5, 10), BedRegion::new("chr2", 0, 1)]
        );

        let out = dir.path().join("out.bed");
        write_bed(&out, &regions).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "chr1\t5\t10\nchr2\t0\t1\n");
    }

    #[test]
    fn test_bed_rejects_inverted_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.bed");
        fs::write(&path, "chr1\t10\t5\n").unwrap();
        assert!(matches!(read_bed(&path), Err(RsdError::Bed { .. })));
    }

    #[test]
    fn test_region_mask_apply() {
        let mut mask = RegionMask::new();
        mask.extend(vec![BedRegion::new("chr1", 1, 3), BedRegion::new("chr1", 2, 100)]);
        let mut seq = b"ACGTA".to_vec();
        assert_eq!(mask.apply("chr1", &mut seq), 4);
        assert_eq!(&seq, b"ANNNN");
        assert_eq!(mask.apply("chr2", &mut seq), 0);
        assert_eq!(mask.total_regions(), 2);
    }
}
