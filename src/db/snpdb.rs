// snpdb.rs - File-backed SNP distance database

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::vcf::VcfFile;
use crate::db::profile::{differing_sites, snp_distance, SampleProfile, SiteDiff};
use crate::db::DistanceStore;
use crate::error::{Result, RsdError};

const MAGIC: &[u8; 4] = b"RSDB";
const FORMAT_VERSION: u32 = 1;

/// How long an insert waits for another writer to release the database
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(600);
const LOCK_POLL: Duration = Duration::from_millis(200);

/// `<db><suffix>` next to the database file
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Advisory `<db>.lock` file held while a writer reloads, updates and saves the database
#[derive(Debug)]
pub struct DbLock {
    path: PathBuf,
}

impl DbLock {
    /// Create the lock file, polling until `timeout` while another process holds it
    pub fn acquire(db_path: &Path, timeout: Duration) -> Result<Self> {
        let path = sibling(db_path, ".lock");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| RsdError::io(parent, e))?;
        }

        let start = Instant::now();
        let mut waiting = false;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    // Owner pid, for whoever finds a stale lock
                    let _ = writeln!(file, "{}", std::process::id());
                    debug!("Acquired lock {}", path.display());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if start.elapsed() >= timeout {
                        return Err(RsdError::Locked {
                            path: db_path.to_path_buf(),
                            lock: path,
                        });
                    }
                    if !waiting {
                        warn!("⏳ Waiting for database lock: {}", path.display());
                        waiting = true;
                    }
                    thread::sleep(LOCK_POLL.min(timeout));
                }
                Err(e) => return Err(RsdError::io(&path, e)),
            }
        }
    }
}

impl Drop for DbLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("⚠️ Failed to remove lock {}: {}", self.path.display(), e);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContigInfo {
    pub name: String,
    pub length: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbMetadata {
    pub version: String,
    pub created: String,
    pub last_modified: String,
    pub format_version: u32,
    /// Contig set shared by every sample; fixed by the first insertion
    pub contigs: Vec<ContigInfo>,
}

/// A pair of samples within the SNP cutoff in force when the later one was inserted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub source: String,
    pub target: String,
    pub distance: usize,
    pub cutoff: usize,
}

impl Link {
    fn joins(&self, a: &str, b: &str) -> bool {
        (self.source == a && self.target == b) || (self.source == b && self.target == a)
    }
}

/// Outcome of inserting one sample
#[derive(Debug, Clone)]
pub struct StoreSummary {
    pub sample: String,
    pub variants: usize,
    pub missing_bases: u64,
    pub compared: usize,
    pub links: Vec<Link>,
}

/// Relationship between two samples
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkReport {
    pub source: String,
    pub target: String,
    pub distance: usize,
    /// True when a link within cutoff is stored for the pair
    pub linked: bool,
    pub cutoff: Option<usize>,
    pub sites: Vec<SiteDiff>,
}

impl fmt::Display for LinkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "source\t{}", self.source)?;
        writeln!(f, "target\t{}", self.target)?;
        writeln!(f, "distance\t{}", self.distance)?;
        match self.cutoff {
            Some(cutoff) if self.linked => writeln!(f, "linked\tyes (cutoff {})", cutoff)?,
            _ => writeln!(f, "linked\tno")?,
        }
        if !self.sites.is_empty() {
            writeln!(f, "#chrom\tpos\t{}\t{}", self.source, self.target)?;
            for site in &self.sites {
                writeln!(
                    f,
                    "{}\t{}\t{}\t{}",
                    site.chrom, site.pos, site.source_base, site.target_base
                )?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnpDistDb {
    #[serde(skip)]
    path: PathBuf,
    #[serde(skip)]
    lock_timeout: Duration,
    pub metadata: DbMetadata,
    samples: Vec<SampleProfile>,
    links: Vec<Link>,
}

fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

impl SnpDistDb {
    fn empty(path: &Path) -> Self {
        let created = now();
        Self {
            path: path.to_path_buf(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            metadata: DbMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                created: created.clone(),
                last_modified: created,
                format_version: FORMAT_VERSION,
                contigs: Vec::new(),
            },
            samples: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Open the database at `path`, starting an empty one if the file does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            info!("🆕 Creating new SNP distance database: {}", path.display());
            Ok(Self::empty(path))
        }
    }

    /// Open a database that must already exist
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        Self::load(path.as_ref())
    }

    fn load(path: &Path) -> Result<Self> {
        let start = Instant::now();
        let bytes = fs::read(path).map_err(|e| RsdError::io(path, e))?;
        let corrupt = |message: String| RsdError::CorruptDatabase {
            path: path.to_path_buf(),
            message,
        };

        if bytes.len() < 8 || &bytes[..4] != MAGIC {
            return Err(corrupt("not an rsd database (bad magic)".to_string()));
        }
        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(&bytes[4..8]);
        let expected_crc = u32::from_le_bytes(crc_bytes);

        let payload = lz4_flex::decompress_size_prepended(&bytes[8..])
            .map_err(|e| corrupt(format!("failed to decompress: {}", e)))?;
        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            return Err(corrupt(format!(
                "checksum mismatch (stored {:08x}, computed {:08x})",
                expected_crc, actual_crc
            )));
        }

        let mut db: SnpDistDb = serde_json::from_slice(&payload)
            .map_err(|e| corrupt(format!("failed to parse: {}", e)))?;
        if db.metadata.format_version > FORMAT_VERSION {
            return Err(corrupt(format!(
                "format version {} is newer than supported version {}",
                db.metadata.format_version, FORMAT_VERSION
            )));
        }
        db.path = path.to_path_buf();
        db.lock_timeout = DEFAULT_LOCK_TIMEOUT;
        debug!(
            "Loaded database {} ({} samples, {} links) in {:.2}s",
            path.display(),
            db.samples.len(),
            db.links.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(db)
    }

    /// Write the database through a temporary file renamed into place
    pub fn save(&mut self) -> Result<()> {
        self.metadata.last_modified = now();
        self.metadata.version = env!("CARGO_PKG_VERSION").to_string();

        let payload = serde_json::to_vec(&*self)
            .map_err(|e| RsdError::Output(format!("failed to serialize database: {}", e)))?;
        let crc = crc32fast::hash(&payload);
        let compressed = lz4_flex::compress_prepend_size(&payload);

        let mut bytes = Vec::with_capacity(compressed.len() + 8);
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes.extend_from_slice(&compressed);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| RsdError::io(parent, e))?;
        }
        let tmp = sibling(&self.path, ".tmp");
        fs::write(&tmp, &bytes).map_err(|e| RsdError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| RsdError::io(&self.path, e))?;

        debug!(
            "Saved database {} ({} samples, {} KB)",
            self.path.display(),
            self.samples.len(),
            bytes.len() / 1024
        );
        Ok(())
    }

    /// Override how long `store` waits for the database lock
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Replace the in-memory state with what is on disk now
    fn reload(&mut self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let fresh = Self::load(&self.path)?;
        self.metadata = fresh.metadata;
        self.samples = fresh.samples;
        self.links = fresh.links;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sample_names(&self) -> Vec<&str> {
        self.samples.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn sample(&self, name: &str) -> Option<&SampleProfile> {
        self.samples.iter().find(|s| s.name == name)
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    fn check_contigs(&mut self, sample: &str, vcf: &VcfFile) -> Result<()> {
        let contigs: Vec<ContigInfo> = vcf
            .contigs()
            .into_iter()
            .map(|(name, length)| ContigInfo { name, length })
            .collect();
        if contigs.is_empty() {
            return Ok(());
        }
        if self.metadata.contigs.is_empty() {
            self.metadata.contigs = contigs;
            return Ok(());
        }
        if self.metadata.contigs != contigs {
            let describe = |c: &[ContigInfo]| {
                c.iter()
                    .map(|c| match c.length {
                        Some(len) => format!("{}:{}", c.name, len),
                        None => c.name.clone(),
                    })
                    .collect::<Vec<_>>()
                    .join(",")
            };
            return Err(RsdError::ContigMismatch {
                sample: sample.to_string(),
                detail: format!(
                    "database has [{}], sample has [{}]",
                    describe(&self.metadata.contigs),
                    describe(&contigs)
                ),
            });
        }
        Ok(())
    }

    fn require(&self, name: &str) -> Result<&SampleProfile> {
        self.sample(name)
            .ok_or_else(|| RsdError::UnknownSample(name.to_string()))
    }
}

impl DistanceStore for SnpDistDb {
    fn store(&mut self, sample_name: &str, vcf_file: &Path, taxa: &str, cutoff: usize) -> Result<StoreSummary> {
        // Held until the save below; other inserts may have landed since open
        let _lock = DbLock::acquire(&self.path, self.lock_timeout)?;
        self.reload()?;

        if self.sample(sample_name).is_some() {
            return Err(RsdError::SampleExists(sample_name.to_string()));
        }
        let vcf = VcfFile::read(vcf_file)?;
        self.check_contigs(sample_name, &vcf)?;
        let profile = SampleProfile::from_vcf(sample_name, taxa, &vcf);

        let start = Instant::now();
        let distances: Vec<(String, usize)> = self
            .samples
            .par_iter()
            .filter(|other| other.taxa == taxa)
            .map(|other| (other.name.clone(), snp_distance(&profile, other)))
            .collect();

        let links: Vec<Link> = distances
            .iter()
            .filter(|(_, d)| *d <= cutoff)
            .map(|(target, distance)| Link {
                source: sample_name.to_string(),
                target: target.clone(),
                distance: *distance,
                cutoff,
            })
            .collect();
        debug!(
            "Compared {} against {} samples in {:.2}s",
            sample_name,
            distances.len(),
            start.elapsed().as_secs_f64()
        );
        for link in &links {
            info!("🔗 {} ↔ {}: {} SNPs", link.source, link.target, link.distance);
        }

        let summary = StoreSummary {
            sample: sample_name.to_string(),
            variants: profile.variants.len(),
            missing_bases: profile.missing_bases(),
            compared: distances.len(),
            links: links.clone(),
        };
        self.samples.push(profile);
        self.links.extend(links);
        self.save()?;
        Ok(summary)
    }

    fn contains(&self, sample_name: &str) -> bool {
        self.sample(sample_name).is_some()
    }

    fn extract_matrix(&self) -> (Vec<String>, Vec<Vec<Option<usize>>>) {
        let n = self.samples.len();
        let names = self.samples.iter().map(|s| s.name.clone()).collect();
        let pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
            .collect();

        let distances: Vec<(usize, usize, Option<usize>)> = pairs
            .par_iter()
            .map(|&(i, j)| {
                let (a, b) = (&self.samples[i], &self.samples[j]);
                let d = (a.taxa == b.taxa).then(|| snp_distance(a, b));
                (i, j, d)
            })
            .collect();

        let mut matrix = vec![vec![None; n]; n];
        for (i, row) in matrix.iter_mut().enumerate() {
            row[i] = Some(0);
        }
        for (i, j, d) in distances {
            matrix[i][j] = d;
            matrix[j][i] = d;
        }
        (names, matrix)
    }

    fn inspect_link(&self, source: &str, target: &str) -> Result<LinkReport> {
        let a = self.require(source)?;
        let b = self.require(target)?;
        let sites = differing_sites(a, b);
        let stored = self.links.iter().find(|l| l.joins(source, target));
        Ok(LinkReport {
            source: source.to_string(),
            target: target.to_string(),
            distance: sites.len(),
            linked: stored.is_some(),
            cutoff: stored.map(|l| l.cutoff),
            sites,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const HEADER: &str = "##fileformat=VCFv4.2\n##contig=<ID=chr1,length=100>\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS\n";

    fn consensus_vcf(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(format!("{}.consensus.vcf", name));
        fs::write(&path, format!("{}{}", HEADER, body)).unwrap();
        path
    }

    fn snp(pos: u64, r: &str, a: &str) -> String {
        format!("chr1\t{}\t.\t{}\t{}\t.\tPASS\t.\tGT\t1\n", pos, r, a)
    }

    fn masked(pos: u64) -> String {
        format!("chr1\t{}\t.\tA\t.\t.\tPASS\t.\tGT\t.\n", pos)
    }

    fn populated(dir: &Path) -> SnpDistDb {
        let mut db = SnpDistDb::open(dir.join("snps.db")).unwrap();
        let a = consensus_vcf(dir, "A", &(snp(10, "C", "T") + &snp(20, "G", "A")));
        let b = consensus_vcf(dir, "B", &snp(10, "C", "T"));
        let c = consensus_vcf(dir, "C", &(snp(30, "A", "G") + &snp(40, "A", "G") + &masked(20)));
        db.store("A", &a, "bacteria", 10).unwrap();
        db.store("B", &b, "bacteria", 10).unwrap();
        db.store("C", &c, "bacteria", 2).unwrap();
        db
    }

    #[test]
    fn test_store_records_links_within_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        let db = populated(dir.path());

        assert_eq!(db.sample_names(), vec!["A", "B", "C"]);
        // B-A: 1; C-A: 10 differs, 20 masked in C, 30, 40 -> 3 (> 2); C-B: 10, 30, 40 -> 3
        assert_eq!(
            db.links(),
            &[Link {
                source: "B".to_string(),
                target: "A".to_string(),
                distance: 1,
                cutoff: 10,
            }]
        );
    }

    #[test]
    fn test_extract_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let db = populated(dir.path());
        let (samples, matrix) = db.extract_matrix();
        assert_eq!(samples, vec!["A", "B", "C"]);
        assert_eq!(
            matrix,
            vec![
                vec![Some(0), Some(1), Some(3)],
                vec![Some(1), Some(0), Some(3)],
                vec![Some(3), Some(3), Some(0)],
            ]
        );
    }

    #[test]
    fn test_matrix_separates_taxa() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = SnpDistDb::open(dir.path().join("snps.db")).unwrap();
        let a = consensus_vcf(dir.path(), "A", &snp(10, "C", "T"));
        let b = consensus_vcf(dir.path(), "B", &snp(10, "C", "T"));
        db.store("A", &a, "bacteria", 10).unwrap();
        let summary = db.store("B", &b, "virus", 10).unwrap();
        assert_eq!(summary.compared, 0);
        let (_, matrix) = db.extract_matrix();
        assert_eq!(matrix[0][1], None);
    }

    #[test]
    fn test_inspect_link() {
        let dir = tempfile::tempdir().unwrap();
        let db = populated(dir.path());

        let report = db.inspect_link("A", "B").unwrap();
        assert_eq!(report.distance, 1);
        assert!(report.linked);
        assert_eq!(report.cutoff, Some(10));
        assert_eq!(report.sites[0].pos, 20);
        assert_eq!(report.sites[0].source_base, "A");
        assert_eq!(report.sites[0].target_base, "G");
        assert!(report.to_string().contains("linked\tyes (cutoff 10)"));

        let unlinked = db.inspect_link("C", "A").unwrap();
        assert_eq!(unlinked.distance, 3);
        assert!(!unlinked.linked);

        assert!(matches!(
            db.inspect_link("A", "Z"),
            Err(RsdError::UnknownSample(name)) if name == "Z"
        ));
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snps.db");
        populated(dir.path());

        let reopened = SnpDistDb::open_existing(&path).unwrap();
        assert_eq!(reopened.sample_names(), vec!["A", "B", "C"]);
        assert_eq!(reopened.links().len(), 1);
        assert_eq!(
            reopened.metadata.contigs,
            vec![ContigInfo { name: "chr1".to_string(), length: Some(100) }]
        );
        assert!(!dir.path().join("snps.db.tmp").exists());
        assert!(!dir.path().join("snps.db.lock").exists());
    }

    #[test]
    fn test_handles_opened_together_keep_both_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snps.db");
        let a = consensus_vcf(dir.path(), "A", &snp(10, "C", "T"));
        let b = consensus_vcf(dir.path(), "B", &snp(20, "G", "A"));

        // Both inserts open the database before either stores
        let mut first = SnpDistDb::open(&path).unwrap();
        let mut second = SnpDistDb::open(&path).unwrap();
        first.store("A", &a, "bacteria", 10).unwrap();
        let summary = second.store("B", &b, "bacteria", 10).unwrap();
        assert_eq!(summary.compared, 1);
        assert_eq!(summary.links[0].target, "A");

        let reopened = SnpDistDb::open_existing(&path).unwrap();
        assert_eq!(reopened.sample_names(), vec!["A", "B"]);
        assert_eq!(reopened.links().len(), 1);
        assert!(!dir.path().join("snps.db.lock").exists());

        // The stale handle also sees the other insert as a duplicate
        assert!(matches!(
            first.store("B", &b, "bacteria", 10),
            Err(RsdError::SampleExists(name)) if name == "B"
        ));
    }

    #[test]
    fn test_parallel_inserts_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snps.db");
        let names = ["A", "B", "C", "D"];
        let vcfs: Vec<PathBuf> = names
            .iter()
            .enumerate()
            .map(|(i, name)| consensus_vcf(dir.path(), name, &snp(10 + i as u64, "C", "T")))
            .collect();

        thread::scope(|scope| {
            for (name, vcf) in names.iter().zip(&vcfs) {
                let path = &path;
                scope.spawn(move || {
                    let mut db = SnpDistDb::open(path).unwrap();
                    db.store(name, vcf, "bacteria", 10).unwrap();
                });
            }
        });

        let reopened = SnpDistDb::open_existing(&path).unwrap();
        let mut stored = reopened.sample_names();
        stored.sort_unstable();
        assert_eq!(stored, names);
        // Every pair differs at two sites
        assert_eq!(reopened.links().len(), 6);
    }

    #[test]
    fn test_store_times_out_on_held_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snps.db");
        let a = consensus_vcf(dir.path(), "A", &snp(10, "C", "T"));

        let held = DbLock::acquire(&path, Duration::ZERO).unwrap();
        let mut db = SnpDistDb::open(&path)
            .unwrap()
            .with_lock_timeout(Duration::from_millis(50));
        assert!(matches!(
            db.store("A", &a, "bacteria", 10),
            Err(RsdError::Locked { .. })
        ));
        assert!(!path.exists());

        drop(held);
        assert!(!dir.path().join("snps.db.lock").exists());
        db.store("A", &a, "bacteria", 10).unwrap();
        assert_eq!(db.sample_names(), vec!["A"]);
    }

    #[test]
    fn test_duplicate_sample_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = populated(dir.path());
        let again = consensus_vcf(dir.path(), "A2", &snp(10, "C", "T"));
        assert!(matches!(
            db.store("A", &again, "bacteria", 10),
            Err(RsdError::SampleExists(_))
        ));
    }

    #[test]
    fn test_contig_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = populated(dir.path());
        let path = dir.path().join("other.vcf");
        fs::write(
            &path,
            "##contig=<ID=plasmid,length=5>\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS\n",
        )
        .unwrap();
        assert!(matches!(
            db.store("D", &path, "bacteria", 10),
            Err(RsdError::ContigMismatch { .. })
        ));
    }

    #[test]
    fn test_corruption_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snps.db");
        populated(dir.path());

        let mut bytes = fs::read(&path).unwrap();
        bytes[4] ^= 0xff;
        fs::write(&path, &bytes).unwrap();
        assert!(matches!(
            SnpDistDb::open_existing(&path),
            Err(RsdError::CorruptDatabase { .. })
        ));

        fs::write(&path, b"not a database").unwrap();
        assert!(matches!(
            SnpDistDb::open(&path),
            Err(RsdError::CorruptDatabase { .. })
        ));
    }

    #[test]
    fn test_open_existing_requires_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SnpDistDb::open_existing(dir.path().join("missing.db")),
            Err(RsdError::Io { .. })
        ));
    }
}
