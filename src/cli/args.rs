// args.rs - Command line arguments definition

use std::path::PathBuf;

use clap::builder::{PossibleValuesParser, TypedValueParser};
use clap::parser::ValueSource;
use clap::{value_parser, Arg, ArgAction, ArgGroup, ArgMatches, Command};

use crate::cli::validation::existing_file;
use crate::core::backend::ReadPair;
use crate::core::options::{Caller, Mapper, Platform};
use crate::output::OutputFormat;

/// Options that a config file may supply when they were not given on the command line
const CONFIGURABLE: [&str; 8] = [
    "min_depth",
    "min_af",
    "snp_distance_cutoff",
    "mapper",
    "caller",
    "platform",
    "threads",
    "samclip",
];

fn debug_arg() -> Arg {
    Arg::new("debug")
        .long("debug")
        .action(ArgAction::SetTrue)
        .help("Enable debug logging")
}

fn input_file(id: &'static str) -> Arg {
    Arg::new(id).value_parser(existing_file)
}

pub fn make_insert() -> Command {
    Command::new("insert")
        .about("Add a sample to the SNP distance database")
        .arg(
            input_file("read1")
                .short('1')
                .long("read1")
                .requires("read2")
                .help("Forward read file"),
        )
        .arg(
            input_file("read2")
                .short('2')
                .long("read2")
                .requires("read1")
                .help("Reverse read file"),
        )
        .arg(
            input_file("bam")
                .short('a')
                .long("bam")
                .help("BAM/CRAM file (indexed in the work directory when it has no index)"),
        )
        .group(
            ArgGroup::new("input")
                .args(["read1", "bam"])
                .required(true)
                .multiple(false),
        )
        .arg(
            input_file("ref")
                .short('r')
                .long("ref")
                .required(true)
                .help("Reference genome (FASTA)"),
        )
        .arg(
            Arg::new("output_db")
                .short('o')
                .long("output-db")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Output database file (created if missing)"),
        )
        .arg(
            Arg::new("sample_name")
                .short('s')
                .long("sample-name")
                .required(true)
                .help("Sample name"),
        )
        .arg(
            Arg::new("min_depth")
                .long("min-depth")
                .value_parser(value_parser!(u32))
                .default_value("10")
                .help("Minimum depth; lower coverage is masked"),
        )
        .arg(
            Arg::new("min_af")
                .long("min-af")
                .value_parser(value_parser!(f64))
                .default_value("0.75")
                .help("Minimum allele frequency of a called variant"),
        )
        .arg(
            input_file("excluded_regions_bed")
                .long("excluded-regions-bed")
                .help("BED file of regions to mask instead of the low-depth mask"),
        )
        .arg(
            Arg::new("snp_distance_cutoff")
                .long("snp-distance-cutoff")
                .value_parser(value_parser!(usize))
                .default_value("10")
                .help("Store links to samples within this many SNPs"),
        )
        .arg(
            Arg::new("mapper")
                .short('m')
                .long("mapper")
                .value_parser(PossibleValuesParser::new(Mapper::NAMES).try_map(|s| s.parse::<Mapper>()))
                .default_value("bwa")
                .help("Read mapper"),
        )
        .arg(
            Arg::new("caller")
                .short('c')
                .long("caller")
                .value_parser(PossibleValuesParser::new(Caller::NAMES).try_map(|s| s.parse::<Caller>()))
                .default_value("freebayes")
                .help("Variant caller"),
        )
        .arg(
            Arg::new("samclip")
                .long("samclip")
                .action(ArgAction::SetTrue)
                .help("Remove clipped alignments with samclip before calling"),
        )
        .arg(
            Arg::new("platform")
                .long("platform")
                .value_parser(PossibleValuesParser::new(Platform::NAMES).try_map(|s| s.parse::<Platform>()))
                .default_value("illumina")
                .help("Sequencing platform"),
        )
        .arg(
            Arg::new("threads")
                .short('t')
                .long("threads")
                .value_parser(value_parser!(usize))
                .default_value("1")
                .help("Number of threads"),
        )
        .arg(
            input_file("config")
                .long("config")
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("work_dir")
                .long("work-dir")
                .value_parser(value_parser!(PathBuf))
                .default_value(".")
                .help("Directory for intermediate and result files"),
        )
        .arg(debug_arg())
}

pub fn make_matrix() -> Command {
    Command::new("matrix")
        .about("Print the pairwise SNP distance matrix")
        .arg(
            input_file("input_db")
                .short('i')
                .long("input-db")
                .required(true)
                .help("Database file"),
        )
        .arg(
            Arg::new("output_matrix")
                .short('o')
                .long("output-matrix")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Output matrix file"),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .value_parser(
                    PossibleValuesParser::new(OutputFormat::NAMES).try_map(|s| s.parse::<OutputFormat>()),
                )
                .default_value("tsv")
                .help("Output matrix format"),
        )
        .arg(debug_arg())
}

pub fn make_link() -> Command {
    Command::new("link")
        .about("Inspect the SNP distance link between two samples")
        .arg(
            input_file("input_db")
                .short('i')
                .long("input-db")
                .required(true)
                .help("Database file"),
        )
        .arg(
            Arg::new("source")
                .short('s')
                .long("source")
                .required(true)
                .help("Source sample"),
        )
        .arg(
            Arg::new("target")
                .short('t')
                .long("target")
                .required(true)
                .help("Target sample"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print the link report as JSON"),
        )
        .arg(debug_arg())
}

/// Top-level command tree
pub fn build_cli() -> Command {
    Command::new("rsd")
        .version(env!("CARGO_PKG_VERSION"))
        .about("RSD: Real-time SNP Distance estimation")
        .propagate_version(true)
        .subcommand(make_insert())
        .subcommand(make_matrix())
        .subcommand(make_link())
}

fn path(m: &ArgMatches, id: &str) -> Option<PathBuf> {
    m.get_one::<PathBuf>(id).cloned()
}

#[derive(Debug, Clone)]
pub struct InsertArgs {
    pub reads: Option<ReadPair>,
    pub bam: Option<PathBuf>,
    pub reference: PathBuf,
    pub output_db: PathBuf,
    pub sample_name: String,
    pub min_depth: u32,
    pub min_af: f64,
    pub excluded_regions_bed: Option<PathBuf>,
    pub snp_distance_cutoff: usize,
    pub mapper: Mapper,
    pub caller: Caller,
    pub samclip: bool,
    pub platform: Platform,
    pub threads: usize,
    pub config: Option<PathBuf>,
    pub work_dir: PathBuf,
    pub debug: bool,
    /// Configurable options given explicitly on the command line
    explicit: Vec<&'static str>,
}

impl InsertArgs {
    pub fn from_matches(m: &ArgMatches) -> Self {
        let reads = match (path(m, "read1"), path(m, "read2")) {
            (Some(r1), Some(r2)) => Some(ReadPair { r1, r2 }),
            _ => None,
        };
        let explicit = CONFIGURABLE
            .iter()
            .copied()
            .filter(|id| m.value_source(id) == Some(ValueSource::CommandLine))
            .collect();

        Self {
            reads,
            bam: path(m, "bam"),
            reference: path(m, "ref").unwrap_or_default(),
            output_db: path(m, "output_db").unwrap_or_default(),
            sample_name: m.get_one::<String>("sample_name").cloned().unwrap_or_default(),
            min_depth: m.get_one::<u32>("min_depth").copied().unwrap_or(10),
            min_af: m.get_one::<f64>("min_af").copied().unwrap_or(0.75),
            excluded_regions_bed: path(m, "excluded_regions_bed"),
            snp_distance_cutoff: m.get_one::<usize>("snp_distance_cutoff").copied().unwrap_or(10),
            mapper: m.get_one::<Mapper>("mapper").copied().unwrap_or_default(),
            caller: m.get_one::<Caller>("caller").copied().unwrap_or_default(),
            samclip: m.get_flag("samclip"),
            platform: m.get_one::<Platform>("platform").copied().unwrap_or_default(),
            threads: m.get_one::<usize>("threads").copied().unwrap_or(1),
            config: path(m, "config"),
            work_dir: path(m, "work_dir").unwrap_or_else(|| PathBuf::from(".")),
            debug: m.get_flag("debug"),
            explicit,
        }
    }

    /// True when `id` was set on the command line rather than by its default
    pub fn is_explicit(&self, id: &str) -> bool {
        self.explicit.iter().any(|e| *e == id)
    }
}

#[derive(Debug, Clone)]
pub struct MatrixArgs {
    pub input_db: PathBuf,
    pub output_matrix: PathBuf,
    pub format: OutputFormat,
    pub debug: bool,
}

impl MatrixArgs {
    pub fn from_matches(m: &ArgMatches) -> Self {
        Self {
            input_db: path(m, "input_db").unwrap_or_default(),
            output_matrix: path(m, "output_matrix").unwrap_or_default(),
            format: m.get_one::<OutputFormat>("format").copied().unwrap_or_default(),
            debug: m.get_flag("debug"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LinkArgs {
    pub input_db: PathBuf,
    pub source: String,
    pub target: String,
    pub json: bool,
    pub debug: bool,
}

impl LinkArgs {
    pub fn from_matches(m: &ArgMatches) -> Self {
        Self {
            input_db: path(m, "input_db").unwrap_or_default(),
            source: m.get_one::<String>("source").cloned().unwrap_or_default(),
            target: m.get_one::<String>("target").cloned().unwrap_or_default(),
            json: m.get_flag("json"),
            debug: m.get_flag("debug"),
        }
    }
}

/// A parsed invocation
#[derive(Debug, Clone)]
pub enum Cli {
    Insert(InsertArgs),
    Matrix(MatrixArgs),
    Link(LinkArgs),
    /// No subcommand given; carries the rendered top-level help
    Help(String),
}

impl Cli {
    /// Parse an argument vector; `--help`, `--version` and usage errors come back as clap errors
    pub fn try_parse_from<I, T>(argv: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let mut cmd = build_cli();
        let matches = cmd.try_get_matches_from_mut(argv)?;
        match matches.subcommand() {
            Some(("insert", sub)) => Ok(Cli::Insert(InsertArgs::from_matches(sub))),
            Some(("matrix", sub)) => Ok(Cli::Matrix(MatrixArgs::from_matches(sub))),
            Some(("link", sub)) => Ok(Cli::Link(LinkArgs::from_matches(sub))),
            _ => Ok(Cli::Help(cmd.render_help().to_string())),
        }
    }

    pub fn debug(&self) -> bool {
        match self {
            Cli::Insert(a) => a.debug,
            Cli::Matrix(a) => a.debug,
            Cli::Link(a) => a.debug,
            Cli::Help(_) => false,
        }
    }
}
