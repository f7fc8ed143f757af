// mod.rs - Distance matrix formatters

use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, RsdError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Tsv,
    Csv,
    Phylip,
    Nexus,
}

impl OutputFormat {
    pub const NAMES: [&'static str; 4] = ["tsv", "csv", "phylip", "nexus"];
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tsv" => Ok(OutputFormat::Tsv),
            "csv" => Ok(OutputFormat::Csv),
            "phylip" => Ok(OutputFormat::Phylip),
            "nexus" => Ok(OutputFormat::Nexus),
            _ => Err(format!("Unsupported output format: {}. Use: tsv, csv, phylip, nexus", s)),
        }
    }
}

fn write_err(e: std::io::Error) -> RsdError {
    RsdError::Output(format!("Write error: {}", e))
}

fn cell(d: Option<usize>, missing: &str) -> String {
    d.map_or_else(|| missing.to_string(), |d| d.to_string())
}

fn timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Write the matrix as a delimited table with a `Sample` header row
pub fn write_delimited<W: Write>(
    writer: W,
    delimiter: u8,
    samples: &[String],
    matrix: &[Vec<Option<usize>>],
) -> Result<()> {
    let mut table = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(writer);
    let csv_err = |e: csv::Error| RsdError::Output(format!("Write error: {}", e));

    let mut header = vec!["Sample".to_string()];
    header.extend(samples.iter().cloned());
    table.write_record(&header).map_err(csv_err)?;

    for (sample, row) in samples.iter().zip(matrix) {
        let mut record = vec![sample.clone()];
        record.extend(row.iter().map(|&d| cell(d, "NA")));
        table.write_record(&record).map_err(csv_err)?;
    }
    table.flush().map_err(write_err)
}

/// Print the sample list followed by the matrix table
pub fn print_matrix<W: Write>(mut out: W, samples: &[String], matrix: &[Vec<Option<usize>>]) -> Result<()> {
    writeln!(out, "Samples ({}): {}", samples.len(), samples.join(", ")).map_err(write_err)?;
    write_delimited(out, b'\t', samples, matrix)
}

fn write_phylip<W: Write>(w: &mut W, samples: &[String], matrix: &[Vec<Option<usize>>], command_line: &str) -> Result<()> {
    writeln!(w, "    {}", samples.len()).map_err(write_err)?;
    for (i, sample) in samples.iter().enumerate() {
        write!(w, "{:<10}", sample).map_err(write_err)?;
        for d in &matrix[i][..=i] {
            write!(w, "  {}", cell(*d, "NA")).map_err(write_err)?;
        }
        writeln!(w).map_err(write_err)?;
    }
    // PHYLIP has no comment syntax; trailing lines are ignored by most readers
    writeln!(w).map_err(write_err)?;
    writeln!(w, "# Command: {}", command_line).map_err(write_err)?;
    writeln!(w, "# Generated: {}", timestamp()).map_err(write_err)?;
    Ok(())
}

fn write_nexus<W: Write>(w: &mut W, samples: &[String], matrix: &[Vec<Option<usize>>], command_line: &str) -> Result<()> {
    writeln!(w, "#NEXUS").map_err(write_err)?;
    writeln!(w, "[Command: {}]", command_line).map_err(write_err)?;
    writeln!(w, "[Generated: {}]", timestamp()).map_err(write_err)?;
    writeln!(w, "BEGIN DISTANCES;").map_err(write_err)?;
    writeln!(w, "    DIMENSIONS NTAX={};", samples.len()).map_err(write_err)?;
    writeln!(w, "    FORMAT LABELS LOWER DIAGONAL;").map_err(write_err)?;
    writeln!(w, "    MATRIX").map_err(write_err)?;
    for (i, sample) in samples.iter().enumerate() {
        write!(w, "        {}", sample).map_err(write_err)?;
        for d in &matrix[i][..i] {
            write!(w, " {}", cell(*d, "?")).map_err(write_err)?;
        }
        writeln!(w).map_err(write_err)?;
    }
    writeln!(w, "    ;").map_err(write_err)?;
    writeln!(w, "END;").map_err(write_err)?;
    Ok(())
}

/// Write distance matrix in the specified format
pub fn write_matrix(
    file_path: &Path,
    format: OutputFormat,
    samples: &[String],
    matrix: &[Vec<Option<usize>>],
    command_line: &str,
) -> Result<()> {
    if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent).map_err(|e| RsdError::io(parent, e))?;
    }
    let file = File::create(file_path).map_err(|e| RsdError::io(file_path, e))?;
    let mut w = BufWriter::new(file);

    match format {
        OutputFormat::Tsv | OutputFormat::Csv => {
            writeln!(w, "# Command: {}", command_line).map_err(write_err)?;
            writeln!(w, "# Generated: {}", timestamp()).map_err(write_err)?;
            writeln!(w, "# rsd v{}", env!("CARGO_PKG_VERSION")).map_err(write_err)?;
            let delimiter = if format == OutputFormat::Tsv { b'\t' } else { b',' };
            write_delimited(&mut w, delimiter, samples, matrix)?;
        }
        OutputFormat::Phylip => write_phylip(&mut w, samples, matrix, command_line)?,
        OutputFormat::Nexus => write_nexus(&mut w, samples, matrix, command_line)?,
    }
    w.flush().map_err(write_err)
}
