// error.rs - Crate error type

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RsdError {
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to launch '{tool}' (is it installed and on PATH?): {source}")]
    ToolLaunch {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("'{tool}' exited with {status}\n{log_tail}")]
    ToolFailed {
        tool: String,
        status: String,
        log_tail: String,
    },

    #[error("malformed VCF '{}' (line {line}): {message}", path.display())]
    Vcf {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("malformed BED '{}' (line {line}): {message}", path.display())]
    Bed {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("FASTA error on '{}': {message}", path.display())]
    Fasta { path: PathBuf, message: String },

    #[error("database '{}' is corrupt: {message}", path.display())]
    CorruptDatabase { path: PathBuf, message: String },

    #[error("database '{}' is locked by another process (remove '{}' if no rsd insert is running)", path.display(), lock.display())]
    Locked { path: PathBuf, lock: PathBuf },

    #[error("sample '{0}' already exists in the database")]
    SampleExists(String),

    #[error("sample '{0}' not found in the database")]
    UnknownSample(String),

    #[error("contig set of sample '{sample}' does not match the database reference ({detail})")]
    ContigMismatch { sample: String, detail: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid value for {option}: {message}")]
    InvalidOption { option: String, message: String },

    #[error("output error: {0}")]
    Output(String),
}

impl RsdError {
    /// Attach a path to an `io::Error`
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        RsdError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn invalid_option(option: &str, message: impl Into<String>) -> Self {
        RsdError::InvalidOption {
            option: option.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RsdError>;
