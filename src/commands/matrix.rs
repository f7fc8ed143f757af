// matrix.rs - Dump the pairwise distance matrix

use std::io::Write;

use log::info;

use crate::cli::MatrixArgs;
use crate::db::DistanceStore;
use crate::error::Result;
use crate::output::{print_matrix, write_matrix};

/// Print samples and matrix to `out`, then write the matrix file
pub fn run<S, W>(store: &S, args: &MatrixArgs, out: W) -> Result<Vec<String>>
where
    S: DistanceStore + ?Sized,
    W: Write,
{
    let (samples, matrix) = store.extract_matrix();
    print_matrix(out, &samples, &matrix)?;

    let command_line = std::env::args().collect::<Vec<_>>().join(" ");
    write_matrix(&args.output_matrix, args.format, &samples, &matrix, &command_line)?;
    info!(
        "💾 Distance matrix of {} samples saved to: {}",
        samples.len(),
        args.output_matrix.display()
    );
    Ok(samples)
}
