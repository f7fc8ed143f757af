// link.rs - Inspect one pairwise link

use std::io::Write;

use crate::cli::LinkArgs;
use crate::db::{DistanceStore, LinkReport};
use crate::error::{Result, RsdError};

pub fn run<S, W>(store: &S, args: &LinkArgs, mut out: W) -> Result<LinkReport>
where
    S: DistanceStore + ?Sized,
    W: Write,
{
    let report = store.inspect_link(&args.source, &args.target)?;
    let write_err = |e: std::io::Error| RsdError::Output(format!("Write error: {}", e));
    if args.json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| RsdError::Output(format!("failed to serialize link report: {}", e)))?;
        writeln!(out, "{}", json).map_err(write_err)?;
    } else {
        write!(out, "{}", report).map_err(write_err)?;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::insert::tests::StubStore;
    use crate::db::SiteDiff;
    use std::path::PathBuf;

    fn store() -> StubStore {
        StubStore {
            report: Some(LinkReport {
                source: "A".to_string(),
                target: "B".to_string(),
                distance: 1,
                linked: true,
                cutoff: Some(10),
                sites: vec![SiteDiff {
                    chrom: "chr1".to_string(),
                    pos: 42,
                    source_base: "C".to_string(),
                    target_base: "T".to_string(),
                }],
            }),
            ..Default::default()
        }
    }

    fn args(source: &str, target: &str, json: bool) -> LinkArgs {
        LinkArgs {
            input_db: PathBuf::from("db.rsd"),
            source: source.to_string(),
            target: target.to_string(),
            json,
            debug: false,
        }
    }

    #[test]
    fn test_link_returns_store_answer() {
        let store = store();
        let mut out = Vec::new();
        let report = run(&store, &args("A", "B", false), &mut out).unwrap();
        assert_eq!(Some(report), store.report);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "source\tA\ntarget\tB\ndistance\t1\nlinked\tyes (cutoff 10)\n#chrom\tpos\tA\tB\nchr1\t42\tC\tT\n"
        );
    }

    #[test]
    fn test_link_json() {
        let mut out = Vec::new();
        run(&store(), &args("A", "B", true), &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["distance"], 1);
        assert_eq!(value["sites"][0]["pos"], 42);
    }

    #[test]
    fn test_unknown_sample_is_error() {
        let mut out = Vec::new();
        let err = run(&store(), &args("A", "Z", false), &mut out).unwrap_err();
        assert!(matches!(err, RsdError::UnknownSample(_)));
        assert!(out.is_empty());
    }
}
