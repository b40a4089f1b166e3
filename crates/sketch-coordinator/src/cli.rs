// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Command-line surface for `sketchd-coordinator`, ported from
//! `original_source/experiment/cluster_query_expr.cpp`'s positional
//! arguments and inline bounds checks.

use std::path::PathBuf;

use clap::{Args, Parser};

fn parse_insert_threads(s: &str) -> Result<u32, String> {
    parse_ranged(s, 1, 50, "insert_threads")
}

fn parse_num_repeats(s: &str) -> Result<u32, String> {
    parse_ranged(s, 1, 50, "num_repeats")
}

fn parse_num_queries(s: &str) -> Result<u32, String> {
    parse_ranged(s, 0, 10_000, "num_queries")
}

fn parse_ins_between_query(s: &str) -> Result<u32, String> {
    parse_ranged(s, 1, 1_000_000, "ins_between_query")
}

fn parse_ranged(s: &str, low: u32, high: u32, name: &str) -> Result<u32, String> {
    let value: u32 = s.parse().map_err(|_| format!("{name} must be an integer"))?;
    if value < low || value > high {
        return Err(format!("{name} must be in [{low},{high}], got {value}"));
    }
    Ok(value)
}

/// Burst mode: a CLI-supplied `(num_grouped, ins_between_query)` pair
/// grouping several queries together between bursts of insertions, in
/// place of the default one-query-at-a-time cadence.
#[derive(Debug, Clone, Copy, Args)]
pub struct Burst {
    /// Number of queries grouped into one burst. Must be in
    /// `[1, num_queries]`; checked post-parse in [`validate_burst`] since
    /// clap cannot express a cross-field bound declaratively.
    #[arg(value_parser = parse_ranged_num_grouped)]
    pub num_grouped: u32,

    /// Number of insertions to replay between each burst's queries.
    #[arg(value_parser = parse_ins_between_query)]
    pub ins_between_query: u32,
}

fn parse_ranged_num_grouped(s: &str) -> Result<u32, String> {
    let value: u32 = s.parse().map_err(|_| "num_grouped must be an integer".to_string())?;
    if value < 1 {
        return Err("num_grouped must be >= 1".to_string());
    }
    Ok(value)
}

/// Validate `burst.num_grouped <= num_queries`, the one bound clap's
/// per-argument value parsers cannot express.
///
/// # Errors
///
/// Returns a human-readable message suitable for printing to stderr before
/// exiting non-zero.
pub fn validate_burst(burst: Option<&Burst>, num_queries: u32) -> Result<(), String> {
    match burst {
        Some(b) if b.num_grouped > num_queries => Err(format!(
            "--burst num_grouped ({}) must be <= num_queries ({num_queries})",
            b.num_grouped
        )),
        _ => Ok(()),
    }
}

/// `sketchd-coordinator <insert_threads> <num_repeats> <num_queries>
/// <input_stream> <output_file> [--burst <num_grouped> <ins_between_query>]`
#[derive(Debug, Parser)]
#[command(name = "sketchd-coordinator", version, about)]
pub struct CoordinatorArgs {
    /// Number of coordinator-side insertion threads, in `[1,50]`.
    #[arg(value_parser = parse_insert_threads)]
    pub insert_threads: u32,

    /// Number of times to repeat the input stream, in `[1,50]`.
    #[arg(value_parser = parse_num_repeats)]
    pub num_repeats: u32,

    /// Number of connected-components queries to run, in `[0,10000]`.
    #[arg(value_parser = parse_num_queries)]
    pub num_queries: u32,

    /// Path to the binary edge-update stream to replay.
    pub input_stream: PathBuf,

    /// Path to append per-query timing lines to.
    pub output_file: PathBuf,

    /// Group queries into bursts instead of interleaving one at a time.
    #[command(flatten)]
    pub burst: Option<Burst>,

    /// Worker addresses to dial, `host:port`, one per worker rank.
    #[arg(long = "worker", required = true)]
    pub workers: Vec<String>,

    /// Directory status files (`cluster_status.txt`) are written to.
    #[arg(long, default_value = ".")]
    pub status_dir: PathBuf,
}

impl CoordinatorArgs {
    /// Parse `std::env::args`, validating the burst cross-field bound and
    /// exiting the process with clap's own formatted error on failure.
    pub fn parse_validated() -> Self {
        let args = Self::parse();
        if let Err(message) = validate_burst(args.burst.as_ref(), args.num_queries) {
            clap::Error::raw(clap::error::ErrorKind::ValueValidation, message).exit();
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_within_num_queries_is_accepted() {
        let burst = Burst {
            num_grouped: 5,
            ins_between_query: 10,
        };
        assert!(validate_burst(Some(&burst), 10).is_ok());
    }

    #[test]
    fn burst_exceeding_num_queries_is_rejected() {
        let burst = Burst {
            num_grouped: 20,
            ins_between_query: 10,
        };
        assert!(validate_burst(Some(&burst), 10).is_err());
    }

    #[test]
    fn ranged_parser_rejects_out_of_bounds() {
        assert!(parse_insert_threads("0").is_err());
        assert!(parse_insert_threads("51").is_err());
        assert!(parse_insert_threads("1").is_ok());
        assert!(parse_num_queries("10000").is_ok());
        assert!(parse_num_queries("10001").is_err());
    }
}
