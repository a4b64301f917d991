//! Command line orchestration for the treeline clustering engines.
//!
//! Loads a whitespace- or comma-separated `x y z` point file, runs the
//! requested engine, optionally re-checks the result against the quadratic
//! reference oracle, and renders the outcome to a writer.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use thiserror::Error;
use treeline_core::{
    ClusterError, ClusterSet, DbscanParams, MstParams, Point3, WeightedEdge, dbscan,
    minimum_spanning_tree, verify_dbscan, verify_mst,
};

/// Top-level CLI options parsed by [`clap`].
#[derive(Debug, Parser, Clone)]
#[command(
    name = "treeline",
    about = "Cluster a 3D point cloud: density clusters or a minimum spanning tree."
)]
pub struct Cli {
    /// Point cloud file with one `x y z` triple per line. Blank lines and
    /// lines starting with `#` are skipped; commas also separate fields.
    #[arg(long)]
    pub input: PathBuf,

    /// Algorithm to run.
    #[arg(long = "impl", value_enum, default_value = "dbscan")]
    pub algorithm: Algorithm,

    /// Search radius for density clustering.
    #[arg(long, default_value_t = 1.0)]
    pub eps: f32,

    /// In-range neighbours (the point itself included) a core point needs.
    #[arg(long = "core-min-size", default_value_t = 1)]
    pub core_min_size: usize,

    /// Smallest cluster worth reporting.
    #[arg(long = "cluster-min-size", default_value_t = 2)]
    pub cluster_min_size: usize,

    /// Neighbour count for the mutual reachability tree; 1 keeps plain
    /// Euclidean weights.
    #[arg(long, default_value_t = 1)]
    pub k: usize,

    /// Re-check the result against the quadratic reference oracle.
    #[arg(long)]
    pub verify: bool,

    /// Log engine progress at debug level.
    #[arg(long)]
    pub verbose: bool,
}

/// Engines selectable via `--impl`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum Algorithm {
    /// Density-based clusters in CSR layout.
    Dbscan,
    /// Minimum spanning tree edge list.
    Mst,
}

/// Errors surfaced while executing CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Reading the input file failed.
    #[error("failed to read `{path}`: {source}")]
    Io {
        /// Path that triggered the failure.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
    /// A line in the input was not three numeric coordinates.
    #[error("{path}:{line}: expected three numeric coordinates")]
    MalformedPoint {
        /// Path of the offending file.
        path: PathBuf,
        /// One-based line number.
        line: usize,
    },
    /// The engine rejected the input or failed at runtime.
    #[error(transparent)]
    Core(#[from] ClusterError),
    /// The `--verify` oracle disagreed with the engine.
    #[error("result failed verification")]
    VerificationFailed,
}

impl CliError {
    /// Process exit status: `1` for problems with the caller's input,
    /// `2` for runtime failures.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Io { .. } | Self::MalformedPoint { .. } => 1,
            Self::Core(error) if error.is_validation() => 1,
            Self::Core(_) | Self::VerificationFailed => 2,
        }
    }
}

/// What an engine run produced.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Density clusters.
    Clusters(ClusterSet),
    /// Spanning tree edges.
    Tree(Vec<WeightedEdge>),
}

/// Summarises the outcome of executing a CLI command.
#[derive(Debug, Clone)]
pub struct ExecutionSummary {
    /// Input path as given on the command line.
    pub input: PathBuf,
    /// Number of points loaded.
    pub points: usize,
    /// Engine result.
    pub outcome: Outcome,
}

/// Executes the command represented by `cli`.
///
/// # Errors
/// Returns [`CliError`] when loading, execution, or verification fails.
///
/// # Examples
/// ```
/// # use std::error::Error;
/// # use std::path::PathBuf;
/// # use treeline_cli::cli::{Algorithm, Cli, Outcome, run_cli};
/// # use tempfile::NamedTempFile;
/// #
/// # fn main() -> Result<(), Box<dyn Error>> {
/// let file = NamedTempFile::new()?;
/// std::fs::write(file.path(), "0 0 0\n0 0 0.5\n10 0 0\n")?;
/// let cli = Cli {
///     input: file.path().to_path_buf(),
///     algorithm: Algorithm::Dbscan,
///     eps: 1.0,
///     core_min_size: 1,
///     cluster_min_size: 2,
///     k: 1,
///     verify: true,
///     verbose: false,
/// };
/// let summary = run_cli(cli)?;
/// let Outcome::Clusters(clusters) = summary.outcome else { unreachable!() };
/// assert_eq!(clusters.cluster_count(), 1);
/// # Ok(())
/// # }
/// ```
pub fn run_cli(cli: Cli) -> Result<ExecutionSummary, CliError> {
    let points = load_points(&cli.input)?;
    let outcome = match cli.algorithm {
        Algorithm::Dbscan => {
            let params = DbscanParams::new(cli.eps)
                .with_core_min_size(cli.core_min_size)
                .with_cluster_min_size(cli.cluster_min_size);
            let clusters = dbscan(&points, &params)?;
            if cli.verify && !verify_dbscan(&points, &params, &clusters) {
                return Err(CliError::VerificationFailed);
            }
            Outcome::Clusters(clusters)
        }
        Algorithm::Mst => {
            let params = MstParams::new().with_neighbours(cli.k);
            let edges = minimum_spanning_tree(&points, &params)?;
            if cli.verify && !verify_mst(&points, &params, &edges) {
                return Err(CliError::VerificationFailed);
            }
            Outcome::Tree(edges)
        }
    };
    Ok(ExecutionSummary {
        input: cli.input,
        points: points.len(),
        outcome,
    })
}

fn load_points(path: &Path) -> Result<Vec<Point3>, CliError> {
    let contents = fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut points = Vec::new();
    for (number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Option<Vec<f32>> = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|field| !field.is_empty())
            .map(|field| field.parse().ok())
            .collect();
        match fields.as_deref() {
            Some([x, y, z]) => points.push(Point3::new(*x, *y, *z)),
            _ => {
                return Err(CliError::MalformedPoint {
                    path: path.to_path_buf(),
                    line: number + 1,
                });
            }
        }
    }
    Ok(points)
}

/// Renders `summary` to `writer` in a line-oriented text format.
///
/// Clusters print as `cluster <id> <size>: <members...>`; tree edges print
/// as `<source> <target> <weight>` with a trailing total.
///
/// # Errors
/// Returns [`io::Error`] if writing to the supplied writer fails.
pub fn render_summary(summary: &ExecutionSummary, mut writer: impl Write) -> io::Result<()> {
    writeln!(writer, "input: {}", summary.input.display())?;
    writeln!(writer, "points: {}", summary.points)?;
    match &summary.outcome {
        Outcome::Clusters(clusters) => {
            writeln!(writer, "clusters: {}", clusters.cluster_count())?;
            for (id, members) in clusters.iter().enumerate() {
                write!(writer, "cluster {id} {}:", members.len())?;
                for member in members {
                    write!(writer, " {member}")?;
                }
                writeln!(writer)?;
            }
        }
        Outcome::Tree(edges) => {
            writeln!(writer, "edges: {}", edges.len())?;
            let mut total = 0.0f64;
            for edge in edges {
                total += f64::from(edge.weight());
                writeln!(writer, "{} {} {}", edge.source(), edge.target(), edge.weight())?;
            }
            writeln!(writer, "total weight: {total}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;
    use tempfile::TempDir;

    fn write_input(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).expect("test input must be writable");
        path
    }

    fn cli_for(input: PathBuf) -> Cli {
        Cli {
            input,
            algorithm: Algorithm::Dbscan,
            eps: 1.0,
            core_min_size: 1,
            cluster_min_size: 2,
            k: 1,
            verify: false,
            verbose: false,
        }
    }

    #[test]
    fn parses_flags_into_cli() {
        let cli = Cli::try_parse_from([
            "treeline",
            "--input",
            "points.xyz",
            "--impl",
            "mst",
            "--k",
            "4",
            "--verify",
        ])
        .expect("arguments must parse");
        assert_eq!(cli.algorithm, Algorithm::Mst);
        assert_eq!(cli.k, 4);
        assert!(cli.verify);
        assert_eq!(cli.eps, 1.0);
    }

    #[test]
    fn rejects_unknown_algorithm() {
        let result =
            Cli::try_parse_from(["treeline", "--input", "p.xyz", "--impl", "kmeans"]);
        assert!(result.is_err());
    }

    #[rstest]
    #[case::whitespace("0 0 0\n0 0 0.5\n10 0 0\n")]
    #[case::commas("0,0,0\n0, 0, 0.5\n10,0,0\n")]
    #[case::comments("# header\n0 0 0\n\n0 0 0.5\n10 0 0\n")]
    fn dbscan_run_clusters_close_pair(#[case] contents: &str) {
        let dir = TempDir::new().expect("temp dir");
        let cli = cli_for(write_input(&dir, "points.xyz", contents));
        let summary = run_cli(cli).expect("run must succeed");
        assert_eq!(summary.points, 3);
        let Outcome::Clusters(clusters) = summary.outcome else {
            panic!("expected clusters");
        };
        assert_eq!(clusters.cluster_count(), 1);
        assert_eq!(clusters.cluster(0), &[0, 1]);
    }

    #[test]
    fn mst_run_produces_verified_tree() {
        let dir = TempDir::new().expect("temp dir");
        let cli = Cli {
            algorithm: Algorithm::Mst,
            verify: true,
            ..cli_for(write_input(&dir, "points.xyz", "0 0 0\n1 0 0\n3 0 0\n6 0 0\n"))
        };
        let summary = run_cli(cli).expect("run must succeed");
        let Outcome::Tree(edges) = summary.outcome else {
            panic!("expected a tree");
        };
        assert_eq!(edges.len(), 3);
        let total: f64 = edges.iter().map(|e| f64::from(e.weight())).sum();
        assert_eq!(total, 6.0);
    }

    #[rstest]
    #[case::missing_field("0 0\n")]
    #[case::extra_field("0 0 0 0\n")]
    #[case::not_a_number("0 0 x\n")]
    fn malformed_lines_are_rejected(#[case] contents: &str) {
        let dir = TempDir::new().expect("temp dir");
        let cli = cli_for(write_input(&dir, "bad.xyz", contents));
        let err = run_cli(cli).expect_err("malformed input must fail");
        assert!(matches!(err, CliError::MalformedPoint { line: 1, .. }));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn missing_file_maps_to_validation_exit() {
        let cli = cli_for(PathBuf::from("/nonexistent/points.xyz"));
        let err = run_cli(cli).expect_err("missing file must fail");
        assert!(matches!(err, CliError::Io { .. }));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn invalid_eps_maps_to_validation_exit() {
        let dir = TempDir::new().expect("temp dir");
        let cli = Cli {
            eps: -1.0,
            ..cli_for(write_input(&dir, "points.xyz", "0 0 0\n1 0 0\n"))
        };
        let err = run_cli(cli).expect_err("negative eps must fail");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn render_summary_lists_clusters() {
        let dir = TempDir::new().expect("temp dir");
        let cli = cli_for(write_input(&dir, "points.xyz", "0 0 0\n0 0 0.5\n10 0 0\n"));
        let summary = run_cli(cli).expect("run must succeed");
        let mut buffer = Vec::new();
        render_summary(&summary, &mut buffer).expect("render must succeed");
        let text = String::from_utf8(buffer).expect("output is UTF-8");
        assert!(text.contains("points: 3"));
        assert!(text.contains("clusters: 1"));
        assert!(text.contains("cluster 0 2: 0 1"));
    }

    #[test]
    fn render_summary_lists_edges_and_total() {
        let dir = TempDir::new().expect("temp dir");
        let cli = Cli {
            algorithm: Algorithm::Mst,
            ..cli_for(write_input(&dir, "points.xyz", "0 0 0\n1 0 0\n3 0 0\n"))
        };
        let summary = run_cli(cli).expect("run must succeed");
        let mut buffer = Vec::new();
        render_summary(&summary, &mut buffer).expect("render must succeed");
        let text = String::from_utf8(buffer).expect("output is UTF-8");
        assert!(text.contains("edges: 2"));
        assert!(text.contains("total weight: 3"));
    }
}
