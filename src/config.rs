use crate::boundary::BoundaryOptions;
use crate::query::QueryOptions;
use crate::scanner::ScanLimits;
use crate::subset::SubsetOptions;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "overlapr")]
#[command(about = "Genomic region overlap engine over remote interval tracks")]
pub struct Config {
    /// Catalog track metadata table (URL or path under the data directory)
    #[arg(
        long,
        global = true,
        env = "OVERLAPR_CATALOG_URL",
        default_value = "https://tf.lisanwanglab.org/FILER2/metadata/tracks.metadata.tsv"
    )]
    pub catalog_url: String,

    /// Catalog file formats table
    #[arg(
        long,
        global = true,
        env = "OVERLAPR_FORMATS_URL",
        default_value = "https://tf.lisanwanglab.org/FILER2/metadata/track.formats.4col.tsv"
    )]
    pub formats_url: String,

    /// Serve track files and catalog tables from this directory instead of HTTP
    #[arg(long, global = true, env = "OVERLAPR_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Boundary index JSON file
    #[arg(
        long,
        global = true,
        env = "OVERLAPR_BOUNDARY_INDEX",
        default_value = "track_boundaries.json"
    )]
    pub boundary_index: PathBuf,

    /// Sampled spatial store (SQLite)
    #[arg(
        long,
        global = true,
        env = "OVERLAPR_SUBSET_STORE",
        default_value = "genomics_subset.db"
    )]
    pub subset_store: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Per-track fetch timeout in seconds
    #[arg(long, global = true, env = "OVERLAPR_FETCH_TIMEOUT", default_value = "30")]
    pub fetch_timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the HTTP query service
    Serve(ServeArgs),
    /// Build or resume the per-track boundary index
    BuildBoundaries(BoundaryArgs),
    /// Build the sampled spatial store
    BuildSubset(SubsetArgs),
}

#[derive(Debug, Clone, clap::Args)]
pub struct ServeArgs {
    /// Host address to bind to
    #[arg(long, env = "OVERLAPR_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "OVERLAPR_PORT", default_value = "8000")]
    pub port: u16,

    /// Enable CORS for all origins
    #[arg(long, env = "OVERLAPR_CORS", default_value = "true")]
    pub cors: bool,

    /// Concurrent track scans per query
    #[arg(long, env = "OVERLAPR_SCAN_WORKERS", default_value = "10")]
    pub scan_workers: usize,

    /// Lines examined per track before giving up
    #[arg(long, env = "OVERLAPR_MAX_RECORDS", default_value = "20000")]
    pub max_records: usize,

    /// Matches kept per track
    #[arg(long, env = "OVERLAPR_MAX_MATCHES", default_value = "10")]
    pub max_matches: usize,

    /// Candidate tracks scanned when a query gives no maxTracks
    #[arg(long, env = "OVERLAPR_DEFAULT_TRACKS", default_value = "20")]
    pub default_tracks: usize,

    /// Upper bound on a query's maxTracks
    #[arg(long, env = "OVERLAPR_MAX_TRACKS", default_value = "500")]
    pub max_tracks: usize,

    /// Tracks returned by an indexed query that gives no limit
    #[arg(long, env = "OVERLAPR_INDEXED_LIMIT", default_value = "50")]
    pub indexed_limit: usize,

    /// Scan tracks that have no boundary index entry
    #[arg(long, env = "OVERLAPR_INCLUDE_UNINDEXED", default_value = "true")]
    pub include_unindexed: bool,
}

#[derive(Debug, Clone, clap::Args)]
pub struct BoundaryArgs {
    /// Concurrent prefix fetches
    #[arg(long, env = "OVERLAPR_INDEX_WORKERS", default_value = "20")]
    pub workers: usize,

    /// Bytes fetched from the start of each track file
    #[arg(long, default_value = "153601")]
    pub prefix_bytes: u64,

    /// Span assumed past a track's first start
    #[arg(long, default_value = "10000000")]
    pub span: u64,

    /// Persist progress after this many newly indexed tracks
    #[arg(long, default_value = "500")]
    pub checkpoint_every: usize,
}

#[derive(Debug, Clone, clap::Args)]
pub struct SubsetArgs {
    /// Tracks drawn from the catalog
    #[arg(long, default_value = "2500")]
    pub tracks: usize,

    /// Intervals kept per track
    #[arg(long, default_value = "1000")]
    pub reservoir: usize,

    /// Concurrent track downloads (defaults to available parallelism)
    #[arg(long, env = "OVERLAPR_INDEX_WORKERS")]
    pub workers: Option<usize>,

    /// Wall-clock budget for streaming one track, in seconds
    #[arg(long, default_value = "600")]
    pub track_timeout: u64,

    /// Seed for reproducible sampling
    #[arg(long, env = "OVERLAPR_SEED")]
    pub seed: Option<u64>,
}

impl Config {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }
}

impl ServeArgs {
    pub fn query_options(&self, fetch_timeout: Duration) -> QueryOptions {
        QueryOptions {
            limits: ScanLimits {
                max_records: self.max_records,
                max_matches: self.max_matches,
                timeout: fetch_timeout,
            },
            scan_workers: self.scan_workers,
            default_max_tracks: self.default_tracks,
            max_tracks_cap: self.max_tracks,
            include_unindexed: self.include_unindexed,
            default_indexed_limit: self.indexed_limit,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<&BoundaryArgs> for BoundaryOptions {
    fn from(args: &BoundaryArgs) -> Self {
        Self {
            prefix_bytes: args.prefix_bytes,
            span: args.span,
            checkpoint_every: args.checkpoint_every,
            workers: args.workers,
        }
    }
}

impl From<&SubsetArgs> for SubsetOptions {
    fn from(args: &SubsetArgs) -> Self {
        let defaults = SubsetOptions::default();
        Self {
            track_count: args.tracks,
            reservoir_capacity: args.reservoir,
            workers: args.workers.unwrap_or(defaults.workers),
            timeout: Duration::from_secs(args.track_timeout),
            seed: args.seed,
        }
    }
}
