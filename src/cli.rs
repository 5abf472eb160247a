//! CLI definitions for hoard.
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// hoard - incremental tweet archiver
#[derive(Parser, Debug)]
#[command(name = "hoard")]
#[command(version = concat!(
    env!("CARGO_PKG_VERSION"),
    "\n  Built: ", env!("VERGEN_BUILD_TIMESTAMP"),
    "\n  Rustc: ", env!("VERGEN_RUSTC_SEMVER"),
    "\n  Target: ", env!("VERGEN_CARGO_TARGET_TRIPLE"),
))]
#[command(about = "Archive tweets, favorites and their media into a local SQLite store")]
#[command(long_about = r#"
hoard keeps a local, tag-searchable copy of the tweets and favorites of one
or more accounts, together with the media they reference.

Each sync only fetches what is new since the last run. Legacy tweets.csv
exports can be reconciled against the API, and media is downloaded once.

Quick start:
  1. hoard config --init
  2. Add an [[accounts]] entry with a bearer_token to the config file
  3. hoard sync
  4. hoard tags
"#)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(long, env = "HOARD_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Path to the database file
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Root directory for downloaded media
    #[arg(long, global = true)]
    pub media: Option<PathBuf>,

    /// Directory for raw JSON snapshots
    #[arg(long, global = true)]
    pub snapshots: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Be verbose (show debug info)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Be quiet (suppress non-error output)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch new tweets and favorites for configured accounts
    Sync(SyncArgs),

    /// Reconcile a legacy tweets.csv export against the API
    ImportCsv(ImportCsvArgs),

    /// Download media still missing for archived items
    DownloadMedia,

    /// Show archive statistics
    Stats,

    /// List the most used tags
    Tags(TagsArgs),

    /// List records carrying a tag
    Tagged(TaggedArgs),

    /// Show one archived record
    Show(ShowArgs),

    /// Show or initialise configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Only sync one feed
    #[arg(long)]
    pub only: Option<FeedArg>,

    /// Only sync this configured account
    #[arg(long, short = 'a')]
    pub account: Option<String>,

    /// Skip the media pass
    #[arg(long)]
    pub no_media: bool,
}

#[derive(Args, Debug)]
pub struct ImportCsvArgs {
    /// Export files to import
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Handle the export belongs to (must be a configured account)
    #[arg(long)]
    pub handle: Option<String>,

    /// Skip the media pass
    #[arg(long)]
    pub no_media: bool,
}

#[derive(Args, Debug)]
pub struct TagsArgs {
    /// Number of tags to show
    #[arg(long, short = 'n', default_value = "20")]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct TaggedArgs {
    /// Tag name; normalised the same way as stored tags
    pub tag: String,

    /// Maximum number of records
    #[arg(long, short = 'n', default_value = "20")]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Record identity
    pub id: u64,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Print the effective configuration (tokens masked)
    #[arg(long, conflicts_with = "init")]
    pub show: bool,

    /// Write a default configuration file
    #[arg(long)]
    pub init: bool,

    /// Overwrite an existing file with --init
    #[arg(long, requires = "init")]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedArg {
    Timeline,
    Favorites,
}

impl From<FeedArg> for crate::model::FeedKind {
    fn from(value: FeedArg) -> Self {
        match value {
            FeedArg::Timeline => Self::Timeline,
            FeedArg::Favorites => Self::Favorites,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonPretty,
}
