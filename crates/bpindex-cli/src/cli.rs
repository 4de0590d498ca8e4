use std::time::Duration;

use bpindex_config::utils::parse_duration;
use clap::{ArgAction, Parser, Subcommand, ValueHint};

#[derive(Parser)]
#[command(
    author,
    version,
    about,
    help_template = "{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}",
    arg_required_else_help = true
)]
pub struct Args {
    /// Set output verbosity
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress outputs
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output log events as json
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Disable colors in output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Provide custom config file
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<String>,

    /// Set proxy
    #[arg(required = false, long, short = 'P', global = true)]
    pub proxy: Option<String>,

    /// Set user agent
    #[arg(required = false, long, short = 'A', global = true)]
    pub user_agent: Option<String>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch buildpack metadata and update the index
    #[command(arg_required_else_help = true)]
    Index {
        /// JSON file holding an array of entries, or `-` for stdin
        #[arg(
            required_unless_present = "entry",
            conflicts_with = "entry",
            value_hint = ValueHint::FilePath
        )]
        input: Option<String>,

        /// Index a single inline JSON entry
        #[arg(short, long)]
        entry: Option<String>,

        /// Maximum number of concurrent registry fetches
        #[arg(short, long)]
        parallel: Option<usize>,

        /// Timeout for a single fetch, e.g. `30s` or `1m30s`
        #[arg(short, long, value_parser = duration_arg)]
        timeout: Option<Duration>,

        /// Index database to update
        #[arg(long, value_hint = ValueHint::FilePath)]
        db: Option<String>,

        /// Validate entries without writing to the index
        #[arg(long)]
        dry_run: bool,
    },

    /// Show an indexed buildpack
    #[command(arg_required_else_help = true)]
    Show {
        /// Buildpack as <namespace>/<name>[@<version>]
        buildpack: String,

        /// Index database to read
        #[arg(long, value_hint = ValueHint::FilePath)]
        db: Option<String>,
    },

    /// Generate default config
    #[clap(name = "defconfig")]
    DefConfig,
}

fn duration_arg(value: &str) -> Result<Duration, String> {
    let millis = parse_duration(value).ok_or_else(|| format!("invalid duration '{value}'"))?;
    let millis = u64::try_from(millis).map_err(|_| format!("duration '{value}' is too large"))?;
    if millis == 0 {
        return Err("duration must be greater than zero".to_string());
    }
    Ok(Duration::from_millis(millis))
}
