use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "rbc")]
#[command(about = "Cached, pooled access to the Robobrain dashboard API.")]
#[command(version)]
pub struct Cli {
    /// Bypass the response cache
    #[arg(short = 'n', long)]
    pub nocache: bool,

    /// Fetch the whole path set this many times
    #[arg(short = 'r', long, default_value_t = 1)]
    pub repeat: u32,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Evict one path from every cache tier
    #[arg(long, value_name = "PATH")]
    pub invalidate: Option<String>,

    /// Drop every cached response
    #[arg(long)]
    pub clear: bool,

    /// Sweep expired responses
    #[arg(long)]
    pub purge_expired: bool,

    /// Generate config sample
    #[arg(long)]
    pub generate_config: bool,

    /// Edit configuration file
    #[arg(long)]
    pub edit_config: bool,

    /// Show cache and pool statistics
    #[arg(long)]
    pub status: bool,

    /// API paths, e.g. /api/visualizations/graph
    #[arg(num_args = 1..)]
    pub paths: Vec<String>,
}
