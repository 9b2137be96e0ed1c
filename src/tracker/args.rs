use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
pub struct TrackerArgs {
    /// Application directory. By default $XDG_STATE_HOME/scrolltally or
    /// $HOME/.local/state/scrolltally
    #[arg(long)]
    pub dir: Option<PathBuf>,
    /// File with newline delimited page events. Reads stdin if omitted.
    #[arg(long)]
    pub input: Option<PathBuf>,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
}
