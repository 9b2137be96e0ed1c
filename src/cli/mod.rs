pub mod history;
pub mod settings;
pub mod stats;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::{Parser, Subcommand};
use history::{process_history_command, HistoryCommand};
use settings::{process_settings_command, SettingsCommand};
use stats::print_stats;
use tracing::{info, level_filters::LevelFilter};

use crate::{
    engine::AggregationEngine,
    storage::file_store::FileStore,
    tracker::{open_page_source, start_tracker},
    utils::{
        clock::{Clock, DefaultClock},
        dir::resolve_application_path,
        logging::{enable_logging, CLI_PREFIX},
    },
    view::annotation::annotate,
};

#[derive(Parser, Debug)]
#[command(name = "Scrolltally", version, long_about = None)]
#[command(about = "Counts feed posts you read and keeps daily statistics", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Show today's counters, comparison with previous days and charts")]
    Stats {},
    #[command(about = "List finished days, newest first")]
    History {
        #[command(flatten)]
        command: HistoryCommand,
    },
    #[command(about = "Show or change the daily threshold and the counter mode")]
    Settings {
        #[command(flatten)]
        command: SettingsCommand,
    },
    #[command(about = "Reset today's post counter")]
    Reset {},
    #[command(
        about = "Run the tracker in the current console. Page events are read as json lines"
    )]
    Track {
        #[arg(long, help = "Read page events from a file instead of stdin")]
        input: Option<PathBuf>,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    let app_dir = resolve_application_path(args.dir)?;
    enable_logging(CLI_PREFIX, &app_dir, logging_level, args.log)?;

    let clock = DefaultClock;
    match args.commands {
        Commands::Stats {} => {
            let store = FileStore::new(&app_dir)?;
            print_stats(&store, &clock).await
        }
        Commands::History { command } => {
            let store = FileStore::new(&app_dir)?;
            process_history_command(command, &store, &clock).await
        }
        Commands::Settings { command } => {
            let store = FileStore::new(&app_dir)?;
            process_settings_command(command, &store).await
        }
        Commands::Reset {} => {
            let store = Arc::new(FileStore::new(&app_dir)?);
            let mut engine = AggregationEngine::initialize(store, clock.local_time()).await;
            let view = engine.reset(clock.local_time()).await;
            info!("Counter reset by user");
            println!("Counter reset. {}", annotate(&view).label);
            Ok(())
        }
        Commands::Track { input } => {
            let source = open_page_source(input.as_deref()).await?;
            start_tracker(app_dir, source).await
        }
    }
}
