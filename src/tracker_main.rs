use std::env::args;

use anyhow::Result;
use clap::Parser;
use scrolltally::{
    tracker::{args::TrackerArgs, open_page_source, start_tracker},
    utils::{
        dir::resolve_application_path,
        logging::{enable_logging, TRACKER_PREFIX},
        runtime::single_thread_runtime,
    },
};

fn main() -> Result<()> {
    run(TrackerArgs::parse_from(args()))
}

fn run(args: TrackerArgs) -> Result<()> {
    let app_dir = resolve_application_path(args.dir)?;
    enable_logging(TRACKER_PREFIX, &app_dir, args.log, args.log_console)?;
    single_thread_runtime()?.block_on(async move {
        let source = open_page_source(args.input.as_deref()).await?;
        start_tracker(app_dir, source).await
    })
}
