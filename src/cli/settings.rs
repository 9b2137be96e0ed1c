use std::num::NonZeroU32;

use anyhow::Result;
use tracing::info;

use crate::storage::{
    entities::{Mode, Settings, UsageState},
    snapshot::save_settings,
    store::PersistentStore,
};

#[derive(Debug, clap::Args)]
pub struct SettingsCommand {
    #[arg(long, help = "Daily number of posts. Must be positive")]
    threshold: Option<NonZeroU32>,
    #[arg(
        long,
        help = "nudge colors the counter by how close you are to the threshold, count only numbers posts"
    )]
    mode: Option<Mode>,
}

/// Prints current settings, or updates them when any option is passed. A running tracker picks
/// up the change on its own.
pub async fn process_settings_command(
    SettingsCommand { threshold, mode }: SettingsCommand,
    store: &impl PersistentStore,
) -> Result<()> {
    let current = UsageState::load(store).await?.settings;
    if threshold.is_none() && mode.is_none() {
        print_settings(&current);
        return Ok(());
    }

    let updated = Settings {
        threshold: threshold.unwrap_or(current.threshold),
        mode: mode.unwrap_or(current.mode),
    };
    save_settings(store, updated).await?;
    info!("Settings changed from {current:?} to {updated:?}");
    print_settings(&updated);
    Ok(())
}

fn print_settings(settings: &Settings) {
    println!("threshold\t{}", settings.threshold);
    println!("mode\t{}", settings.mode);
}
