use anyhow::Result;
use chrono_english::{parse_date_string, Dialect};
use clap::CommandFactory;

use crate::{
    storage::{entities::UsageState, store::PersistentStore},
    utils::{clock::Clock, time::DateKey},
    view::{format_pixels, history::history_entries},
};

use super::{
    stats::{signed, sparkline},
    Args,
};

#[derive(Debug, clap::Args)]
pub struct HistoryCommand {
    #[arg(
        long,
        short,
        help = "Only show days since this date. Examples are \"last week\", \"3 days ago\", \"15/03/2025\""
    )]
    since: Option<String>,
}

/// Prints finished days newest first with the change against the day before.
pub async fn process_history_command(
    HistoryCommand { since }: HistoryCommand,
    store: &impl PersistentStore,
    clock: &dyn Clock,
) -> Result<()> {
    let since = match since {
        Some(since) => Some(parse_since(&since, clock)?),
        None => None,
    };

    let state = UsageState::load(store).await?;
    if state.history.is_empty() {
        println!("NO HISTORY YET");
        return Ok(());
    }

    for entry in history_entries(&state.history) {
        if since.as_ref().is_some_and(|since| &entry.record.date < since) {
            break;
        }
        let posts_delta = entry.posts_delta.filter(|v| *v != 0).map(signed);
        let pixels_delta = entry
            .pixels_delta
            .filter(|v| *v != 0)
            .map(|v| if v > 0 { format!("+{}", format_pixels(v)) } else { format_pixels(v) });
        println!(
            "{}\t{} posts {}\t{} px {}\t{}",
            entry.record.date,
            entry.record.posts_viewed,
            posts_delta.unwrap_or_default(),
            format_pixels(entry.record.pixels_scrolled as i64),
            pixels_delta.unwrap_or_default(),
            entry.sparkline.map(|v| sparkline(&v)).unwrap_or_default()
        );
    }
    Ok(())
}

fn parse_since(since: &str, clock: &dyn Clock) -> Result<DateKey> {
    match parse_date_string(since, clock.local_time(), Dialect::Uk) {
        Ok(date) => Ok(DateKey::from(date.date_naive())),
        Err(e) => Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Failed to validate since date {e}"),
            )
            .into()),
    }
}
