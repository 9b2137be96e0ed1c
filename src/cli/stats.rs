use ansi_term::{Colour, Style};
use anyhow::Result;

use crate::{
    engine::{rollover::roll_over, ViewState},
    storage::{entities::UsageState, store::PersistentStore},
    utils::{clock::Clock, time::date_key_of},
    view::{
        annotation::{annotate, Rgb},
        charts::{daily_series, heatmap, hourly_series, minute_series},
        format_pixels,
        history::{compare, Comparison},
    },
};

const BAR_WIDTH: f64 = 40.;
const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const HEAT_LEVELS: [char; 6] = ['·', '░', '░', '▒', '▓', '█'];

/// Prints today's counters and charts. The stored day is closed in memory only, the store
/// is left as it is until the tracker runs again.
pub async fn print_stats(store: &impl PersistentStore, clock: &dyn Clock) -> Result<()> {
    let now = clock.local_time();
    let today = date_key_of(&now);
    let mut state = UsageState::load(store).await?;
    roll_over(&mut state, &today, clock.time());
    let view = ViewState::of(&state);

    let annotation = annotate(&view);
    let Rgb(r, g, b) = annotation.color.to_rgb();
    println!(
        "{}\t{}",
        Colour::RGB(r, g, b)
            .bold()
            .paint(format!("{} posts", view.viewed_posts_today)),
        annotation.label
    );
    println!(
        "{} px scrolled\tlimit {}\tmode {}",
        format_pixels(view.pixels_scrolled_today as i64),
        view.threshold,
        view.mode
    );
    println!();

    print_comparison(compare(&state.history, view.viewed_posts_today));
    println!();

    println!("{}", Style::new().bold().paint("Last hour"));
    let counts: Vec<u64> = minute_series(&state.minutes, &now)
        .iter()
        .map(|v| v.count)
        .collect();
    println!("{}", sparkline(&counts));
    println!();

    println!("{}", Style::new().bold().paint("Today by hour"));
    for bar in hourly_series(&state.hourly, &now) {
        let line = format!("{}:00 {} {}", bar.hour, bar_of(bar.height.fraction()), bar.count);
        if bar.is_current {
            println!("{}", Style::new().bold().paint(line));
        } else {
            println!("{line}");
        }
    }
    println!();

    if state.history.is_empty() {
        println!("NO DATA YET");
        return Ok(());
    }

    println!("{}", Style::new().bold().paint("Last 30 days"));
    for bar in daily_series(&state, &today) {
        let line = format!("{} {} {}", bar.date, bar_of(bar.height.fraction()), bar.posts);
        if bar.is_today {
            println!("{}", Style::new().bold().paint(line));
        } else if bar.is_weekend {
            println!("{}", Style::new().dimmed().paint(line));
        } else {
            println!("{line}");
        }
    }
    println!();

    println!("{}", Style::new().bold().paint("Last 4 weeks"));
    let cells: Vec<char> = heatmap(&state, &today)
        .iter()
        .map(|cell| match cell {
            Some(cell) => HEAT_LEVELS[usize::from(cell.intensity)],
            None => ' ',
        })
        .collect();
    for week in cells.chunks(7) {
        println!("{}", week.iter().collect::<String>());
    }
    Ok(())
}

fn print_comparison(comparison: Option<Comparison>) {
    let Some(comparison) = comparison else {
        println!("vs yesterday\t-");
        println!("7 day average\t-");
        println!("30 day average\t-");
        return;
    };
    println!("vs yesterday\t{}%", signed(comparison.vs_yesterday_percent));
    println!(
        "7 day average\t{} ({})",
        comparison.week_average,
        signed(comparison.vs_week)
    );
    println!(
        "30 day average\t{} ({})",
        comparison.month_average,
        signed(comparison.vs_month)
    );
}

pub(super) fn signed(value: i64) -> String {
    if value > 0 {
        format!("+{value}")
    } else {
        value.to_string()
    }
}

fn bar_of(fraction: f64) -> String {
    "█".repeat((fraction * BAR_WIDTH).round() as usize)
}

pub(super) fn sparkline(values: &[u64]) -> String {
    let max = values.iter().copied().max().unwrap_or(0).max(1);
    values
        .iter()
        .map(|v| {
            let level = (*v as f64 / max as f64 * (SPARK_LEVELS.len() - 1) as f64).round();
            SPARK_LEVELS[level as usize]
        })
        .collect()
}
