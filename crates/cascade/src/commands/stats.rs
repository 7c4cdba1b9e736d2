//! Routing accuracy statistics.

use anyhow::{Context, Result};
use cascade_core::{RouterStats, UserId};
use colored::Colorize;
use std::time::Duration;

use super::{build_service, open_database};
use crate::cli::StatsCommand;
use crate::config::Config;

/// Execute stats command.
pub async fn execute(cmd: StatsCommand, user_id: UserId, config: &Config) -> Result<()> {
    let db = open_database(config)?;
    let service = build_service(config, db)?;

    let window = Duration::from_secs(cmd.hours.saturating_mul(3600));
    let stats = service
        .get_router_stats(user_id, window)
        .await
        .context("Failed to load router stats")?;
    service.shutdown(false).await;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    print_stats(user_id, cmd.hours, &stats);
    Ok(())
}

fn print_stats(user_id: UserId, hours: u64, stats: &RouterStats) {
    println!("{}", format!("Routing stats for user {} (last {}h)", user_id, hours).bold());

    if stats.total_predictions == 0 {
        println!("  No feedback recorded");
        return;
    }

    println!("  Predictions: {}", stats.total_predictions);
    println!("  Correct:     {}", stats.correct_count.to_string().green());
    println!("  Incorrect:   {}", stats.incorrect_count.to_string().red());
    println!("  Accuracy:    {:.1}%", stats.accuracy * 100.0);

    let mut by_intent: Vec<_> = stats.by_intent.iter().collect();
    by_intent.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
    println!();
    println!("  {}", "By intent:".cyan());
    for (intent, count) in by_intent {
        println!("    {:<16} {}", intent.as_str(), count);
    }

    let mut by_source: Vec<_> = stats.by_source.iter().collect();
    by_source.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    println!("  {}", "By source:".cyan());
    for (source, count) in by_source {
        println!("    {:<16} {}", source, count);
    }
}
