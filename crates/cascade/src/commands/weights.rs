//! Inspect or reset a user's keyword weights.

use anyhow::{Context, Result};
use cascade_core::{Category, RuleMatcher, UserId, WeightTable, DEFAULT_WEIGHT};
use colored::Colorize;

use super::open_database;
use crate::cli::WeightsCommand;
use crate::config::Config;

/// Execute weights command.
pub fn execute(cmd: WeightsCommand, user_id: UserId, config: &Config) -> Result<()> {
    let db = open_database(config)?;

    if cmd.reset {
        let removed = db
            .clear_weights(user_id)
            .context("Failed to reset weights")?;
        println!(
            "{} Reset {} custom weight(s) for user {}",
            "✓".green(),
            removed,
            user_id
        );
        return Ok(());
    }

    let weights = db.load_weights(user_id).context("Failed to load weights")?;
    for line in render(&weights) {
        println!("{}", line);
    }
    Ok(())
}

/// One header per category followed by every keyword and its effective weight.
fn render(weights: &WeightTable) -> Vec<String> {
    let mut lines = Vec::new();
    for category in Category::ALL {
        let overrides = weights.get(&category);
        lines.push(format!("{}", category.as_str().bold()));
        for keyword in RuleMatcher::keywords_for_category(category) {
            match overrides.and_then(|t| t.get(*keyword)) {
                Some(weight) if *weight != DEFAULT_WEIGHT => {
                    lines.push(format!("  {:<10} {}", keyword, weight.to_string().yellow()))
                }
                Some(weight) => lines.push(format!("  {:<10} {}", keyword, weight)),
                None => lines.push(format!("  {:<10} {}", keyword, DEFAULT_WEIGHT.to_string().dimmed())),
            }
        }
    }
    lines
}
