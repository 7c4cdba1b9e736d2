//! Record feedback for a routing decision.

use anyhow::{bail, Context, Result};
use cascade_core::{ClassificationSource, RouterFeedback, UserId};
use colored::Colorize;

use super::{build_service, open_database};
use crate::cli::FeedbackCommand;
use crate::config::Config;

/// Execute feedback command.
pub async fn execute(cmd: FeedbackCommand, user_id: UserId, config: &Config) -> Result<()> {
    let source = parse_source(&cmd.source)?;

    let db = open_database(config)?;
    let service = build_service(config, db)?;
    service
        .load_user_weights(user_id)
        .await
        .context("Failed to load user weights")?;

    let feedback = RouterFeedback {
        user_id,
        input: cmd.input,
        predicted: cmd.predicted,
        actual: cmd.actual,
        feedback_type: cmd.feedback_type,
        timestamp: 0,
        source,
    };

    let adjustments = service
        .record_feedback(&feedback)
        .await
        .context("Failed to record feedback")?;
    service.shutdown(true).await;

    println!(
        "{} Recorded {} feedback ({} → {})",
        "✓".green(),
        feedback.feedback_type.to_string().cyan(),
        feedback.predicted,
        feedback.actual
    );

    if adjustments.is_empty() {
        println!("  No weight changes");
        return Ok(());
    }
    for adj in &adjustments {
        let delta = if adj.adjustment > 0 {
            format!("+{}", adj.adjustment).green()
        } else {
            adj.adjustment.to_string().red()
        };
        println!(
            "  {}.{}: {} → {} ({})",
            adj.category, adj.keyword, adj.old_weight, adj.new_weight, delta
        );
    }

    Ok(())
}

fn parse_source(s: &str) -> Result<ClassificationSource> {
    match ClassificationSource::parse(s) {
        Some(source) => Ok(source),
        None => bail!("Invalid source: {}. Use: cache, rule, history, or llm", s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source() {
        assert_eq!(parse_source("llm").unwrap(), ClassificationSource::Llm);
        assert!(parse_source("oracle").is_err());
    }
}
