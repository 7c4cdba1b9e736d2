//! Classify an input through the full cascade.

use anyhow::{Context, Result};
use cascade_core::{ClassificationResult, Intent, UserId};
use colored::Colorize;

use super::{build_service, open_database};
use crate::cli::ClassifyCommand;
use crate::config::Config;

/// Execute classify command.
pub async fn execute(cmd: ClassifyCommand, user_id: UserId, config: &Config) -> Result<()> {
    let db = open_database(config)?;
    let service = build_service(config, db)?;

    service
        .load_user_weights(user_id)
        .await
        .context("Failed to load user weights")?;

    let outcome = service.classify(Some(user_id), &cmd.input).await;
    // Let any background history save finish before the process exits.
    service.shutdown(true).await;
    let result = outcome.context("Classification failed")?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }
    print_result(&cmd.input, &result);
    Ok(())
}

fn print_result(input: &str, result: &ClassificationResult) {
    if !result.is_matched() {
        println!("{} Could not understand: {}", "✗".red(), input);
        return;
    }

    let intent = if result.intent == Intent::Unknown {
        result.intent.to_string().yellow()
    } else {
        result.intent.to_string().green()
    };
    println!("{} {}", "✓".green(), intent);
    println!("  Agent: {}", result.intent.agent_type().to_string().cyan());
    println!("  Confidence: {:.2}", result.confidence);
    if let Some(source) = result.source {
        println!("  Source: {}", source);
    }
}
