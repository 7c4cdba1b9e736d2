//! CLI argument definitions using clap derive macros.

use cascade_core::{FeedbackType, Intent, UserId};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Cascade intent router CLI
///
/// Classifies free-form input into a handler intent and learns from feedback.
#[derive(Parser, Debug)]
#[command(name = "cascade")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (defaults to ~/.config/cascade/config.toml)
    #[arg(long, global = true, env = "CASCADE_CONFIG")]
    pub config: Option<PathBuf>,

    /// User to personalize for
    #[arg(short, long, global = true, default_value_t = 1, env = "CASCADE_USER_ID")]
    pub user: UserId,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Classify an input
    Classify(ClassifyCommand),

    /// Record feedback for a routing decision
    Feedback(FeedbackCommand),

    /// Show routing accuracy statistics
    Stats(StatsCommand),

    /// Show or reset keyword weights
    Weights(WeightsCommand),

    /// Show version information
    Version,
}

#[derive(Args, Debug)]
pub struct ClassifyCommand {
    /// Text to classify
    pub input: String,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct FeedbackCommand {
    /// The input that was classified
    pub input: String,

    /// Intent the router predicted (e.g. schedule_query)
    #[arg(long)]
    pub predicted: Intent,

    /// Intent the user actually wanted
    #[arg(long)]
    pub actual: Intent,

    /// Feedback kind: positive, rephrase or switch
    #[arg(long = "type", default_value = "positive")]
    pub feedback_type: FeedbackType,

    /// Layer that produced the prediction: cache, rule, history or llm
    #[arg(long, default_value = "rule")]
    pub source: String,
}

#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Window to aggregate over, in hours
    #[arg(long, default_value_t = 24)]
    pub hours: u64,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct WeightsCommand {
    /// Delete the user's custom weights
    #[arg(long)]
    pub reset: bool,
}
