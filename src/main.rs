use anyhow::Result;
use clap::{Parser, Subcommand};

use artha::app::{self, Collaborators};
use artha::config::{default_config_path, ResolvedConfig};
use artha::models::Id;

#[derive(Parser)]
#[command(name = "artha", about = "Personal finance for Indian users", version = env!("GIT_COMMIT_HASH"))]
struct Cli {
    /// Path to artha.toml. Defaults to ./artha.toml, then the XDG data directory.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the month-to-date dashboard for a user.
    Dashboard { user_id: String },
    /// Print the single-paragraph daily insight for a user.
    Insight { user_id: String },
    /// Run the cooldown-gated analysis snapshot and report any new milestones.
    Analyze { user_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = ResolvedConfig::load_or_default(&config_path)?;
    let collaborators = app::build(&config)?;

    match cli.command {
        Command::Dashboard { user_id } => run_dashboard(&collaborators, &user_id).await?,
        Command::Insight { user_id } => run_insight(&collaborators, &user_id).await?,
        Command::Analyze { user_id } => run_analyze(&collaborators, &user_id).await?,
    }

    Ok(())
}

async fn run_dashboard(collaborators: &Collaborators, user_id: &str) -> Result<()> {
    let user_id = Id::from_string(user_id);
    let board = app::dashboard(collaborators, &user_id).await?;
    println!("{}", serde_json::to_string_pretty(&board)?);
    Ok(())
}

async fn run_insight(collaborators: &Collaborators, user_id: &str) -> Result<()> {
    let user_id = Id::from_string(user_id);
    let insight = app::daily_insight(collaborators, &user_id).await?;
    println!("{insight}");
    Ok(())
}

async fn run_analyze(collaborators: &Collaborators, user_id: &str) -> Result<()> {
    let user_id = Id::from_string(user_id);
    match app::run_analysis(collaborators, &user_id).await? {
        Some((snapshot, milestones)) => {
            println!("Analysis snapshot recorded at {}", snapshot.created_at);
            if milestones.is_empty() {
                println!("No new milestones.");
            } else {
                for milestone in milestones {
                    println!("New milestone: {}", milestone.milestone_id);
                }
            }
        }
        None => println!("Analysis is on cooldown; nothing to do."),
    }
    Ok(())
}
