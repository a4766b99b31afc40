use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use profile_board::config::Config;
use profile_board::identity::{IdentityResolver, IdentityState, IpEchoClient};
use profile_board::session::PageSession;
use profile_board::storage;
use profile_board::visits::VisitState;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "board-cli")]
#[command(about = "Headless page load against the profile board store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a visit and print the totals
    Visit,
    /// List all comments
    Comments,
    /// Post a comment as the resolved identity
    Post {
        /// Comment text
        text: String,
    },
    /// Replace the text of one of your comments
    Edit {
        /// Comment id
        id: String,
        /// New text
        text: String,
    },
    /// Delete one of your comments
    Delete {
        /// Comment id
        id: String,
    },
    /// Follow the comment board until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let store = storage::connect(&config.database)
        .await
        .context("failed to open store")?;
    let resolver: Arc<dyn IdentityResolver> = Arc::new(IpEchoClient::new(&config.identity)?);

    let mut session = PageSession::new(store, resolver, config.profile.clone());
    session.load().await?;

    match session.identity() {
        IdentityState::Resolved(key) => println!("Identity: {}", key),
        _ => println!("Identity: unresolved (anonymous)"),
    }

    match cli.command {
        Commands::Visit => {
            if let VisitState::Recorded { count, .. } = session.tracker().state() {
                println!("Your visits: {}", count);
            }
            println!("Total visits: {}", session.view().total_visits);
        }
        Commands::Comments => print_comments(&session),
        Commands::Post { text } => match session.add_comment(&text).await? {
            Some(id) => println!("✓ Posted comment {}", id),
            None => println!("⚠ Nothing posted: comment text is blank"),
        },
        Commands::Edit { id, text } => {
            let saved = if session.begin_edit(&id).await? {
                session.set_draft(&text);
                session.commit_edit().await?
            } else {
                false
            };
            if saved {
                println!("✓ Updated comment {}", id);
            } else {
                println!("⚠ Comment {} was not changed", id);
            }
        }
        Commands::Delete { id } => {
            if session.delete_comment(&id).await? {
                println!("✓ Deleted comment {}", id);
            } else {
                println!("⚠ Comment {} was not deleted", id);
            }
        }
        Commands::Watch => {
            // The first event is the current list
            loop {
                tokio::select! {
                    comments = session.next_comments() => {
                        let Some(comments) = comments else { break };
                        println!("{}", "-".repeat(60));
                        for c in comments {
                            println!("{:<22} {}{}", c.id, c.text, if c.owned { "  (yours)" } else { "" });
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }

    session.close();
    Ok(())
}

fn print_comments(session: &PageSession) {
    let view = session.view();
    println!("Total visits: {}", view.total_visits);
    if view.comments.is_empty() {
        println!("No comments yet.");
        return;
    }
    println!("{:<22} {}", "ID", "Text");
    println!("{}", "-".repeat(60));
    for c in view.comments {
        println!(
            "{:<22} {}{}",
            c.id,
            c.text,
            if c.owned { "  (yours)" } else { "" }
        );
    }
}
