use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use infovore::config::Config;
use infovore::feed::{Fetcher, Poller, PollerSettings};
use infovore::storage::{Database, DatabaseError};
use infovore::util::validate_feed_url;

#[derive(Parser, Debug)]
#[command(name = "infovore", version, about = "Polite RSS/Atom feed fetcher")]
struct Args {
    /// Config file (TOML)
    #[arg(long, value_name = "FILE", default_value = "infovore.toml")]
    config: PathBuf,

    /// SQLite database file (overrides the config file)
    #[arg(long, value_name = "FILE")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe to a feed
    Add {
        url: String,
        /// Folder to file the feed under
        #[arg(long)]
        folder: Option<String>,
    },
    /// Unsubscribe from a feed and drop its items
    Remove { feed: i64 },
    /// List subscriptions with their fetch status
    List,
    /// List folders
    Folders,
    /// List a feed's items
    Items {
        feed: i64,
        /// Only show unread items
        #[arg(long)]
        unread: bool,
    },
    /// Mark an item as read
    Read { item: i64 },
    /// Fetch every feed once, or a single feed
    Fetch {
        #[arg(long, value_name = "ID")]
        feed: Option<i64>,
    },
    /// Poll in the background until interrupted
    Run,
    /// Show or set the polling interval in minutes
    Interval { minutes: Option<u32> },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    if let Some(db) = args.db {
        config.database_path = db;
    }

    let db_path = config
        .database_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?
        .to_string();
    let db = match Database::open(&db_path).await {
        Ok(db) => db.with_min_polling_interval(config.min_polling_interval_minutes),
        Err(DatabaseError::Locked) => {
            eprintln!("Error: the database at {} is locked by another process.", db_path);
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let result = run_command(args.command, &db, &config).await;
    db.close().await;
    result
}

async fn run_command(command: Command, db: &Database, config: &Config) -> Result<()> {
    match command {
        Command::Add { url, folder } => {
            let url = validate_feed_url(&url).context("Rejected feed URL")?;
            let folder_id = match folder {
                Some(name) => Some(db.get_or_create_folder(&name).await?),
                None => None,
            };
            let (id, created) = db.insert_feed(url.as_str(), None, folder_id).await?;
            if created {
                println!("Subscribed to {} (id {})", url, id);
            } else {
                println!("Already subscribed to {} (id {})", url, id);
            }
        }
        Command::Remove { feed } => {
            if db.delete_feed(feed).await? {
                println!("Removed feed {}", feed);
            } else {
                anyhow::bail!("No feed with id {}", feed);
            }
        }
        Command::List => {
            let feeds = db.get_feeds().await.context("Failed to load feeds")?;
            if feeds.is_empty() {
                println!("No subscriptions. Add one with: infovore add <URL>");
            }
            let unread: HashMap<i64, i64> = db.unread_counts().await?.into_iter().collect();
            for feed in feeds {
                let fetched = feed
                    .last_fetched
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string());
                let count = unread.get(&feed.id).copied().unwrap_or(0);
                match feed.last_error {
                    Some(error) => println!(
                        "{:>5}  {} ({} unread)  [{}]  ERROR: {}",
                        feed.id, feed.title, count, fetched, error
                    ),
                    None => println!(
                        "{:>5}  {} ({} unread)  [{}]",
                        feed.id, feed.title, count, fetched
                    ),
                }
            }
        }
        Command::Folders => {
            for folder in db.get_folders().await? {
                println!("{:>5}  {}", folder.id, folder.name);
            }
        }
        Command::Items { feed, unread } => {
            for item in db.get_items(feed, unread).await? {
                let marker = if item.is_read { ' ' } else { '*' };
                let published = item
                    .published_at
                    .map(|t| t.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "----------".to_string());
                println!("{} {:>6}  {}  {}", marker, item.id, published, item.title);
            }
        }
        Command::Read { item } => {
            db.mark_item_read(item).await?;
        }
        Command::Fetch { feed } => {
            let fetcher = Fetcher::new(db.clone(), config)?;
            let cancel = CancellationToken::new();
            spawn_ctrl_c_canceller(cancel.clone());

            match feed {
                Some(feed_id) => {
                    let feed = db
                        .get_feed(feed_id)
                        .await?
                        .ok_or_else(|| anyhow::anyhow!("No feed with id {}", feed_id))?;
                    let count = fetcher.fetch_one(&feed, &cancel).await?;
                    println!("{}: {} new items", feed.title, count);
                }
                None => {
                    let outcome = fetcher.refresh_all(&cancel).await?;
                    println!(
                        "Fetched {} new items from {}/{} feeds ({} failed)",
                        outcome.total_new_items(),
                        outcome.new_items.len(),
                        outcome.total,
                        outcome.failed()
                    );
                    if let Some(e) = outcome.error {
                        return Err(e.into());
                    }
                }
            }
        }
        Command::Run => {
            let fetcher = Fetcher::new(db.clone(), config)?;
            let poller = Poller::start(fetcher, PollerSettings::from_config(config));
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            tracing::info!("Received shutdown signal");
            poller.stop().await;
        }
        Command::Interval { minutes } => {
            if let Some(minutes) = minutes {
                if minutes < config.min_polling_interval_minutes {
                    println!(
                        "Note: {} is below the minimum; polling will use {} minutes",
                        minutes, config.min_polling_interval_minutes
                    );
                }
                db.set_polling_interval(minutes).await?;
            }
            println!(
                "Polling interval: {} minutes",
                db.get_polling_interval().await?
            );
        }
    }
    Ok(())
}

fn spawn_ctrl_c_canceller(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal, cancelling fetch");
            cancel.cancel();
        }
    });
}
