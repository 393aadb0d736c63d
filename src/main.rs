#![deny(dead_code)]
use anyhow::{anyhow, Result};
use clap::Parser;
use log::{debug, error, info, LevelFilter};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};

mod utils;

use murmur::config::{self, Settings};
use murmur::{ChatSnapshot, HttpBackend, Intent, SyncEngine};

/// Command line arguments for murmur
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "murmur: a terminal chat client with offline demo mode.",
    long_about = "murmur keeps a local copy of your contacts and conversations in sync with a chat backend.\n\n\
    Without an API URL (from settings, MURMUR_API_URL or --api-url) it runs offline against demo data,\n\
    with simulated replies from whoever you are talking to."
)]
struct Args {
    /// Backend endpoint, e.g. http://localhost:8080/api.php
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Id of the signed-in user
    #[arg(long, value_name = "ID")]
    user_id: Option<i64>,

    /// Ignore any configured backend and run against demo data
    #[arg(long)]
    offline: bool,

    /// Settings file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Where to write the log
    #[arg(long, value_name = "PATH", default_value = "murmur.log")]
    log_file: PathBuf,
}

const HELP: &str = "\
Commands:
  /contacts                      list contacts
  /open <id>                     open a conversation
  /close                         leave the open conversation
  /show                          show the open conversation
  /video                         send a video to the open conversation
  /add <name> [avatar] [phone]   add a contact
  /reload                        reload contacts
  /help                          this text
  /quit                          exit
Anything else is sent as a message to the open conversation.";

/// Resolve settings: file, then environment, then command line.
fn resolve_settings(args: &Args) -> Result<Settings> {
    if let Some(path) = &args.config {
        config::set_config_path_override(path.clone())?;
        info!("Settings path overridden to: {}", path.display());
    }
    let mut settings = config::load_settings()?;
    settings.apply_env();
    if let Some(url) = &args.api_url {
        settings.api_url = Some(url.clone());
    }
    if let Some(user_id) = args.user_id {
        settings.user_id = user_id;
    }
    if args.offline {
        settings.api_url = None;
    }
    Ok(settings)
}

/// Turn one line of input into an intent, or handle it locally.
enum Command {
    Intent(Intent),
    Print(String),
    Quit,
    Nothing,
}

fn parse_command(line: &str, snapshot: &ChatSnapshot) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Nothing;
    }
    if !line.starts_with('/') {
        return match snapshot.active_contact {
            Some(contact_id) => Command::Intent(Intent::SendText {
                contact_id,
                text: line.to_string(),
            }),
            None => Command::Print("No conversation open. Use /open <id> first.".to_string()),
        };
    }

    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or_default();
    match command {
        "/quit" | "/exit" => Command::Quit,
        "/help" => Command::Print(HELP.to_string()),
        "/contacts" => Command::Print(utils::format_contacts(snapshot)),
        "/show" => Command::Print(utils::format_conversation(snapshot)),
        "/reload" => Command::Intent(Intent::LoadContacts),
        "/close" => Command::Intent(Intent::CloseConversation),
        "/open" => match parts.next().map(str::parse::<i64>) {
            Some(Ok(contact_id)) => Command::Intent(Intent::OpenConversation(contact_id)),
            _ => Command::Print("Usage: /open <id>".to_string()),
        },
        "/video" => match snapshot.active_contact {
            Some(contact_id) => Command::Intent(Intent::SendVideo { contact_id }),
            None => Command::Print("No conversation open. Use /open <id> first.".to_string()),
        },
        "/add" => match parts.next() {
            Some(name) => Command::Intent(Intent::AddContact {
                name: name.to_string(),
                avatar: parts.next().map(str::to_string),
                phone: parts.next().map(str::to_string),
            }),
            None => Command::Print("Usage: /add <name> [avatar] [phone]".to_string()),
        },
        other => Command::Print(format!("Unknown command {}. Try /help.", other)),
    }
}

/// Print the open conversation whenever its messages change.
async fn follow_conversation(mut snapshots: watch::Receiver<ChatSnapshot>) {
    let mut last_seen = (None, 0, false);
    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();
        let current = (
            snapshot.active_contact,
            snapshot.conversation.len(),
            snapshot.typing,
        );
        if snapshot.active_contact.is_some() && current != last_seen {
            print!("{}", utils::format_conversation(&snapshot));
        }
        last_seen = current;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    utils::setup_logging(args.log_file.to_str(), LevelFilter::Debug)?;
    info!("murmur starting up");
    info!("System information: {} {}", std::env::consts::OS, std::env::consts::ARCH);
    info!("Logging to file: {}", args.log_file.display());

    let settings = resolve_settings(&args)?;
    let engine_config = settings.engine_config();

    let (engine, mut notice_rx) = match &settings.api_url {
        Some(url) => {
            println!("Connecting to {} as user {}...", url, settings.user_id);
            let backend = HttpBackend::new(url, settings.request_timeout())
                .map_err(|e| anyhow!("Could not set up HTTP backend: {}", e))?;
            SyncEngine::new(engine_config, Arc::new(backend))
        }
        None => {
            println!("No backend configured, running offline with demo data.");
            SyncEngine::offline(engine_config)
        }
    };

    let snapshots = engine.subscribe();
    let (intent_tx, intent_rx) = mpsc::channel(100);
    let engine_task = tokio::spawn(engine.run(intent_rx));

    tokio::spawn(async move {
        while let Some(notice) = notice_rx.recv().await {
            println!("{}", utils::format_notice(&notice));
        }
    });
    tokio::spawn(follow_conversation(snapshots.clone()));

    intent_tx.send(Intent::LoadContacts).await?;
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let snapshot = snapshots.borrow().clone();
        match parse_command(&line, &snapshot) {
            Command::Intent(intent) => {
                debug!("User intent: {:?}", intent);
                if intent_tx.send(intent).await.is_err() {
                    error!("Sync engine stopped unexpectedly");
                    break;
                }
            }
            Command::Print(text) => println!("{}", text),
            Command::Quit => break,
            Command::Nothing => {}
        }
    }

    drop(intent_tx);
    if let Err(e) = engine_task.await {
        error!("Sync engine task failed: {}", e);
    }
    info!("murmur shut down");
    Ok(())
}
