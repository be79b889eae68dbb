use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::prelude::*;

use duplex_client::api::{ApiClient, RegisterInput};
use duplex_client::{ClientConfig, ClientError, ConversationController, ConversationEvent};
use duplex_core::{Credential, Message, Room, Session};

#[derive(Parser)]
#[command(name = "duplex")]
#[command(about = "Two-person direct messaging from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Custom data directory (defaults to ~/.duplex)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and store the credential
    Register {
        username: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        first_name: Option<String>,
    },

    /// Log in and store the credential
    Login { username: String },

    /// List your conversations
    Rooms,

    /// Open a conversation with a user and chat
    Chat { username: String },

    /// Forget the stored credential
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so the conversation stays readable on stdout
    let default_directive = if cli.debug {
        "duplex=debug,duplex_client=debug,info"
    } else {
        "duplex=warn,duplex_client=warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let config = ClientConfig::load(cli.data_dir)?;

    match cli.command {
        Commands::Register {
            username,
            email,
            first_name,
        } => register_command(&config, username, email, first_name).await,
        Commands::Login { username } => login_command(&config, username).await,
        Commands::Rooms => rooms_command(&config).await,
        Commands::Chat { username } => chat_command(config, username).await,
        Commands::Logout => logout_command(&config),
    }
}

// =============================================================================
// Credential cache
// =============================================================================

fn credential_path(config: &ClientConfig) -> PathBuf {
    config.data_dir.join("credential")
}

fn load_credential(config: &ClientConfig) -> Option<Credential> {
    let token = std::fs::read_to_string(credential_path(config)).ok()?;
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    Some(Credential::new(token))
}

fn store_credential(config: &ClientConfig, credential: &Credential) -> Result<()> {
    std::fs::write(credential_path(config), credential.as_str())
        .context("failed to store credential")
}

fn require_credential(config: &ClientConfig) -> Result<Credential> {
    match load_credential(config) {
        Some(credential) => Ok(credential),
        None => bail!("not logged in -- run `duplex login <username>` first"),
    }
}

// =============================================================================
// Commands
// =============================================================================

fn prompt(label: &str) -> Result<String> {
    eprint!("{label}: ");
    std::io::stderr().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

async fn register_command(
    config: &ClientConfig,
    username: String,
    email: Option<String>,
    first_name: Option<String>,
) -> Result<()> {
    let email = match email {
        Some(email) => email,
        None => prompt("Email")?,
    };
    let first_name = first_name.unwrap_or_else(|| username.clone());
    let password = prompt("Password")?;
    let confirmation = prompt("Confirm password")?;

    let api = ApiClient::new(config)?;
    let credential = api
        .register(&RegisterInput {
            first_name,
            last_name: None,
            username: username.clone(),
            email,
            password,
            password_confirmation: confirmation,
        })
        .await?;

    store_credential(config, &credential)?;
    eprintln!("Registered and logged in as {username}.");
    Ok(())
}

async fn login_command(config: &ClientConfig, username: String) -> Result<()> {
    let password = prompt("Password")?;
    let api = ApiClient::new(config)?;
    let credential = api.login(&username, &password).await?;
    store_credential(config, &credential)?;
    eprintln!("Logged in as {username}.");
    Ok(())
}

async fn rooms_command(config: &ClientConfig) -> Result<()> {
    let credential = require_credential(config)?;
    let session = credential.session().map_err(|_| ClientError::Auth)?;
    let api = ApiClient::new(config)?;
    let rooms = api.rooms(&credential).await?;

    if rooms.is_empty() {
        eprintln!("No conversations yet. Start one with `duplex chat <username>`.");
        return Ok(());
    }

    for room in &rooms {
        let peer = room
            .peer_of(session.id)
            .map(|p| p.username.as_str())
            .unwrap_or("(unknown)");
        println!(
            "{:20} last activity {}",
            peer,
            room.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

async fn chat_command(config: ClientConfig, username: String) -> Result<()> {
    let credential = require_credential(&config)?;
    let api = ApiClient::new(&config)?;
    let room = api.open_room(&credential, &username).await?;

    let mut controller = ConversationController::new(config, credential)?;
    let me = controller.session().clone();

    controller.enter(room.id).await?;
    let Some(conversation) = controller.conversation() else {
        return Ok(());
    };

    let peer = room
        .peer_of(me.id)
        .map(|p| p.username.clone())
        .unwrap_or_else(|| username.clone());
    eprintln!("[duplex: chatting with {peer} -- Ctrl-D or /quit to leave]");

    if conversation.history_degraded() {
        eprintln!("[duplex: couldn't load history, showing live messages only]");
    }
    for message in conversation.timeline().iter() {
        print_message(&room, &me, message);
    }

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if line.trim() == "/quit" {
                            break;
                        }
                        match conversation.send(&line, None).await {
                            Ok(()) => {}
                            Err(ClientError::Validation(_)) => {
                                // Empty input line; nothing to send
                            }
                            Err(err) => eprintln!("[duplex: send failed: {err}]"),
                        }
                    }
                    None => break, // EOF
                }
            }

            event = conversation.next_event() => {
                match event {
                    Some(ConversationEvent::Received(message)) => {
                        print_message(&room, &me, &message);
                    }
                    Some(ConversationEvent::ConnectionLost) => {
                        eprintln!("[duplex: connection lost, reconnecting...]");
                    }
                    Some(ConversationEvent::Reconnected { history_refreshed }) => {
                        if history_refreshed {
                            eprintln!("[duplex: reconnected]");
                        } else {
                            eprintln!("[duplex: reconnected, history catch-up failed]");
                        }
                    }
                    None => break,
                }
            }
        }
    }

    controller.leave().await;
    eprintln!("[duplex: left the conversation]");
    Ok(())
}

fn logout_command(config: &ClientConfig) -> Result<()> {
    let path = credential_path(config);
    if path.exists() {
        std::fs::remove_file(&path).context("failed to remove credential")?;
        eprintln!("Logged out.");
    } else {
        eprintln!("No stored credential.");
    }
    Ok(())
}

fn print_message(room: &Room, me: &Session, message: &Message) {
    let sender = if message.sender_id == me.id {
        "you"
    } else {
        room.username_of(message.sender_id).unwrap_or("(unknown)")
    };
    let stamp = message.created_at.format("%H:%M");
    match &message.attachment {
        Some(attachment) => println!("[{stamp}] {sender}: {} ({attachment})", message.body),
        None => println!("[{stamp}] {sender}: {}", message.body),
    }
}
