//! handoff-cli — terminal client for the Handoff pairing relay
//!
//! Plays either side of a pairing: open a session and hand the code (or the
//! pairing URL) to the other device, or join one with a code you were given.
//!
//! # Subcommands
//! - `new [--json]`                                   — create a session
//! - `join <code>`                                    — resolve a code
//! - `send --session <id> --as <role> <text>`         — append one message
//! - `list --session <id> [--json]`                   — print the message log
//! - `watch --session <id>`                           — follow the log until Ctrl+C
//! - `chat (--code <code> | --new) --as <role>`       — watch + send stdin lines
//! - `status`                                         — show server health

use std::time::Duration;

use clap::{ArgGroup, Parser, Subcommand};
use handoff_core::config::{self, PollConfig};
use handoff_core::sync::SyncOutcome;
use handoff_core::{HandoffClient, Message, NewSession, Poller, SenderType, SyncView};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8787";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "handoff-cli",
    version,
    about = "Handoff — pair with another device by code and relay text"
)]
struct Cli {
    /// Handoff HTTP server URL (overrides HANDOFF_URL env var)
    #[arg(long, env = "HANDOFF_URL", default_value = DEFAULT_SERVER)]
    server: String,

    /// Base URL the other device opens for the pairing link (defaults to --server)
    #[arg(long, env = "HANDOFF_PUBLIC_URL")]
    public_url: Option<String>,

    /// Poll interval for watch/chat, in milliseconds
    #[arg(long, env = "HANDOFF_POLL_MS", default_value_t = PollConfig::default().interval_ms)]
    poll_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Where pairing links point: `--public-url`, else the API server itself.
    fn public_url(&self) -> &str {
        self.public_url.as_deref().unwrap_or(&self.server)
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create a session and print its pairing code
    New {
        /// Print the created session as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve a pairing code to its session
    Join {
        /// Six-character pairing code (case-insensitive)
        code: String,
    },

    /// Send one message to a session
    Send {
        #[arg(long)]
        session: Uuid,

        /// Which side of the pairing is speaking: desktop or mobile
        #[arg(long = "as", value_name = "ROLE")]
        role: SenderType,

        text: String,
    },

    /// Print all messages of a session, oldest first
    List {
        #[arg(long)]
        session: Uuid,

        #[arg(long)]
        json: bool,
    },

    /// Follow a session and print messages as they arrive
    Watch {
        #[arg(long)]
        session: Uuid,
    },

    /// Interactive relay: print incoming messages, send each line typed on stdin
    #[command(group(ArgGroup::new("target").required(true).args(["code", "new"])))]
    Chat {
        /// Join an existing session by code
        #[arg(long)]
        code: Option<String>,

        /// Create a new session and wait for the other side
        #[arg(long)]
        new: bool,

        #[arg(long = "as", value_name = "ROLE")]
        role: SenderType,
    },

    /// Show Handoff server status
    Status,
}

// ============================================================================
// Output formatting
// ============================================================================

/// `handoff-cli new --json` output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionOutput {
    pub session_id: Uuid,
    pub session_code: String,
    pub pairing_url: String,
}

impl NewSessionOutput {
    pub fn new(public_url: &str, created: &NewSession) -> Self {
        Self {
            session_id: created.session_id,
            session_code: created.session_code.clone(),
            pairing_url: config::pairing_url(public_url, &created.session_code),
        }
    }
}

/// One message as a terminal line: `[HH:MM:SS] role: content`.
/// Continuation lines are indented under the first.
pub fn format_message(message: &Message) -> String {
    let stamp = message
        .created_at
        .with_timezone(&chrono::Local)
        .format("%H:%M:%S");
    let prefix = format!("[{}] {}: ", stamp, message.sender_type);
    let indent = " ".repeat(prefix.chars().count());

    let mut out = prefix;
    for (i, line) in message.content.lines().enumerate() {
        if i > 0 {
            out.push('\n');
            out.push_str(&indent);
        }
        out.push_str(line);
    }
    out
}

/// Lines to print after a changed poll. Pure appends print only the new
/// messages; any other change reprints the log. `skip` hides one role's echo.
pub fn render_update(view: &SyncView, outcome: &SyncOutcome, skip: Option<SenderType>) -> Vec<String> {
    let (header, messages) = match view.appended_since(outcome) {
        Some(appended) => (None, appended),
        None => (
            Some(format!("-- log replaced ({} messages) --", view.messages().len())),
            view.messages(),
        ),
    };

    header
        .into_iter()
        .chain(
            messages
                .iter()
                .filter(|m| Some(m.sender_type) != skip)
                .map(format_message),
        )
        .collect()
}

// ============================================================================
// Commands
// ============================================================================

async fn do_new(client: &HandoffClient, public_url: &str, json_output: bool) -> anyhow::Result<()> {
    let created = client.create_session().await?;
    let output = NewSessionOutput::new(public_url, &created);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Session code: {}", output.session_code);
        println!("Pairing URL:  {}", output.pairing_url);
        println!("Session id:   {}", output.session_id);
    }
    Ok(())
}

async fn do_join(client: &HandoffClient, code: &str) -> anyhow::Result<()> {
    let handle = client.resolve_session(code).await?;
    println!("Session code: {}", handle.session_code);
    println!("Session id:   {}", handle.session_id);
    println!(
        "Expires at:   {}",
        handle.expires_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
    );
    Ok(())
}

async fn do_send(client: &HandoffClient, session: Uuid, role: SenderType, text: &str) -> anyhow::Result<()> {
    let message = client.send_message(session, text, role).await?;
    println!("{}", format_message(&message));
    Ok(())
}

async fn do_list(client: &HandoffClient, session: Uuid, json_output: bool) -> anyhow::Result<()> {
    let messages = client.list_messages(session).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }
    if messages.is_empty() {
        eprintln!("No messages yet in session {}", session);
        return Ok(());
    }
    for m in &messages {
        println!("{}", format_message(m));
    }
    Ok(())
}

fn ctrl_c_shutdown() -> broadcast::Sender<()> {
    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(());
        }
    });
    tx
}

fn spawn_poller(
    client: &HandoffClient,
    session: Uuid,
    period: Duration,
    skip: Option<SenderType>,
    shutdown: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<SyncView> {
    let poller = Poller::new(client.clone(), session, period);
    tokio::spawn(poller.run(
        move |view: &SyncView, outcome: &SyncOutcome| {
            for line in render_update(view, outcome, skip) {
                println!("{}", line);
            }
        },
        shutdown,
    ))
}

async fn do_watch(client: &HandoffClient, session: Uuid, period: Duration) -> anyhow::Result<()> {
    eprintln!("Watching session {} (Ctrl+C to stop)", session);
    let shutdown = ctrl_c_shutdown();
    let view = spawn_poller(client, session, period, None, shutdown.subscribe()).await?;
    eprintln!("Stopped after {} messages", view.messages().len());
    Ok(())
}

async fn do_chat(
    client: &HandoffClient,
    public_url: &str,
    code: Option<String>,
    role: SenderType,
    period: Duration,
) -> anyhow::Result<()> {
    let session = match code {
        Some(code) => {
            let handle = client.resolve_session(&code).await?;
            eprintln!("Joined session {}", handle.session_code);
            handle.session_id
        }
        None => {
            let created = client.create_session().await?;
            eprintln!("Session code: {}", created.session_code);
            eprintln!("Pairing URL:  {}", config::pairing_url(public_url, &created.session_code));
            created.session_id
        }
    };
    eprintln!("Chatting as {} — type a line and press Enter; Ctrl+C or EOF to quit", role);

    let shutdown = ctrl_c_shutdown();
    let poller = spawn_poller(client, session, period, Some(role), shutdown.subscribe());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stop = shutdown.subscribe();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::debug!("stdin closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                if let Err(e) = client.send_message(session, &line, role).await {
                    eprintln!("handoff-cli: send failed: {}", e);
                }
            }
            _ = stop.recv() => break,
        }
    }

    let _ = shutdown.send(());
    poller.await?;
    Ok(())
}

async fn do_status(client: &HandoffClient) -> anyhow::Result<()> {
    match client.health().await {
        Ok(body) => {
            println!("Handoff server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:        {}", body["version"].as_str().unwrap_or("?"));
            println!("Store:          {}", body["store"].as_str().unwrap_or("?"));
            println!("Backend:        {}", body["backend"].as_str().unwrap_or("?"));
        }
        Err(e) => {
            eprintln!("handoff-cli: server unhealthy at {} — {}", client.base_url(), e);
            std::process::exit(1);
        }
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let client = match HandoffClient::new(&cli.server) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("handoff-cli: {}", e);
            std::process::exit(1);
        }
    };
    let period = Duration::from_millis(cli.poll_ms.max(100));
    let public_url = cli.public_url().to_string();

    let result = match cli.command {
        Commands::New { json } => do_new(&client, &public_url, json).await,
        Commands::Join { code } => do_join(&client, &code).await,
        Commands::Send { session, role, text } => do_send(&client, session, role, &text).await,
        Commands::List { session, json } => do_list(&client, session, json).await,
        Commands::Watch { session } => do_watch(&client, session, period).await,
        Commands::Chat { code, role, .. } => do_chat(&client, &public_url, code, role, period).await,
        Commands::Status => do_status(&client).await,
    };

    if let Err(e) = result {
        eprintln!("handoff-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn mock_message(content: &str, sender_type: SenderType) -> Message {
        Message {
            id: Uuid::new_v4(),
            session_id: Uuid::nil(),
            content: content.to_string(),
            sender_type,
            created_at: Utc::now(),
        }
    }

    // ========================================================================
    // TEST 1: pairing links use --public-url, falling back to --server
    // ========================================================================
    #[test]
    fn test_public_url_resolution() {
        let cli = Cli::try_parse_from(["handoff-cli", "--server", "http://10.0.0.5:8787", "new"]).unwrap();
        assert_eq!(cli.public_url(), "http://10.0.0.5:8787");

        let cli = Cli::try_parse_from([
            "handoff-cli",
            "--server",
            "http://10.0.0.5:8787",
            "--public-url",
            "https://handoff.example.com/",
            "new",
        ])
        .unwrap();
        assert_eq!(cli.public_url(), "https://handoff.example.com/");

        let created = NewSession {
            session_id: Uuid::nil(),
            session_code: "AB12CD".to_string(),
        };
        let out = NewSessionOutput::new(cli.public_url(), &created);
        assert_eq!(out.pairing_url, "https://handoff.example.com/mobile?code=AB12CD");
    }

    // ========================================================================
    // TEST 2: new --json output uses camelCase keys
    // ========================================================================
    #[test]
    fn test_new_session_output_json() {
        let created = NewSession {
            session_id: Uuid::nil(),
            session_code: "XY98ZW".to_string(),
        };
        let out = NewSessionOutput::new("http://127.0.0.1:8787", &created);
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["sessionCode"], "XY98ZW");
        assert_eq!(json["pairingUrl"], "http://127.0.0.1:8787/mobile?code=XY98ZW");
        assert!(json["sessionId"].is_string());
    }

    // ========================================================================
    // TEST 3: message line carries role and content
    // ========================================================================
    #[test]
    fn test_format_message_single_line() {
        let line = format_message(&mock_message("hello phone", SenderType::Desktop));
        assert!(line.starts_with('['));
        assert!(line.ends_with("desktop: hello phone"), "got: {}", line);
    }

    // ========================================================================
    // TEST 4: multiline content is indented under the prefix
    // ========================================================================
    #[test]
    fn test_format_message_multiline_indent() {
        let line = format_message(&mock_message("first\nsecond", SenderType::Mobile));
        let parts: Vec<&str> = line.split('\n').collect();
        assert_eq!(parts.len(), 2);
        let prefix_len = parts[0].len() - "first".len();
        assert_eq!(parts[1], format!("{}second", " ".repeat(prefix_len)));
    }

    // ========================================================================
    // TEST 5: appends print only new lines; own role is skipped
    // ========================================================================
    #[test]
    fn test_render_update_appends_and_skips_own_role() {
        let mut view = SyncView::new();
        let first = mock_message("one", SenderType::Desktop);
        view.reconcile(vec![first.clone()]);

        let outcome = view.reconcile(vec![
            first,
            mock_message("two", SenderType::Mobile),
            mock_message("three", SenderType::Desktop),
        ]);
        let lines = render_update(&view, &outcome, Some(SenderType::Desktop));
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("mobile: two"));
    }

    // ========================================================================
    // TEST 6: a shrinking log reprints everything with a header
    // ========================================================================
    #[test]
    fn test_render_update_replaced_log() {
        let mut view = SyncView::new();
        view.reconcile(vec![
            mock_message("a", SenderType::Desktop),
            mock_message("b", SenderType::Mobile),
        ]);
        let outcome = view.reconcile(vec![mock_message("c", SenderType::Mobile)]);

        let lines = render_update(&view, &outcome, None);
        assert_eq!(lines[0], "-- log replaced (1 messages) --");
        assert_eq!(lines.len(), 2);
    }

    // ========================================================================
    // TEST 7: a message landing between shown ones reprints the log
    // ========================================================================
    #[test]
    fn test_render_update_mid_list_insert_reprints() {
        let mut view = SyncView::new();
        let first = mock_message("first", SenderType::Desktop);
        let last = mock_message("last", SenderType::Desktop);
        view.reconcile(vec![first.clone(), last.clone()]);

        let late = mock_message("late commit", SenderType::Mobile);
        let outcome = view.reconcile(vec![first, late, last]);

        let lines = render_update(&view, &outcome, None);
        assert_eq!(lines[0], "-- log replaced (3 messages) --");
        assert_eq!(lines.len(), 4);
        assert!(lines[2].ends_with("mobile: late commit"));
    }

    // ========================================================================
    // TEST 8: chat requires exactly one of --code / --new
    // ========================================================================
    #[test]
    fn test_chat_target_group() {
        assert!(Cli::try_parse_from(["handoff-cli", "chat", "--as", "desktop"]).is_err());
        assert!(Cli::try_parse_from([
            "handoff-cli", "chat", "--code", "AB12CD", "--new", "--as", "desktop"
        ])
        .is_err());

        let cli = Cli::try_parse_from(["handoff-cli", "chat", "--new", "--as", "Mobile"]).unwrap();
        match cli.command {
            Commands::Chat { code, new, role } => {
                assert!(code.is_none());
                assert!(new);
                assert_eq!(role, SenderType::Mobile);
            }
            other => panic!("expected chat, got {:?}", other),
        }
    }

    // ========================================================================
    // TEST 9: poll interval defaults to the relay's two-second cadence
    // ========================================================================
    #[test]
    fn test_poll_interval_default() {
        let cli = Cli::try_parse_from(["handoff-cli", "status"]).unwrap();
        assert_eq!(cli.poll_ms, 2000);
    }

    // ========================================================================
    // TEST 10: unknown role is rejected at parse time
    // ========================================================================
    #[test]
    fn test_send_rejects_unknown_role() {
        let id = Uuid::new_v4().to_string();
        assert!(Cli::try_parse_from([
            "handoff-cli", "send", "--session", id.as_str(), "--as", "tablet", "hi"
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "handoff-cli", "send", "--session", id.as_str(), "--as", "desktop", "hi"
        ])
        .is_ok());
    }
}
