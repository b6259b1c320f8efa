use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use switchboard_http::{ApiClient, StaticToken, WsTransport};
use switchboard_sync::{
    BadgeIcon, Change, ChangeSet, NotificationSink, PendingStatus, PollEvent, SinkError,
    SwitchboardConfig, SyncError, SyncSession,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "switchboard-console")]
#[command(about = "Follow a Switchboard conversation or dashboard from the terminal")]
struct Cli {
    /// Config file; defaults to the per-user config directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Open this conversation. Lines typed on stdin are sent to it.
    #[arg(long, conflicts_with = "account")]
    conversation: Option<u64>,

    /// Open the dashboard roster for this account.
    #[arg(long)]
    account: Option<u64>,

    /// Bearer token; falls back to SWITCHBOARD_TOKEN.
    #[arg(long)]
    token: Option<String>,

    /// Operator id used to decide which conversations are "mine".
    #[arg(long)]
    actor: Option<u64>,

    #[arg(long)]
    mute: bool,
}

/// Alerts rendered as log lines.
struct LogSink;

impl NotificationSink for LogSink {
    fn play_sound(&self, name: &str) -> Result<(), SinkError> {
        info!("[Alert] \u{7}sound: {}", name);
        Ok(())
    }

    fn set_badge_state(&self, blinking: bool) {
        info!("[Alert] badge blinking: {}", blinking);
    }

    fn set_badge_icon(&self, _icon: BadgeIcon) {}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let mut config = SwitchboardConfig::load(cli.config.as_deref())?;
    if let Some(actor) = cli.actor {
        config.sync = config.sync.with_actor(actor);
    }
    if cli.mute {
        config.sync = config.sync.with_sound(false);
    }

    let token = cli.token.or_else(|| std::env::var("SWITCHBOARD_TOKEN").ok());
    let credentials = Arc::new(StaticToken(token));
    let api = Arc::new(ApiClient::new(config.client.clone(), credentials.clone())?);
    let push = Arc::new(WsTransport::new(config.client.clone(), credentials));

    info!("=== Switchboard Console ===");
    info!("API: {}", config.client.base_url);

    let session = Arc::new(SyncSession::new(config.sync, api, push, Arc::new(LogSink)));
    let mut changes = session.engine().subscribe();
    let mut poll_events = session.poll_events();
    match (cli.conversation, cli.account) {
        (Some(id), _) => session.open_conversation(id).await?,
        (None, Some(account)) => session.open_dashboard(account).await?,
        (None, None) => anyhow::bail!("pass --conversation <id> or --account <id>"),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => handle_line(&session, line.trim()).await,
                    None => break,
                }
            }
            set = changes.recv() => match set {
                Ok(set) => print_changes(&set),
                Err(RecvError::Lagged(skipped)) => warn!("Display lagged by {} change sets", skipped),
                Err(RecvError::Closed) => break,
            },
            event = poll_events.recv() => {
                if let Ok(event) = event {
                    report_poll(&event);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    session.shutdown().await;
    Ok(())
}

async fn handle_line(session: &Arc<SyncSession>, line: &str) {
    match line {
        "" => {}
        "/focus" => session.signaler().set_focused(true),
        "/blur" => session.signaler().set_focused(false),
        "/resume" => session.resume_polling().await,
        "/status" => print_status(session).await,
        "/roster" => match session.engine().active_roster().await {
            Ok(roster) => {
                for conversation in roster {
                    println!(
                        "#{:<6} {:?} assignee={:?}",
                        conversation.id, conversation.status, conversation.assignee_id
                    );
                }
            }
            Err(e) => warn!("{}", e),
        },
        _ => {
            let retry = match line.strip_prefix("/retry ") {
                Some(key) => match key.trim().parse::<Uuid>() {
                    Ok(key) => Some(key),
                    Err(e) => {
                        warn!("Not a send key: {}", e);
                        return;
                    }
                },
                None => None,
            };
            // Sends settle in the background so the feed keeps printing.
            let session = session.clone();
            let line = line.to_string();
            tokio::spawn(async move {
                let result = match retry {
                    Some(key) => session.resubmit(key).await,
                    None => session.send(&line).await,
                };
                report_send(&session, result).await;
            });
        }
    }
}

async fn report_send(session: &SyncSession, result: Result<Uuid, SyncError>) {
    match result {
        Ok(key) => info!("Sent {}", key),
        Err(SyncError::SendFailed { content, reason }) => {
            warn!("Send failed ({}); /retry to resend {:?}", reason, content);
            let conversation = session.active_scope().await.and_then(|s| s.conversation_id());
            let failed = conversation
                .map(|id| session.tracker().pending_for(id))
                .unwrap_or_default();
            for send in failed.iter().filter(|s| s.status == PendingStatus::Failed) {
                warn!("  /retry {}", send.client_key);
            }
        }
        Err(e) => warn!("{}", e),
    }
}

async fn print_status(session: &SyncSession) {
    let Some(scope) = session.active_scope().await else {
        println!("nothing open");
        return;
    };
    match session.connection_state().await {
        Some(state) => {
            let state = state.borrow().clone();
            println!(
                "{}: {} ({:?}, {} retries)",
                scope,
                if state.is_online() { "online" } else { "offline" },
                state.status,
                state.retry_count
            );
        }
        None => println!("{}: no push connection", scope),
    }
    if let Some(id) = scope.conversation_id() {
        for send in session.tracker().pending_for(id) {
            if !send.is_settled() {
                let stalled = if send.stalled { " (stalled)" } else { "" };
                println!("  sending{} {}: {:?}", stalled, send.client_key, send.content);
            }
        }
    }
}

fn print_changes(set: &ChangeSet) {
    for change in &set.changes {
        match change {
            Change::MessageAdded(message) => println!(
                "[{}] {:?}{}: {}",
                message.created_at.format("%H:%M:%S"),
                message.direction,
                if message.transient { " (sending)" } else { "" },
                message.content
            ),
            Change::MessageReplaced { current, .. } => {
                println!("  edited #{:?}: {}", current.id, current.content)
            }
            Change::MessageRemoved(message) | Change::TransientExpired { message, .. } => {
                println!("  withdrawn: {}", message.content)
            }
            Change::ConversationAdded(conversation) => {
                println!("+ conversation #{} ({:?})", conversation.id, conversation.status)
            }
            Change::ConversationUpdated { current, .. } => println!(
                "~ conversation #{} ({:?}, assignee {:?})",
                current.id, current.status, current.assignee_id
            ),
            Change::ConversationRemoved(conversation) => {
                println!("- conversation #{}", conversation.id)
            }
            Change::MessagePromoted { .. } => {}
        }
    }
}

fn report_poll(event: &PollEvent) {
    match event {
        PollEvent::Degraded { failures, error } => {
            warn!("Polling degraded after {} failures: {}", failures, error)
        }
        PollEvent::Recovered => info!("Polling recovered"),
        PollEvent::AuthExpired => warn!("Credential rejected; refresh it and type /resume"),
    }
}
