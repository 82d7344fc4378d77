//! Server entry point.
//!
//! Receives texts from the super via the webhook, routes them through the
//! engine, sends responses back, runs heartbeats on a background timer, and
//! serves the dashboard REST + WebSocket surface.

use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use maestro_agent::heartbeat::HeartbeatRunner;
use maestro_agent::Conversation;
use maestro_core::config::MaestroConfig;
use maestro_core::events::EventBus;
use maestro_knowledge::{load_project, Knowledge};
use maestro_store::Store;

mod app;
mod http;
mod sender;
mod webhook;
mod ws;

#[derive(Parser, Debug)]
#[command(name = "maestro-server", about = "Construction plan assistant server")]
struct Args {
    /// Super's phone number (E.164, e.g. +16823521836). Prompted when
    /// omitted.
    phone: Option<String>,

    /// Engine to start on (opus, gpt, gemini, gemini-flash).
    engine: Option<String>,

    /// Path to maestro.toml.
    #[arg(long)]
    config: Option<String>,
}

fn read_phone(arg: Option<String>) -> String {
    let raw = match arg {
        Some(p) => p,
        None => {
            print!("Super's phone number (e.g. +16823521836): ");
            let _ = std::io::stdout().flush();
            let mut line = String::new();
            let _ = std::io::stdin().read_line(&mut line);
            line.trim().to_string()
        }
    };
    if raw.starts_with('+') {
        raw
    } else {
        format!("+1{raw}")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "maestro=info,maestro_gateway=info,tower_http=warn".into()),
        )
        .init();

    let args = Args::parse();
    let config = MaestroConfig::load(args.config.as_deref())?;
    let super_phone = read_phone(args.phone);

    // Fatal startup path: knowledge store, schema and provider keys must be
    // in place before any port opens.
    let bus = EventBus::new();
    let knowledge = Arc::new(Knowledge::new(load_project(&config.project.knowledge_path)?));
    let store = Arc::new(Store::open(&config.database.path, bus.clone())?);

    let conversation = Conversation::new(
        config.clone(),
        store.clone(),
        knowledge.clone(),
        bus.clone(),
        args.engine.as_deref(),
    )?;
    let project_id = conversation.project_id().to_string();
    let project_name = knowledge.project_name();

    info!(
        engine = conversation.engine_name(),
        project = %project_name,
        tools = conversation.tool_count(),
        super_phone = %super_phone,
        "initialized"
    );

    let conversation = Arc::new(Mutex::new(conversation));
    let outbound: Arc<dyn sender::Sender> =
        Arc::new(sender::HttpSender::new(config.messaging.clone()));

    // One intro text; failure is non-fatal, the webhook still works.
    let intro = format!(
        "Hey — I'm Maestro. I'm reviewing the {project_name} plans right now. \
         I'll text you when I find something worth knowing. \
         You can also text me anytime with questions about the plans."
    );
    if let Err(e) = outbound.send_text(&super_phone, &intro).await {
        warn!(error = %e, "intro text failed, continuing");
    }

    // Heartbeat worker with a stop signal honored at minute granularity.
    let (stop_tx, stop_rx) = watch::channel(false);
    if config.heartbeat.enabled {
        let runner = HeartbeatRunner {
            conversation: conversation.clone(),
            store: store.clone(),
            knowledge: knowledge.clone(),
            bus: bus.clone(),
            project_id: project_id.clone(),
            state_path: PathBuf::from(&config.project.workspaces_path)
                .join("heartbeat_state.json"),
            sink: Arc::new(sender::TextFindingSink {
                sender: outbound.clone(),
                to: super_phone.clone(),
            }),
        };
        tokio::spawn(runner.run(stop_rx));
    }

    let bind = config.server.bind.clone();
    let port = config.server.port;
    let state = Arc::new(app::AppState {
        thumb_cache_dir: PathBuf::from(&config.project.workspaces_path).join("thumbs"),
        config,
        store,
        knowledge,
        bus,
        conversation,
        sender: outbound,
        project_id,
        super_phone,
        ws_clients: AtomicUsize::new(0),
    });
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!(%addr, "maestro is live");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    let _ = stop_tx.send(true);
    Ok(())
}
