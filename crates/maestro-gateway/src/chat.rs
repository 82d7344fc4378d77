//! Interactive chat — the same conversation over stdin/stdout instead of
//! the webhook and sender. Useful for poking at a project locally.

use std::io::{BufRead, Write};
use std::sync::Arc;

use clap::Parser;

use maestro_agent::Conversation;
use maestro_core::config::MaestroConfig;
use maestro_core::events::EventBus;
use maestro_knowledge::{load_project, Knowledge};
use maestro_store::Store;

#[derive(Parser, Debug)]
#[command(name = "maestro-chat", about = "Interactive console for Maestro")]
struct Args {
    /// Engine to start on (opus, gpt, gemini, gemini-flash).
    engine: Option<String>,

    /// Path to maestro.toml.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "maestro=warn".into()),
        )
        .init();

    let args = Args::parse();
    let config = MaestroConfig::load(args.config.as_deref())?;

    let bus = EventBus::new();
    let knowledge = Arc::new(Knowledge::new(load_project(&config.project.knowledge_path)?));
    let store = Arc::new(Store::open(&config.database.path, bus.clone())?);

    let mut conversation = Conversation::new(
        config,
        store,
        knowledge.clone(),
        bus,
        args.engine.as_deref(),
    )?;

    println!(
        "Maestro ready — project '{}', engine '{}', {} tools.",
        knowledge.project_name(),
        conversation.engine_name(),
        conversation.tool_count()
    );
    println!("Commands: /stats, /switch <engine>, /quit\n");

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if input == "/quit" || input == "/exit" {
            break;
        }
        if input == "/stats" {
            println!("{}", serde_json::to_string_pretty(&conversation.get_stats()?)?);
            continue;
        }
        if let Some(engine) = input.strip_prefix("/switch ") {
            println!("{}", conversation.switch_engine(engine.trim()).await?);
            continue;
        }

        match conversation.send(input).await {
            Ok(reply) => println!("\n{reply}\n"),
            Err(e) => eprintln!("error: {e}"),
        }
    }

    Ok(())
}
