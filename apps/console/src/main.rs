use anyhow::Result;
use clap::Parser;
use session_core::{SessionClient, StateChange};
use shared::domain::Provider;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Console front-end for the session core: renders state changes and
/// forwards operator intents. All protocol and state logic lives in
/// `session_core`; this binary only prints and parses lines.
#[derive(Parser, Debug)]
struct Args {
    /// Base URL of the agent backend.
    #[arg(long, default_value = "http://localhost:8000")]
    backend_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    tracing::info!(backend_url = %args.backend_url, "starting console session");
    let client = SessionClient::new(args.backend_url);
    let mut changes = client.subscribe();
    tokio::spawn(async move {
        while let Ok(change) = changes.recv().await {
            match change {
                StateChange::Phase(phase) => println!("-- connection: {phase}"),
                StateChange::Running(true) => println!("-- agent running"),
                StateChange::Running(false) => println!("-- agent idle"),
                StateChange::Configured(provider) => println!("-- provider: {provider}"),
                StateChange::Message(message) => {
                    println!("[{:?}] {}", message.kind, message.content);
                }
            }
        }
    });

    client.connect().await?;
    // Adopt whatever the backend already believes is running.
    let _ = client.fetch_status().await;

    println!("Commands: /config <openai|gemini|anthropic> <api-key>, /stop, /status, /quit.");
    println!("Anything else is submitted as a task.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("/config") {
            let mut parts = rest.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(provider), Some(api_key)) => match provider.parse::<Provider>() {
                    Ok(provider) => {
                        let _ = client.configure(provider, api_key).await;
                    }
                    Err(err) => println!("-- {err}"),
                },
                _ => println!("-- usage: /config <openai|gemini|anthropic> <api-key>"),
            }
        } else if line == "/stop" {
            client.stop_task().await;
        } else if line == "/status" {
            match client.fetch_status().await {
                Ok(status) => println!(
                    "-- running={} task={}",
                    status.is_running,
                    status.current_task.as_deref().unwrap_or("-")
                ),
                Err(err) => println!("-- status poll failed: {err}"),
            }
        } else if line == "/quit" {
            break;
        } else {
            // Command failures already land in the transcript.
            let _ = client.submit_task(line).await;
        }
    }

    client.shutdown().await;
    Ok(())
}
