use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;
use pylens_client::{Console, Effect, connect};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

#[derive(Parser)]
#[command(name = "pylens")]
#[command(about = "Terminal console for a pylens relay")]
struct Args {
    /// Relay WebSocket endpoint
    #[arg(short, long, default_value = "ws://127.0.0.1:3000/ws")]
    url: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn prompt(console: &Console) {
    let mut stdout = std::io::stdout().lock();
    let _ = write!(stdout, "{}", console.prompt());
    let _ = stdout.flush();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        "pylens_client=debug,pylens=debug"
    } else {
        "pylens_client=warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let (mut sink, mut events) = connect(&args.url)
        .await
        .with_context(|| format!("Failed to connect to {}", args.url))?;
    println!("Connected to {} (:help for commands)", args.url);

    let mut console = Console::new();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    prompt(&console);

    'session: loop {
        let effects = tokio::select! {
            event = events.next_event() => match event.context("Relay connection failed")? {
                Some(event) => {
                    debug!(event = event.name(), "relay event");
                    console.handle_event(event)
                }
                None => {
                    println!();
                    println!("Relay closed the connection");
                    break;
                }
            },
            line = stdin.next_line() => match line.context("Failed to read stdin")? {
                Some(line) => console.handle_input(&line),
                None => break,
            },
        };

        for effect in effects {
            match effect {
                Effect::Send(command) => {
                    sink.send(&command)
                        .await
                        .context("Failed to send command")?;
                }
                Effect::Print(text) => println!("{text}"),
                Effect::Quit => break 'session,
            }
        }
        prompt(&console);
    }

    let _ = sink.close().await;
    Ok(())
}
