use std::sync::Arc;

use tokio::io::{self, AsyncBufReadExt};
use tracing_subscriber::EnvFilter;

use stream_commander::registry;
use stream_commander::surface::LoggingSurface;
use stream_commander::{CommandEngine, EngineConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let engine = CommandEngine::new(EngineConfig::from_env(), Arc::new(LoggingSurface));

    println!("📺 Stream Command Center");
    println!("--------------------------------------------------");
    println!("Syntax: <Agent> Ex.<action> -- <params>");
    println!("Agents: Raitha (media/tab), Netra (probe), Kala (scheduling)");
    println!("Type 'help' for the action list, 'quit' to exit.");
    println!("--------------------------------------------------");

    let stdin = io::stdin();
    let mut reader = io::BufReader::new(stdin);
    let mut buffer = String::new();

    prompt()?;
    while reader.read_line(&mut buffer).await? > 0 {
        let input = buffer.trim().to_string();
        buffer.clear();

        // Blank lines and `//` comments are ignored, same as script input.
        if input.is_empty() || input.starts_with("//") {
            prompt()?;
            continue;
        }

        match input.as_str() {
            "help" => {
                println!("Meta: help | status | summary | quit");
                println!("Commands can be joined with '|' on one line.");
                for line in registry::help_lines() {
                    println!("  {line}");
                }
            }
            "quit" | "exit" => break,
            "status" => println!("{}", serde_json::to_string_pretty(&engine.status())?),
            "summary" => println!("{}", engine.summary()),
            _ => match engine.submit(&input) {
                Ok(out) => println!("✅ {out}"),
                Err(e) => println!("❌ {e}"),
            },
        }

        prompt()?;
    }

    println!("Session done: {}", engine.summary());
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    use std::io::Write;
    print!("> ");
    std::io::stdout().flush()
}
