use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the trivia gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:5000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway status
    Status,
    /// List circuit breakers and their counters
    Breakers,
    /// Force a breaker open or closed
    Breaker {
        operation: String,
        #[arg(value_parser = ["open", "close"])]
        action: String,
    },
    /// Publish a message to every member of a room
    Publish {
        room: String,
        #[arg(short = 't', long = "type")]
        kind: String,
        /// JSON payload
        #[arg(short, long, default_value = "null")]
        data: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Status => client.get(format!("{base}/status")).send().await?,
        Commands::Breakers => client.get(format!("{base}/admin/breakers")).send().await?,
        Commands::Breaker { operation, action } => {
            client
                .post(format!("{base}/admin/breakers/{operation}/{action}"))
                .send()
                .await?
        }
        Commands::Publish { room, kind, data } => {
            let data: Value = serde_json::from_str(&data)?;
            client
                .post(format!("{base}/rooms/{room}/messages"))
                .json(&json!({ "type": kind, "data": data }))
                .send()
                .await?
        }
    };
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
