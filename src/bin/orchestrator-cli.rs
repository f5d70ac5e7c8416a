use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "orchestrator-cli")]
#[command(about = "Management CLI for the scrape orchestrator", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, env = "ORCHESTRATOR_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show orchestrator status and counters
    Status,
    /// List workers and their proxy bindings
    Pool,
    /// Resize the worker pool
    Scale { size: usize },
    /// Refresh proxy sources and rebuild every worker
    Rotate,
    /// List proxies and their health
    Proxies,
    /// Show circuit breakers, or one upstream's breaker
    Breakers { target: Option<String> },
    /// Show the active configuration, or apply a JSON patch to it
    Config {
        #[arg(long)]
        patch: Option<String>,
    },
    /// Drop every cached result
    ClearCache,
    /// Run a fetch through the public API
    Fetch {
        target: String,
        #[arg(long, default_value = "search")]
        kind: String,
        #[arg(long)]
        page: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let admin = format!("{}/admin", cli.url.trim_end_matches('/'));

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match cli.command {
        Commands::Status => client.get(format!("{}/status", admin)),
        Commands::Pool => client.get(format!("{}/pool", admin)),
        Commands::Scale { size } => client
            .post(format!("{}/pool/scale", admin))
            .json(&json!({ "size": size })),
        Commands::Rotate => client.post(format!("{}/proxies/rotate", admin)),
        Commands::Proxies => client.get(format!("{}/proxies", admin)),
        Commands::Breakers { target: None } => client.get(format!("{}/breakers", admin)),
        Commands::Breakers { target: Some(target) } => {
            client.get(format!("{}/breakers/{}", admin, target))
        }
        Commands::Config { patch: None } => client.get(format!("{}/config", admin)),
        Commands::Config { patch: Some(patch) } => {
            let patch: Value = serde_json::from_str(&patch)?;
            client.patch(format!("{}/config", admin)).json(&patch)
        }
        Commands::ClearCache => client.delete(format!("{}/cache", admin)),
        Commands::Fetch { target, kind, page } => {
            let mut query = vec![("target", target), ("kind", kind)];
            if let Some(page) = page {
                query.push(("page", page.to_string()));
            }
            client
                .get(format!("{}/api/fetch", cli.url.trim_end_matches('/')))
                .query(&query)
        }
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: orchestrator returned status {}", status);
        if let Some(retry_after) = res.headers().get(reqwest::header::RETRY_AFTER) {
            eprintln!("Retry-After: {}", retry_after.to_str().unwrap_or("?"));
        }
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
