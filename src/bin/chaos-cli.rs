use clap::{Args, Parser, Subcommand};
use serde_json::Value;

use chaos_proxy::chaos::ChaosSettings;
use chaos_proxy::config::StoreConfig;
use chaos_proxy::store::{ChaosStore, RedisStore};

#[derive(Parser)]
#[command(name = "chaos-cli")]
#[command(about = "Management CLI for the Chaos Proxy", long_about = None)]
struct Cli {
    /// Proxy base URL (for status and blocked)
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Redis address ("host:port" or redis:// URL)
    #[arg(short, long, default_value = "localhost:6379")]
    redis: String,

    /// Redis password
    #[arg(long, default_value = "")]
    password: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check proxy health and store connectivity
    Status,
    /// List blocked IPs as seen by the proxy
    Blocked,
    /// Add an IP to the blocklist
    Block { ip: String },
    /// Remove an IP from the blocklist
    Unblock { ip: String },
    /// Show the most recent traffic entries
    Recent {
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },
    /// Inspect or change chaos settings
    Chaos {
        #[command(subcommand)]
        action: ChaosAction,
    },
}

#[derive(Subcommand)]
enum ChaosAction {
    /// Print current chaos settings
    Show,
    /// Update chaos settings; omitted fields keep their value
    Set(SetArgs),
    /// Turn all chaos off
    Off,
}

#[derive(Args)]
struct SetArgs {
    #[arg(long)]
    latency_enabled: Option<bool>,
    #[arg(long)]
    latency_min: Option<u64>,
    #[arg(long)]
    latency_max: Option<u64>,
    #[arg(long)]
    failure_enabled: Option<bool>,
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=100))]
    failure_rate: Option<u32>,
}

impl SetArgs {
    fn apply(&self, mut settings: ChaosSettings) -> ChaosSettings {
        if let Some(v) = self.latency_enabled {
            settings.latency_enabled = v;
        }
        if let Some(v) = self.latency_min {
            settings.latency_min = v;
        }
        if let Some(v) = self.latency_max {
            settings.latency_max = v;
        }
        if let Some(v) = self.failure_enabled {
            settings.failure_enabled = v;
        }
        if let Some(v) = self.failure_rate {
            settings.failure_rate = v;
        }
        settings
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Status => {
            let res = reqwest::get(format!("{}/healthz", cli.url)).await?;
            // 503 still carries a useful body.
            print_json(res.json().await?)?;
        }
        Commands::Blocked => {
            let res = reqwest::get(format!("{}/api/blocked-ips", cli.url)).await?;
            if !res.status().is_success() {
                eprintln!("Error: proxy returned status {}", res.status());
                return Ok(());
            }
            print_json(res.json().await?)?;
        }
        Commands::Block { ip } => {
            let added = store(&cli)?.block_ip(ip).await?;
            println!("{} {}", if added { "Blocked" } else { "Already blocked:" }, ip);
        }
        Commands::Unblock { ip } => {
            let removed = store(&cli)?.unblock_ip(ip).await?;
            println!("{} {}", if removed { "Unblocked" } else { "Not blocked:" }, ip);
        }
        Commands::Recent { count } => {
            let entries = store(&cli)?.recent_traffic(*count).await?;
            if entries.is_empty() {
                println!("No traffic recorded yet.");
            }
            for entry in entries {
                println!(
                    "{} {:>6} {:<40} {} {}",
                    entry.timestamp.format("%H:%M:%S"),
                    entry.method,
                    entry.path,
                    entry.status,
                    entry.duration
                );
            }
        }
        Commands::Chaos { action } => {
            let store = store(&cli)?;
            match action {
                ChaosAction::Show => {
                    print_json(serde_json::to_value(store.chaos_settings().await?)?)?;
                }
                ChaosAction::Set(args) => {
                    let updated = args.apply(store.chaos_settings().await?);
                    if updated.latency_enabled && updated.latency_max <= updated.latency_min {
                        eprintln!("Warning: latency_max must exceed latency_min for latency to be injected");
                    }
                    store.set_chaos_settings(&updated).await?;
                    print_json(serde_json::to_value(updated)?)?;
                }
                ChaosAction::Off => {
                    let current = store.chaos_settings().await?;
                    let updated = ChaosSettings {
                        latency_enabled: false,
                        failure_enabled: false,
                        ..current
                    };
                    store.set_chaos_settings(&updated).await?;
                    println!("Chaos disabled");
                }
            }
        }
    }

    Ok(())
}

fn store(cli: &Cli) -> Result<RedisStore, Box<dyn std::error::Error>> {
    Ok(RedisStore::new(&StoreConfig {
        address: cli.redis.clone(),
        password: cli.password.clone(),
        timeout_ms: 5000,
        ..StoreConfig::default()
    })?)
}

fn print_json(value: Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
