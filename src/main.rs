use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use orbittrack::config::credentials_from_env;
use orbittrack::{query, Announcement, ClientConfig, GpRecord, SpaceTrack};

#[derive(Debug, Parser)]
#[command(name = "orbittrack", version, about = "Query the Space-Track orbital data API")]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Fail instead of waiting when a local rate limit is reached
    #[arg(long, global = true)]
    no_wait: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Latest GP element sets
    Gp {
        value: String,
        #[arg(long, default_value = "norad_cat_id")]
        filter: String,
    },
    /// Historical GP element sets, optionally limited to an epoch range
    History {
        value: String,
        #[arg(long, default_value = "norad_cat_id")]
        filter: String,
        /// First day, YYYY-MM-DD
        #[arg(long, requires = "end")]
        start: Option<String>,
        /// Last day, YYYY-MM-DD
        #[arg(long, requires = "start")]
        end: Option<String>,
    },
    /// Current service announcements
    Announcements,
    /// Any query path, printed as returned
    Query { path: String },
}

enum Output {
    Gp(Vec<GpRecord>),
    Announcements(Vec<Announcement>),
    Raw(String),
}

async fn run(client: &SpaceTrack, command: Command) -> orbittrack::Result<Output> {
    match command {
        Command::Gp { value, filter } => client.gp(&filter, &value).await.map(Output::Gp),
        Command::History {
            value,
            filter,
            start: Some(start),
            end: Some(end),
        } => {
            let start = query::parse_date(&start)?;
            let end = query::parse_date(&end)?;
            client
                .gp_history(&filter, &value, start, end)
                .await
                .map(Output::Gp)
        }
        Command::History { value, filter, .. } => {
            client.all_gp_history(&filter, &value).await.map(Output::Gp)
        }
        Command::Announcements => client.announcements().await.map(Output::Announcements),
        Command::Query { path } => client
            .custom_query(&path)
            .await
            .map(|payload| Output::Raw(payload.body)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays valid JSON
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,orbittrack=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config =
        ClientConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.no_wait {
        config.rate_limiting.wait = false;
    }
    info!(base_url = %config.api.base_url, "Configuration loaded");

    let credentials = credentials_from_env()?;
    let client = SpaceTrack::from_config(credentials, &config)?;

    let command = cli.command;
    let output = match client.scoped(|c| async move { run(c, command).await }).await {
        Ok(output) => output,
        Err(e) => {
            if let Some(wait) = e.retry_after() {
                warn!(retry_after_secs = wait.as_secs(), "Rate limited, try again later");
            }
            return Err(e.into());
        }
    };

    let json = match output {
        Output::Gp(records) => serde_json::to_string_pretty(&records)?,
        Output::Announcements(announcements) => serde_json::to_string_pretty(&announcements)?,
        Output::Raw(body) => body,
    };
    println!("{json}");

    Ok(())
}
