use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use shopsight::agent;
use shopsight::config::{Config, ConfigOverrides, LlmMode};
use shopsight::output::json::render_json;
use shopsight::server::run_server;
use shopsight::store::ingest::ingest;
use shopsight::store::MetricsStore;
use shopsight::synthesizer::QuerySynthesizer;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "shopsight",
    about = "Ask questions about your e-commerce metrics"
)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Database path, overriding the configured one
    #[arg(long)]
    db: Option<PathBuf>,
    /// Synthesizer mode: "remote" or "fallback"
    #[arg(long = "llm-mode")]
    llm_mode: Option<LlmMode>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load the CSV files into the database, replacing existing tables
    Ingest {
        #[arg(long = "data-dir")]
        data_dir: Option<PathBuf>,
    },
    /// Answer one question and exit
    Ask { question: String },
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(&config_path))?;
    let data_dir = match &cli.command {
        Commands::Ingest { data_dir } => data_dir.clone(),
        _ => None,
    };
    config.apply_overrides(ConfigOverrides {
        db_path: cli.db.as_ref().map(|p| p.to_string_lossy().to_string()),
        data_dir: data_dir.map(|p| p.to_string_lossy().to_string()),
        llm_mode: cli.llm_mode,
    });

    match &cli.command {
        Commands::Ingest { .. } => {
            let mut store = MetricsStore::open(&config.resolved_db_path())?;
            let report = ingest(&mut store, &config.resolved_data_dir())?;
            match cli.output {
                OutputFormat::Table => {
                    for table in &report.tables {
                        println!("{}: {} rows", table.table, table.rows);
                    }
                }
                OutputFormat::Json => println!("{}", render_json(&report)?),
            }
        }
        Commands::Ask { question } => {
            let synthesizer = QuerySynthesizer::from_config(&config.llm)?;
            let outcome = agent::ask(&synthesizer, &config, question).await?;
            match cli.output {
                OutputFormat::Table => {
                    println!("{}", outcome.answer);
                    if let Some(chart) = &outcome.chart {
                        println!("Chart saved to {}", chart.display());
                    }
                }
                OutputFormat::Json => println!("{}", render_json(&outcome)?),
            }
        }
        Commands::Serve { host, port } => {
            let host = host.clone().unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let bind = format!("{host}:{port}");
            let addr: SocketAddr = bind
                .parse()
                .map_err(|e| anyhow!("invalid bind address {bind}: {e}"))?;
            run_server(config, addr).await?;
        }
        Commands::Config { init, show } => {
            if *init {
                Config::write_template(&config_path)?;
                println!("Wrote config template to {}", config_path.display());
            }
            if *show || !*init {
                println!("{}", render_json(&config)?);
            }
        }
    }

    Ok(())
}
