mod cli;

use clipforge::{config, server};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use clipforge_av::{tools, Engine};
use std::path::Path;

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting Clipforge server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );
    tracing::info!(
        "Uploads in {:?}, outputs in {:?}",
        config.storage.upload_dir,
        config.storage.output_dir
    );

    server::start_server(config).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "clipforge=trace,clipforge_av=trace,tower_http=debug".to_string()
        } else {
            "clipforge=debug,clipforge_av=debug,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Probe { file, json } => probe_file(&file, json, cli.config.as_deref()),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("clipforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn probe_file(file: &Path, json: bool, config_path: Option<&Path>) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path)?;
    let ffprobe = tools::get_tool_path("ffprobe", config.tools.ffprobe_path.as_deref())
        .context("ffprobe is required")?;
    let engine = Engine::new("ffmpeg".into(), ffprobe)
        .with_probe_timeout(config.engine.probe_timeout());

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(engine.probe(file))?;

    if json {
        let value = serde_json::json!({
            "file": file,
            "duration_seconds": result.duration_seconds,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        let secs = result.duration().as_secs();
        let mins = secs / 60;
        let hours = mins / 60;
        println!("File: {}", file.display());
        println!(
            "Duration: {:02}:{:02}:{:02} ({:.3}s)",
            hours,
            mins % 60,
            secs % 60,
            result.duration_seconds
        );
    }

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    println!("Checking external tools...\n");

    let tools = tools::check_tools(
        config.tools.ffmpeg_path.as_deref(),
        config.tools.ffprobe_path.as_deref(),
    );
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg to run the server.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            print_summary(&config);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            print_summary(&config);
        }
    }

    Ok(())
}

fn print_summary(config: &config::Config) {
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Max upload: {} bytes", config.server.max_upload_bytes);
    println!("  Upload dir: {}", config.storage.upload_dir.display());
    println!("  Output dir: {}", config.storage.output_dir.display());
    println!(
        "  Stage timeout: {}s, probe timeout: {}s",
        config.engine.stage_timeout_secs, config.engine.probe_timeout_secs
    );
}
