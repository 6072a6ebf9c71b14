use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;

use feedr::config::Config;
use feedr::{Channel, ChannelInfo, FeedClient, FeedItem, FeedRequest};

/// Get the default config file path (~/.config/feedr/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("feedr")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(name = "feedr", about = "Fetch and normalize an RSS feed from a URL or file")]
struct Args {
    /// Feed URL or path to a local feed file
    target: String,

    /// Cache the raw feed for this many seconds (0 disables caching)
    #[arg(long, value_name = "SECS")]
    ttl: Option<u64>,

    /// Directory for cache entries (must exist)
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Config file (default: ~/.config/feedr/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print only the feed summary
    #[arg(long)]
    info: bool,

    /// Print info, channel and items as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct JsonOutput {
    info: ChannelInfo,
    channel: Channel,
    items: Vec<FeedItem>,
}

fn main() -> Result<()> {
    // Logs go to stderr so stdout stays clean for --json
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config: {}", config_path.display()))?;
    if let Some(dir) = args.cache_dir {
        config.cache_dir = Some(dir);
    }
    let ttl = args.ttl.unwrap_or(config.ttl_secs);

    let client = FeedClient::from_config(&config).context("Failed to set up feed client")?;
    let session = client
        .open(FeedRequest::new(&args.target).with_ttl(ttl))
        .with_context(|| format!("Failed to load feed: {}", args.target))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if args.json {
        let output = JsonOutput {
            info: session.info(),
            channel: session.channel(),
            items: if args.info {
                Vec::new()
            } else {
                session.items()
            },
        };
        serde_json::to_writer_pretty(&mut out, &output).context("Failed to write JSON")?;
        writeln!(out)?;
        return Ok(());
    }

    let info = session.info();
    writeln!(
        out,
        "{} (RSS {}, {} bytes{})",
        info.source,
        if info.version.is_empty() { "?" } else { info.version.as_str() },
        info.size,
        if session.is_cached() { ", cached" } else { "" }
    )?;

    if args.info {
        return Ok(());
    }

    let channel = session.channel();
    if !channel.title.is_empty() {
        writeln!(out, "{}", channel.title)?;
    }
    for item in session.items() {
        let title = if item.title.is_empty() { "(untitled)" } else { item.title.as_str() };
        if item.link.is_empty() {
            writeln!(out, "  - {title}")?;
        } else {
            writeln!(out, "  - {title} <{}>", item.link)?;
        }
    }

    Ok(())
}
