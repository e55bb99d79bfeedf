//! Command-line client: request a generation and follow its event stream.
//!
//! ```text
//! generate-cli --feed tech,ai --start 2025-10-01 --end 2025-10-08 [--input "focus on releases"]
//! ```
//! Progress goes to stderr; the final newsletter JSON goes to stdout.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Parser;
use newsletter_stream::pipeline::{parse_iso8601, GenerationRequest};
use newsletter_stream::stream::client;
use newsletter_stream::StreamEvent;

#[derive(Debug, Parser)]
#[command(name = "generate-cli", version, about = "Generate a newsletter and stream its progress")]
struct Cli {
    /// Feed id; repeat the flag or pass a comma-separated list
    #[arg(long = "feed", value_delimiter = ',', required = true)]
    feeds: Vec<String>,

    /// Window start (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    start: DateTime<Utc>,

    /// Window end (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    end: DateTime<Utc>,

    /// Free-text instructions for the model
    #[arg(long)]
    input: Option<String>,

    /// Base URL of the newsletter service
    #[arg(long, env = "NEWSLETTER_API_URL", default_value = "http://127.0.0.1:8000")]
    api_url: String,
}

fn parse_date(raw: &str) -> Result<DateTime<Utc>, String> {
    parse_iso8601(raw).ok_or_else(|| format!("not an RFC 3339 timestamp or YYYY-MM-DD date: {raw}"))
}

impl Cli {
    fn request(self) -> GenerationRequest {
        GenerationRequest {
            feed_ids: self
                .feeds
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            start_date: self.start,
            end_date: self.end,
            user_input: self.input,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let base = cli.api_url.clone();
    let request = cli.request();
    let http = reqwest::Client::new();

    let state = client::generate(&http, &base, &request, |ev, _state| match ev {
        StreamEvent::Refreshing { feed_count } => eprintln!("refreshing {feed_count} stale feed(s)…"),
        StreamEvent::Analyzing { feed_count } => eprintln!("analyzing {feed_count} feed(s)…"),
        StreamEvent::Metadata { articles_analyzed } => eprintln!("{articles_analyzed} article(s) in range"),
        StreamEvent::Partial { .. } => eprint!("."),
        StreamEvent::Complete => eprintln!("\ndone"),
        StreamEvent::Error { .. } => {}
    })
    .await?;

    let content = state.content.unwrap_or_default();
    println!("{}", serde_json::to_string_pretty(&content)?);
    Ok(())
}
