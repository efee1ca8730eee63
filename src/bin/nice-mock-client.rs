//! Sends a single request to a nice-mock server and prints the response.

use clap::Parser;
use nice_mock::client::send_request;
use nice_mock::codec::encoded_len;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Characters of the response printed
const PREVIEW_CHARS: usize = 200;

#[derive(Parser, Debug)]
#[command(name = "nice-mock-client")]
#[command(version = "0.1.0")]
#[command(about = "One-shot client for the nice-mock server", long_about = None)]
struct Args {
    /// Server host
    #[arg(short = 'H', long, default_value = "localhost")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = 9000)]
    port: u16,

    /// Request payload (defaults to TEST_REQUEST_DATA_<millis>)
    #[arg(short, long)]
    data: Option<String>,

    /// Socket timeout in milliseconds
    #[arg(long, default_value_t = 30_000)]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let args = Args::parse();
    let data = args.data.unwrap_or_else(|| {
        format!("TEST_REQUEST_DATA_{}", chrono::Utc::now().timestamp_millis())
    });

    println!("Connecting to {}:{}", args.host, args.port);
    println!("Sending request: {} ({} bytes)", data, encoded_len(&data));

    let response = send_request(
        (args.host.as_str(), args.port),
        &data,
        Duration::from_millis(args.timeout_ms),
    )
    .await?;

    let preview: String = response.payload.chars().take(PREVIEW_CHARS).collect();

    println!();
    println!("=== Response ===");
    println!("Declared: {} bytes", response.declared_len);
    println!("Received: {} bytes", response.received_len);
    println!("Elapsed: {} ms", response.elapsed.as_millis());
    println!("First {PREVIEW_CHARS} chars: {preview}");

    Ok(())
}
