use clap::Parser;
use serde_json::json;
use ssi_api_client::client::{ApiClient, CallOptions};
use ssi_api_client::config::Config;
use ssi_api_client::error::Result;

/// Simple program to exercise the SSI API client: resolve configuration,
/// make a call and print the decoded response.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the API server (falls back to SSI_API_URL)
    #[arg(short, long)]
    url: Option<String>,

    /// Authentication token (falls back to SSI_API_TOKEN)
    #[arg(short, long)]
    token: Option<String>,

    /// Project identifier (falls back to SSI_API_PROJECT)
    #[arg(short, long)]
    project: Option<String>,

    /// Call name, e.g. "status"
    #[arg(short, long, default_value = "status")]
    call: String,

    /// HTTP method
    #[arg(short, long, default_value = "get")]
    method: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = Config::resolve(args.url, args.token, args.project)?;
    let client = ApiClient::new(config)?;

    let options = CallOptions::default().method(args.method);
    match client.call_with(&args.call, json!({}), options).await {
        Ok(body) => match body.as_json() {
            Some(value) => println!("Response: {:#}", value),
            None => println!("Response: {}", body.as_text().unwrap_or_default()),
        },
        Err(err) => {
            eprintln!("Call failed: {}", err);
            if let Some(status) = err.status() {
                eprintln!("HTTP status: {}", status);
            }
        }
    }
    Ok(())
}
