use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

use context_connector::clock::{Clock, SystemClock};
use context_connector::config::{load_config, AccessPolicy, ServiceConfig};
use context_connector::http::request::signed_path;
use context_connector::security::credentials::{CredentialProvider, EnvCredentials, Secret};
use context_connector::security::signature::{
    sign, KEY_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER,
};
use context_connector::snapshot::{ManifestProducer, SnapshotProducer};

const DEFAULT_SIGNED_PATH: &str = "/wp-json/pcc/v1/snapshot/signed";

#[derive(Parser)]
#[command(name = "connector-cli")]
#[command(about = "Tooling for the project context connector", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the snapshot locally and print it
    Snapshot {
        #[arg(short, long, default_value = "connector.toml")]
        config: PathBuf,
    },
    /// Generate a new HMAC key id and secret (shown once, never stored)
    Keygen,
    /// Print the signature headers for a request
    Sign {
        #[arg(long)]
        key_id: String,
        /// Environment variable holding the secret [default: the connector's own lookup]
        #[arg(long)]
        secret_env: Option<String>,
        #[arg(long, default_value = DEFAULT_SIGNED_PATH)]
        path: String,
        #[arg(long, default_value = "GET")]
        method: String,
        /// Unix timestamp [default: now]
        #[arg(long)]
        timestamp: Option<u64>,
    },
    /// Perform a signed GET and print the snapshot
    Fetch {
        #[arg(short, long, default_value = "http://localhost:8080")]
        url: String,
        #[arg(long)]
        key_id: String,
        #[arg(long)]
        secret_env: Option<String>,
        #[arg(long, default_value = DEFAULT_SIGNED_PATH)]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Snapshot { config } => {
            let config = if config.exists() {
                load_config(&config)?
            } else {
                eprintln!("{} not found, using defaults", config.display());
                ServiceConfig::default()
            };
            let producer =
                ManifestProducer::new(&config.snapshot.manifest_path, Arc::new(SystemClock));
            let snapshot = producer.produce(&AccessPolicy::from_config(&config.policy))?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Commands::Keygen => {
            let mut rng = rand::thread_rng();
            let suffix: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(8)
                .map(char::from)
                .collect();
            let key_id = format!("key_{suffix}");
            let mut secret = [0u8; 32];
            rng.fill_bytes(&mut secret);
            let secret = hex::encode(secret);

            println!("Key ID: {key_id}");
            println!("Secret: {secret}");
            println!();
            println!("This secret is shown once. Configure the service with:");
            println!("  {}={secret}", EnvCredentials::var_name(&key_id));
        }
        Commands::Sign {
            key_id,
            secret_env,
            path,
            method,
            timestamp,
        } => {
            let secret = load_secret(&key_id, secret_env.as_deref())?;
            let timestamp = timestamp.unwrap_or_else(|| SystemClock.now_secs()).to_string();
            let signature = sign(secret.expose(), &method, signed_path(&path), &timestamp);
            println!("{KEY_HEADER}: {key_id}");
            println!("{TIMESTAMP_HEADER}: {timestamp}");
            println!("{SIGNATURE_HEADER}: {signature}");
        }
        Commands::Fetch {
            url,
            key_id,
            secret_env,
            path,
        } => {
            let secret = load_secret(&key_id, secret_env.as_deref())?;
            let timestamp = SystemClock.now_secs().to_string();
            let signature = sign(secret.expose(), "GET", signed_path(&path), &timestamp);

            let mut headers = HeaderMap::new();
            headers.insert(KEY_HEADER, HeaderValue::from_str(&key_id)?);
            headers.insert(TIMESTAMP_HEADER, HeaderValue::from_str(&timestamp)?);
            headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&signature)?);

            let client = reqwest::Client::new();
            let res = client
                .get(format!("{}{}", url.trim_end_matches('/'), path))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

fn load_secret(key_id: &str, secret_env: Option<&str>) -> Result<Secret, Box<dyn std::error::Error>> {
    let secret = match secret_env {
        Some(var) => std::env::var(var)
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| Secret::new(s.into_bytes())),
        None => EnvCredentials.resolve(key_id),
    };
    secret.ok_or_else(|| format!("no secret found for key id '{key_id}'").into())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: connector returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
