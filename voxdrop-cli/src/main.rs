use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voxdrop_cli::{Settings, UploadOptions};

/// voxdrop - upload meeting recordings and print shareable links
#[derive(Parser)]
#[command(name = "voxdrop")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log as JSON and print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload recordings (.m4a, .mp3, .wav) and print their links
    Upload {
        /// Client name used to build object names
        #[arg(long)]
        client: Option<String>,

        /// Meeting date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,

        /// "Regular" goes to REGULAR_FOLDER_ID, anything else to KICKSTART_FOLDER_ID
        #[arg(long)]
        meeting_type: Option<String>,

        /// Destination folder id, overriding the routing above
        #[arg(long)]
        folder: Option<String>,

        /// Upload into an in-memory store instead of Drive
        #[arg(long)]
        dry_run: bool,

        /// Send audio content types instead of application/octet-stream
        #[arg(long)]
        detect_mime: bool,

        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Check that a destination folder is reachable
    Check {
        #[arg(long)]
        meeting_type: Option<String>,

        #[arg(long)]
        folder: Option<String>,
    },
}

fn init_tracing(json: bool) {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }

    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json);

    let settings = Settings::from_env()?;

    match cli.command {
        Commands::Upload {
            client,
            date,
            meeting_type,
            folder,
            dry_run,
            detect_mime,
            files,
        } => {
            let options = UploadOptions {
                files,
                client,
                date,
                meeting_type,
                folder,
                dry_run,
                detect_mime,
            };
            let summary = voxdrop_cli::upload(&settings, options).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                for receipt in &summary.receipts {
                    println!("{}\t{}", receipt.name, receipt.link.url);
                }
                println!("{}", summary.links);
            }
        }
        Commands::Check { meeting_type, folder } => {
            let meta = voxdrop_cli::check(&settings, meeting_type.as_deref(), folder.as_deref()).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&meta)?);
            } else {
                println!("{}\t{}", meta.id, meta.name);
            }
        }
    }

    Ok(())
}
