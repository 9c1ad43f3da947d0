//! WhatsBuddy CLI
//!
//! Terminal host for the status pipeline: a local directory stands in for the
//! storage volume and the directory picker is a prompt on stdin.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use whatsbuddy_core::channel::{
    GET_CURRENT_GRANT, GET_FILE_BYTES, REQUEST_ACCESS, SAVE_FILE,
};
use whatsbuddy_core::{
    AccessBroker, LocalResolver, MethodCall, MethodResult, PickerHost, PickerOutcome,
    PickerRequest, PickerResponder, ReplyValue, StatusChannel, Storage, TreeUri,
};

/// WhatsBuddy - browse and save status media from a granted folder.
#[derive(Parser, Debug)]
#[command(name = "whatsbuddy")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory holding the database and persisted permissions
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Directory standing in for the primary storage volume
    #[arg(long, global = true, value_name = "DIR")]
    volume_root: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Pick the status folder and persist access to it
    Grant {
        /// Folder relative to the volume root, instead of prompting
        #[arg(long, value_name = "PATH")]
        tree: Option<String>,
    },

    /// Show the currently granted folder
    Current,

    /// List status media in the granted folder
    List,

    /// Read a document
    Read {
        /// Document URI
        uri: String,

        /// Write the bytes to this file instead of printing base64
        #[arg(long, short, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Save a copy of a document into the output folder
    Save {
        /// Document URI
        uri: String,

        /// MIME type of the document
        #[arg(long)]
        mime: Option<String>,

        /// Original file name of the document
        #[arg(long)]
        name: Option<String>,
    },

    /// Send a raw method call and print the reply
    Call {
        /// Method name, e.g. getStatusFiles
        method: String,

        /// Arguments as a JSON object
        args: Option<String>,
    },
}

/// Directory picker that asks on the terminal
struct TerminalPicker {
    volume_root: PathBuf,
    preset: Option<String>,
}

impl TerminalPicker {
    fn new(volume_root: impl Into<PathBuf>, preset: Option<String>) -> Self {
        Self {
            volume_root: volume_root.into(),
            preset,
        }
    }

    async fn prompt(&self, request: &PickerRequest) -> Result<String> {
        eprintln!("Choose a folder under {}", self.volume_root.display());
        if let Some(hint) = &request.initial_location {
            let suggested = hint.tree_id().split_once(':').map_or("", |(_, rel)| rel);
            eprintln!("Status folder found at: {}", suggested);
        }
        eprint!("Folder (empty to cancel): ");

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .context("Failed to read folder from stdin")?;
        Ok(line.trim().to_string())
    }
}

#[async_trait]
impl PickerHost for TerminalPicker {
    async fn launch(
        &self,
        request: PickerRequest,
        responder: PickerResponder,
    ) -> whatsbuddy_core::Result<()> {
        let answer = match &self.preset {
            Some(tree) => tree.clone(),
            None => self
                .prompt(&request)
                .await
                .map_err(|e| whatsbuddy_core::Error::Internal(format!("{:#}", e)))?,
        };

        let outcome = if answer.is_empty() {
            PickerOutcome::Cancelled
        } else {
            PickerOutcome::Granted(TreeUri::primary(&answer))
        };

        debug!("Picker answered request {}: {:?}", request.token, outcome);
        responder.respond(outcome);
        Ok(())
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Wire storage, resolver, picker and broker into a status channel
fn build_channel(
    data_dir: &Path,
    volume_root: &Path,
    preset_tree: Option<String>,
) -> Result<StatusChannel> {
    let storage = Arc::new(
        Storage::new_with_path(data_dir)
            .with_context(|| format!("Failed to open storage in {}", data_dir.display()))?,
    );
    debug!("Using database {:?}", storage.db_path());
    let settings = storage.load_settings();

    let resolver = Arc::new(
        LocalResolver::with_permission_store(volume_root, data_dir.join("permissions.json"))
            .context("Failed to load persisted permissions")?
            .with_media_collection(&settings.output_relative_path)
            .with_context(|| {
                format!("Invalid output folder '{}'", settings.output_relative_path)
            })?,
    );

    let picker = TerminalPicker::new(volume_root, preset_tree);
    let broker = AccessBroker::new(Arc::new(picker), resolver.clone(), storage)
        .context("Failed to create access broker")?
        .with_access_mode(settings.access_mode);

    Ok(StatusChannel::new(Arc::new(broker), resolver, &settings))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_code(reply: &MethodResult) -> ExitCode {
    if reply.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let data_dir = cli
        .data_dir
        .or_else(|| dirs::data_dir().map(|d| d.join("whatsbuddy")))
        .context("Could not determine a data directory; pass --data-dir")?;
    let volume_root = cli
        .volume_root
        .or_else(dirs::home_dir)
        .context("Could not determine a volume root; pass --volume-root")?;

    info!("Volume root: {:?}", volume_root);

    let preset_tree = match &cli.command {
        Commands::Grant { tree } => tree.clone(),
        _ => None,
    };
    let channel = build_channel(&data_dir, &volume_root, preset_tree)?;

    match cli.command {
        Commands::Grant { .. } => {
            let reply = channel.handle(&MethodCall::new(REQUEST_ACCESS)).await;
            print_json(&reply)?;
            Ok(exit_code(&reply))
        }
        Commands::Current => {
            let reply = channel.handle(&MethodCall::new(GET_CURRENT_GRANT)).await;
            print_json(&reply)?;
            Ok(exit_code(&reply))
        }
        Commands::List => match channel.list_current().await {
            Ok(entries) => {
                print_json(&entries)?;
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                let reply = MethodResult::from_error(&e);
                print_json(&reply)?;
                Ok(exit_code(&reply))
            }
        },
        Commands::Read { uri, out } => {
            let reply = channel
                .handle(&MethodCall::new(GET_FILE_BYTES).with_argument("uri", uri))
                .await;

            match (&reply, out) {
                (
                    MethodResult::Success {
                        value: ReplyValue::Bytes(bytes),
                    },
                    Some(out),
                ) => {
                    tokio::fs::write(&out, bytes.as_bytes())
                        .await
                        .with_context(|| format!("Failed to write {}", out.display()))?;
                    info!("Wrote {} bytes to {:?}", bytes.as_bytes().len(), out);
                }
                _ => print_json(&reply)?,
            }
            Ok(exit_code(&reply))
        }
        Commands::Save { uri, mime, name } => {
            let mut call = MethodCall::new(SAVE_FILE).with_argument("uri", uri);
            if let Some(mime) = mime {
                call = call.with_argument("mimeType", mime);
            }
            if let Some(name) = name {
                call = call.with_argument("fileName", name);
            }

            let reply = channel.handle(&call).await;
            print_json(&reply)?;
            Ok(exit_code(&reply))
        }
        Commands::Call { method, args } => {
            let arguments = match args {
                Some(raw) => serde_json::from_str(&raw).context("Arguments must be valid JSON")?,
                None => Value::Null,
            };

            let reply = channel.handle(&MethodCall { method, arguments }).await;
            print_json(&reply)?;
            Ok(exit_code(&reply))
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    info!("WhatsBuddy v{}", env!("CARGO_PKG_VERSION"));

    run(cli).await
}
