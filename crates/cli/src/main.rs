//! faultline command-line interface.
//!
//! Peripheral glue around the channel crate: argument parsing, logging
//! setup, and exit-code mapping. The protocol itself lives in
//! `faultline-channel`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use faultline_channel::{Server, ServerConfig, UploadConfig, upload};
use faultline_transfer::{DEFAULT_CHUNK_SIZE, FaultPolicy, TransferOutcome};

/// Chunked file transfer that survives a deliberately unreliable link.
#[derive(Parser)]
#[command(name = "faultline", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the transfer server.
    Serve {
        /// Address to listen on.
        #[arg(long, default_value = "127.0.0.1:9999")]
        addr: SocketAddr,

        /// Chunk size in bytes for the return stream.
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Simulate an unreliable link (dropped and corrupted chunks).
        #[arg(long)]
        fault: bool,

        /// Per-chunk fault probability when --fault is set.
        #[arg(long, default_value_t = 0.1)]
        fault_rate: f64,

        /// Fixed RNG seed for reproducible fault injection.
        #[arg(long)]
        fault_seed: Option<u64>,

        /// Seconds to retain finished-session diagnostics.
        #[arg(long, default_value_t = 60)]
        retention_secs: u64,
    },
    /// Upload a file and verify the echoed copy.
    Upload {
        /// Server address.
        #[arg(long, default_value = "127.0.0.1:9999")]
        addr: SocketAddr,

        /// File to transfer.
        file: PathBuf,

        /// Where to write the reassembled copy (default: <file>.received).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Maximum retransmission requests (default: twice the chunk count).
        #[arg(long)]
        retry_budget: Option<u64>,

        /// Per-read timeout in seconds; 0 disables.
        #[arg(long, default_value_t = 30)]
        read_timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Serve {
            addr,
            chunk_size,
            fault,
            fault_rate,
            fault_seed,
            retention_secs,
        } => {
            let config = ServerConfig {
                chunk_size,
                fault: FaultPolicy {
                    enabled: fault,
                    rate: fault_rate,
                },
                fault_seed,
                retention: Duration::from_secs(retention_secs),
                ..ServerConfig::default()
            };
            let server = Server::bind(addr, config)
                .await
                .with_context(|| format!("binding {addr}"))?;

            let cancel = server.cancel_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received, shutting down");
                    cancel.cancel();
                }
            });

            server.run().await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Upload {
            addr,
            file,
            output,
            retry_budget,
            read_timeout_secs,
        } => {
            let bytes =
                std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload.bin".into());

            let cancel = tokio_util::sync::CancellationToken::new();
            let interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    interrupt.cancel();
                }
            });

            let config = UploadConfig {
                retry_budget,
                read_timeout: (read_timeout_secs > 0).then(|| Duration::from_secs(read_timeout_secs)),
                ..UploadConfig::default()
            };
            let report = upload(addr, &file_name, &bytes, config, cancel).await?;

            // The reassembled copy is written even on a mismatch; the
            // exit code flags it as inconsistent.
            let output =
                output.unwrap_or_else(|| PathBuf::from(format!("{}.received", file.display())));
            std::fs::write(&output, &report.data)
                .with_context(|| format!("writing {}", output.display()))?;

            match report.outcome {
                TransferOutcome::Success => {
                    tracing::info!(
                        output = %output.display(),
                        chunks = report.total_chunks,
                        retransmissions = report.retransmissions,
                        "transfer verified"
                    );
                    Ok(ExitCode::SUCCESS)
                }
                TransferOutcome::Mismatch => {
                    tracing::warn!(
                        output = %output.display(),
                        declared = %report.declared_checksum,
                        actual = %report.actual_checksum,
                        "checksum mismatch, file saved but inconsistent"
                    );
                    Ok(ExitCode::from(1))
                }
                TransferOutcome::Failed => Ok(ExitCode::from(2)),
            }
        }
    }
}
